//! Calendar [`Date`] and [`DateRange`] definitions.

use std::{fmt, iter, str::FromStr};

use derive_more::{Display, Error};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use time::{Month, OffsetDateTime};

/// Calendar date without a time and a time zone.
#[derive(
    Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd,
)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct Date(time::Date);

impl Date {
    /// Returns the current [`Date`] in UTC.
    #[must_use]
    pub fn today() -> Self {
        Self(OffsetDateTime::now_utc().date())
    }

    /// Creates a new [`Date`] from the provided calendar components.
    ///
    /// [`None`] is returned if the components don't form a valid date.
    #[must_use]
    pub fn from_ymd(year: i32, month: u8, day: u8) -> Option<Self> {
        let month = Month::try_from(month).ok()?;
        time::Date::from_calendar_date(year, month, day).ok().map(Self)
    }

    /// Returns the [`Date`] shifted by the provided number of days.
    ///
    /// [`None`] is returned on overflow.
    #[must_use]
    pub fn add_days(self, days: i64) -> Option<Self> {
        self.0
            .checked_add(time::Duration::days(days))
            .map(Self)
    }

    /// Returns the number of whole days from this [`Date`] to the `other`
    /// one (negative if the `other` one is earlier).
    #[must_use]
    pub fn days_until(self, other: Self) -> i64 {
        (other.0 - self.0).whole_days()
    }
}

impl From<time::Date> for Date {
    fn from(date: time::Date) -> Self {
        Self(date)
    }
}

impl From<Date> for time::Date {
    fn from(date: Date) -> Self {
        date.0
    }
}

impl FromStr for Date {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '-');
        let (Some(year), Some(month), Some(day)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err("expected `YYYY-MM-DD` format");
        };
        if year.len() != 4 || month.len() != 2 || day.len() != 2 {
            return Err("expected `YYYY-MM-DD` format");
        }

        let year = year.parse().map_err(|_| "invalid year")?;
        let month = month.parse().map_err(|_| "invalid month")?;
        let day = day.parse().map_err(|_| "invalid day")?;

        Self::from_ymd(year, month, day).ok_or("invalid calendar date")
    }
}

/// Inclusive range of [`Date`]s.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(::serde::Deserialize, ::serde::Serialize),
    serde(try_from = "RawRange", into = "RawRange")
)]
pub struct DateRange {
    /// First [`Date`] of this [`DateRange`].
    start: Date,

    /// Last [`Date`] of this [`DateRange`] (included).
    end: Date,
}

impl DateRange {
    /// Creates a new [`DateRange`] between the provided [`Date`]s.
    ///
    /// # Errors
    ///
    /// If the `end` precedes the `start`.
    pub fn new(start: Date, end: Date) -> Result<Self, InvertedRangeError> {
        if end < start {
            return Err(InvertedRangeError { start, end });
        }
        Ok(Self { start, end })
    }

    /// Creates a [`DateRange`] covering a single [`Date`].
    #[must_use]
    pub fn single(date: Date) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// Returns the first [`Date`] of this [`DateRange`].
    #[must_use]
    pub fn start(&self) -> Date {
        self.start
    }

    /// Returns the last [`Date`] of this [`DateRange`].
    #[must_use]
    pub fn end(&self) -> Date {
        self.end
    }

    /// Checks whether this [`DateRange`] shares at least one [`Date`] with
    /// the `other` one.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Checks whether the provided [`Date`] belongs to this [`DateRange`].
    #[must_use]
    pub fn contains(&self, date: Date) -> bool {
        self.start <= date && date <= self.end
    }

    /// Returns the number of days to bill for this [`DateRange`].
    ///
    /// It's the distance between the bounds, but never less than one day.
    #[must_use]
    pub fn billable_days(&self) -> u32 {
        u32::try_from(self.start.days_until(self.end))
            .unwrap_or(u32::MAX)
            .max(1)
    }

    /// Iterates over every [`Date`] of this [`DateRange`].
    pub fn days(&self) -> impl Iterator<Item = Date> {
        let end = self.end;
        iter::successors(Some(self.start), move |d| {
            d.add_days(1).filter(|next| *next <= end)
        })
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Error of creating a [`DateRange`] whose end precedes its start.
#[derive(Clone, Copy, Debug, Display, Error)]
#[display("`{end}` precedes `{start}`")]
pub struct InvertedRangeError {
    /// Requested start of the range.
    pub start: Date,

    /// Requested end of the range.
    pub end: Date,
}

#[cfg(feature = "serde")]
mod serde {
    //! Module providing integration with [`serde`] crate.

    use std::str::FromStr as _;

    use serde::{de::Error as _, Deserialize, Deserializer, Serialize};

    use super::{Date, DateRange};

    impl Serialize for Date {
        fn serialize<S: serde::Serializer>(
            &self,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            serializer.collect_str(self)
        }
    }

    impl<'de> Deserialize<'de> for Date {
        fn deserialize<D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Self, D::Error> {
            let s = String::deserialize(deserializer)?;
            Date::from_str(&s).map_err(D::Error::custom)
        }
    }

    /// Unchecked representation of a [`DateRange`].
    #[derive(Deserialize, Serialize)]
    pub(super) struct RawRange {
        /// Start of the range.
        start: Date,

        /// End of the range.
        end: Date,
    }

    impl TryFrom<RawRange> for DateRange {
        type Error = String;

        fn try_from(raw: RawRange) -> Result<Self, Self::Error> {
            Self::new(raw.start, raw.end).map_err(|e| e.to_string())
        }
    }

    impl From<DateRange> for RawRange {
        fn from(range: DateRange) -> Self {
            Self {
                start: range.start,
                end: range.end,
            }
        }
    }
}
#[cfg(feature = "serde")]
use self::serde::RawRange;

#[cfg(feature = "juniper")]
mod juniper {
    //! Module providing integration with [`juniper`] crate.

    use std::str::FromStr as _;

    use juniper::{graphql_scalar, InputValue, ScalarValue, Value};

    /// Calendar date in `YYYY-MM-DD` format.
    #[graphql_scalar(with = Self, parse_token(String))]
    type Date = super::Date;

    impl Date {
        fn to_output<S: ScalarValue>(d: &Date) -> Value<S> {
            Value::scalar(d.to_string())
        }

        fn from_input<S: ScalarValue>(
            input: &InputValue<S>,
        ) -> Result<Self, String> {
            input
                .as_string_value()
                .ok_or_else(|| {
                    format!(
                        "Cannot parse `Date` input scalar from \
                         non-string value: {input}",
                    )
                })
                .and_then(|s| {
                    Self::from_str(s).map_err(|e| {
                        format!("Cannot parse `Date` input scalar: {e}")
                    })
                })
        }
    }
}

#[cfg(test)]
mod spec {
    use std::str::FromStr as _;

    use super::{Date, DateRange};

    fn date(s: &str) -> Date {
        Date::from_str(s).unwrap()
    }

    fn range(start: &str, end: &str) -> DateRange {
        DateRange::new(date(start), date(end)).unwrap()
    }

    #[test]
    fn parses_and_prints() {
        assert_eq!(date("2024-06-01").to_string(), "2024-06-01");
        assert_eq!(date("2024-02-29"), Date::from_ymd(2024, 2, 29).unwrap());

        assert!(Date::from_str("2023-02-29").is_err());
        assert!(Date::from_str("2024-6-1").is_err());
        assert!(Date::from_str("2024-06").is_err());
        assert!(Date::from_str("june").is_err());
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(
            DateRange::new(date("2024-06-05"), date("2024-06-01")).is_err(),
        );
        assert!(DateRange::new(date("2024-06-05"), date("2024-06-05")).is_ok());
    }

    #[test]
    fn overlap_is_inclusive() {
        let booked = range("2024-06-01", "2024-06-05");

        assert!(booked.overlaps(&range("2024-06-04", "2024-06-07")));
        assert!(booked.overlaps(&range("2024-06-05", "2024-06-05")));
        assert!(booked.overlaps(&range("2024-05-20", "2024-06-01")));
        assert!(booked.overlaps(&range("2024-06-02", "2024-06-03")));
        assert!(booked.overlaps(&range("2024-05-01", "2024-07-01")));

        assert!(!booked.overlaps(&range("2024-06-06", "2024-06-08")));
        assert!(!booked.overlaps(&range("2024-05-01", "2024-05-31")));
    }

    #[test]
    fn bills_at_least_one_day() {
        assert_eq!(range("2024-06-01", "2024-06-01").billable_days(), 1);
        assert_eq!(range("2024-06-01", "2024-06-02").billable_days(), 1);
        assert_eq!(range("2024-06-01", "2024-06-05").billable_days(), 4);
        assert_eq!(range("2024-05-30", "2024-06-02").billable_days(), 3);
    }

    #[test]
    fn iterates_days() {
        let days = range("2024-02-28", "2024-03-01").days().collect::<Vec<_>>();
        assert_eq!(
            days,
            [date("2024-02-28"), date("2024-02-29"), date("2024-03-01")],
        );
        assert_eq!(DateRange::single(date("2024-01-01")).days().count(), 1);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializes_only_ordered_ranges() {
        let ok: DateRange = serde_json::from_str(
            r#"{"start":"2024-06-01","end":"2024-06-05"}"#,
        )
        .unwrap();
        assert_eq!(ok, range("2024-06-01", "2024-06-05"));

        assert!(serde_json::from_str::<DateRange>(
            r#"{"start":"2024-06-05","end":"2024-06-01"}"#,
        )
        .is_err());
    }
}
