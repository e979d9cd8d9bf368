//! [`Money`]-related definitions.

use std::{fmt, str::FromStr};

use rust_decimal::{prelude::ToPrimitive as _, Decimal};

use crate::define_kind;

/// Amount of money in some [`Currency`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize)
)]
pub struct Money {
    /// Amount of this [`Money`].
    pub amount: Decimal,

    /// [`Currency`] of this amount.
    pub currency: Currency,
}

impl Money {
    /// Creates a zero amount of the provided [`Currency`].
    #[must_use]
    pub const fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    /// Checks whether this [`Money`] amount is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Adds the `other` amount to this one.
    ///
    /// [`None`] is returned if the [`Currency`]s differ or on overflow.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        (self.currency == other.currency).then_some(())?;
        Some(Self {
            amount: self.amount.checked_add(other.amount)?,
            currency: self.currency,
        })
    }

    /// Multiplies this [`Money`] amount by the provided quantity.
    ///
    /// [`None`] is returned on overflow.
    #[must_use]
    pub fn checked_mul(self, quantity: u32) -> Option<Self> {
        Some(Self {
            amount: self.amount.checked_mul(Decimal::from(quantity))?,
            currency: self.currency,
        })
    }

    /// Rounds this [`Money`] amount up to whole units of its [`Currency`].
    #[must_use]
    pub fn ceil(self) -> Self {
        Self {
            amount: self.amount.ceil(),
            currency: self.currency,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { amount, currency } = self;
        match amount.is_integer().then(|| amount.to_i128()).flatten() {
            Some(whole) => write!(f, "{whole}{currency}"),
            None => write!(f, "{}{currency}", amount.normalize()),
        }
    }
}

impl FromStr for Money {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() < 4 {
            return Err("too short");
        }

        let (amount, currency) = s.split_at(s.len() - 3);
        let amount = Decimal::from_str(amount).map_err(|_| "invalid amount")?;
        if amount.is_sign_negative() {
            return Err("negative amount");
        }
        let currency =
            Currency::from_str(currency).map_err(|_| "invalid currency")?;

        Ok(Self { amount, currency })
    }
}

define_kind! {
    #[doc = "Currency of a [`Money`] amount."]
    enum Currency {
        #[doc = "Kenyan Shilling."]
        Kes = 1,

        #[doc = "US Dollar."]
        Usd = 2,

        #[doc = "Euro."]
        Eur = 3,
    }
}

#[cfg(feature = "juniper")]
mod juniper {
    //! Module providing integration with [`juniper`] crate.

    use std::str::FromStr as _;

    use juniper::{graphql_scalar, InputValue, ScalarValue, Value};

    /// Money in `{major}.{minor}{currency}` format, where:
    /// - `major` is an integer;
    /// - `minor` is an optional integer;
    /// - `currency` is a three-letter currency code.
    #[graphql_scalar(with = Self, parse_token(String))]
    type Money = super::Money;

    impl Money {
        fn to_output<S: ScalarValue>(m: &Money) -> Value<S> {
            Value::scalar(m.to_string())
        }

        fn from_input<S: ScalarValue>(
            input: &InputValue<S>,
        ) -> Result<Self, String> {
            input
                .as_string_value()
                .ok_or_else(|| {
                    format!(
                        "Cannot parse `Money` input scalar from \
                         non-string value: {input}",
                    )
                })
                .and_then(|s| {
                    Self::from_str(s).map_err(|e| {
                        format!("Cannot parse `Money` input scalar: {e}")
                    })
                })
        }
    }
}

#[cfg(test)]
mod spec {
    use std::str::FromStr as _;

    use rust_decimal::Decimal;

    use super::{Currency, Money};

    fn money(s: &str) -> Money {
        Money::from_str(s).unwrap()
    }

    #[test]
    fn from_str() {
        assert_eq!(
            money("1500.50KES"),
            Money {
                amount: "1500.50".parse().unwrap(),
                currency: Currency::Kes,
            },
        );
        assert_eq!(money("12USD").currency, Currency::Usd);

        assert!(Money::from_str("123.45").is_err());
        assert!(Money::from_str("123.45Ke").is_err());
        assert!(Money::from_str("-5KES").is_err());
    }

    #[test]
    fn to_string() {
        assert_eq!(money("1500.50KES").to_string(), "1500.5KES");
        assert_eq!(money("1500.00KES").to_string(), "1500KES");
        assert_eq!(money("0KES").to_string(), "0KES");
    }

    #[test]
    fn adds_only_same_currency() {
        assert_eq!(
            money("100KES").checked_add(money("250.5KES")),
            Some(money("350.5KES")),
        );
        assert_eq!(money("100KES").checked_add(money("1USD")), None);
    }

    #[test]
    fn multiplies_by_quantity() {
        assert_eq!(money("250KES").checked_mul(3), Some(money("750KES")));
        assert!(money("250KES").checked_mul(0).unwrap().is_zero());
        assert_eq!(
            Money::zero(Currency::Eur),
            Money {
                amount: Decimal::ZERO,
                currency: Currency::Eur,
            },
        );
    }

    #[test]
    fn rounds_up() {
        assert_eq!(money("99.01KES").ceil(), money("100KES"));
        assert_eq!(money("100KES").ceil(), money("100KES"));
    }
}
