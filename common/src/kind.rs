//! Macros for defining kind enums.

use derive_more::{Display, Error};

/// Macro for defining a kind enum persisted as a small integer.
///
/// # Example
///
/// ```rust
/// # use common::define_kind;
///
/// define_kind! {
///     #[doc = "Status of a payment."]
///     enum Status {
///         #[doc = "Awaiting confirmation."]
///         Pending = 1,
///
///         #[doc = "Confirmed by the payer."]
///         Completed = 2,
///     }
/// }
///
/// assert_eq!(Status::try_from(2), Ok(Status::Completed));
/// assert_eq!(Status::Pending.to_string(), "PENDING");
/// ```
#[expect(clippy::module_name_repetitions, reason = "more readable")]
#[macro_export]
macro_rules! define_kind {
    (
        #[doc = $doc:literal]
        enum $name:ident {
            $(
                #[doc = $variant_doc:literal]
                $variant:ident = $value:expr
            ),* $(,)?
        }
    ) => {
        #[derive(
            Clone,
            Copy,
            Debug,
            $crate::private::strum::Display,
            $crate::private::strum::EnumString,
            Eq,
            Hash,
            PartialEq,
        )]
        #[cfg_attr(
            feature = "serde",
            derive(
                $crate::private::serde::Deserialize,
                $crate::private::serde::Serialize,
            ),
            serde(rename_all = "SCREAMING_SNAKE_CASE"),
        )]
        #[doc = $doc]
        #[repr(u8)]
        #[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $(
                 #[doc = $variant_doc]
                 $variant = $value,
            )*
        }

        impl $name {
            /// Converts this into its [`u8`] representation.
            #[must_use]
            pub const fn u8(self) -> u8 {
                self as u8
            }
        }

        impl ::core::convert::TryFrom<u8> for $name {
            type Error = $crate::UnknownKindError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $(
                        v if Self::$variant.u8() == v => Ok(Self::$variant),
                    )*
                    v => Err($crate::UnknownKindError {
                        kind: ::core::stringify!($name),
                        value: v,
                    }),
                }
            }
        }

        #[cfg(feature = "postgres")]
        impl<'a> $crate::private::postgres_types::FromSql<'a> for $name {
            $crate::private::postgres_types::accepts!(INT2);

            fn from_sql(
                ty: &$crate::private::postgres_types::Type,
                raw: &[u8],
            ) -> Result<
                $name,
                Box<dyn ::std::error::Error
                    + ::core::marker::Sync
                    + ::core::marker::Send>,
            > {
                Ok(Self::try_from(u8::try_from(i16::from_sql(ty, raw)?)?)?)
            }
        }

        #[cfg(feature = "postgres")]
        impl $crate::private::postgres_types::ToSql for $name {
            $crate::private::postgres_types::accepts!(INT2);
            $crate::private::postgres_types::to_sql_checked!();

            fn to_sql(
                &self,
                ty: &$crate::private::postgres_types::Type,
                w: &mut $crate::private::postgres_types::private::BytesMut,
            ) -> Result<
                $crate::private::postgres_types::IsNull,
                ::std::boxed::Box<
                    dyn ::std::error::Error
                        + ::core::marker::Sync
                        + ::core::marker::Send
                >,
            > {
                i16::from(self.u8()).to_sql(ty, w)
            }
        }
    };
}

/// Error of converting an integer into a kind enum it doesn't represent.
#[derive(Clone, Copy, Debug, Display, Error, Eq, PartialEq)]
#[display("invalid `{kind}` value: {value}")]
pub struct UnknownKindError {
    /// Name of the kind enum.
    pub kind: &'static str,

    /// Unrecognized value.
    pub value: u8,
}

#[cfg(test)]
mod spec {
    use std::str::FromStr as _;

    use super::UnknownKindError;

    crate::define_kind! {
        #[doc = "Kind of a test listing."]
        enum Listing {
            #[doc = "A trip."]
            Trip = 1,

            #[doc = "An adventure site."]
            AdventureSite = 4,
        }
    }

    #[test]
    fn converts_from_u8() {
        assert_eq!(Listing::try_from(1), Ok(Listing::Trip));
        assert_eq!(Listing::try_from(4), Ok(Listing::AdventureSite));
        assert_eq!(
            Listing::try_from(2),
            Err(UnknownKindError {
                kind: "Listing",
                value: 2,
            }),
        );
    }

    #[test]
    fn converts_from_str() {
        assert_eq!(Listing::AdventureSite.to_string(), "ADVENTURE_SITE");
        assert_eq!(
            Listing::from_str("ADVENTURE_SITE"),
            Ok(Listing::AdventureSite),
        );
        assert!(Listing::from_str("HOTEL").is_err());
    }
}
