//! Domain definitions.

/// Defines a validated, whitespace-trimmed text newtype.
macro_rules! define_text {
    (
        #[doc = $doc:literal]
        $name:ident(max = $max:literal)
    ) => {
        #[doc = $doc]
        #[derive(
            ::derive_more::AsRef,
            Clone,
            Debug,
            ::serde::Deserialize,
            ::derive_more::Display,
            Eq,
            Hash,
            PartialEq,
            ::serde::Serialize,
        )]
        #[as_ref(str, String)]
        #[cfg_attr(
            feature = "postgres",
            derive(::postgres_types::FromSql, ::postgres_types::ToSql),
            postgres(transparent)
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Creates a new [`", stringify!($name), "`] if the given `value` is valid.")]
            #[must_use]
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let value = value.into();
                Self::check(&value).then_some(Self(value))
            }

            #[doc = concat!("Checks whether the given `value` is a valid [`", stringify!($name), "`].")]
            fn check(value: impl AsRef<str>) -> bool {
                let value = value.as_ref();
                value.trim() == value
                    && !value.is_empty()
                    && value.chars().count() <= $max
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = &'static str;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s).ok_or(concat!("invalid `", stringify!($name), "`"))
            }
        }
    };
}

use common::define_kind;

pub mod booking;
pub mod commission;
pub mod item;
pub mod manual_entry;
pub mod payment;
pub mod referral;

pub use self::{
    booking::Booking, commission::Commission, item::Item,
    manual_entry::ManualEntry, payment::Payment,
};

define_kind! {
    #[doc = "Method a reservation is paid with."]
    enum PaymentMethod {
        #[doc = "Mobile money push (M-Pesa STK push)."]
        MobileMoney = 1,

        #[doc = "Debit or credit card."]
        Card = 2,

        #[doc = "Direct bank transfer."]
        BankTransfer = 3,
    }
}

impl PaymentMethod {
    /// Indicates whether this [`PaymentMethod`] can be charged at the moment.
    #[must_use]
    pub const fn is_supported(self) -> bool {
        matches!(self, Self::MobileMoney)
    }
}
