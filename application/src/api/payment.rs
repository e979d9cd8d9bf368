//! `Payment`-related definitions.

use common::{DateTime, Money};
use derive_more::{AsRef, Display, From, Into};
use juniper::{graphql_object, GraphQLEnum, GraphQLScalar};
use service::{
    command::{finalize_payment, retry_payment},
    domain::{self, payment},
    task::reconcile_payment,
};
use uuid::Uuid;

use crate::{
    api::{self, scalar},
    define_error, AsError, Context, Error,
};

/// Unique identifier of a `Payment`.
#[derive(
    Clone, Copy, Debug, Display, Eq, From, GraphQLScalar, Into, PartialEq,
)]
#[from(domain::payment::Id)]
#[into(domain::payment::Id)]
#[graphql(name = "PaymentId", transparent)]
pub struct Id(Uuid);

/// Mobile-money phone number.
///
/// Local (`0712345678`) and international (`+254712345678`) notations are
/// accepted.
#[derive(AsRef, Clone, Debug, Display, From, GraphQLScalar, Into)]
#[graphql(name = "Phone", with = scalar::Via::<domain::payment::Phone>)]
pub struct Phone(domain::payment::Phone);

/// Method a reservation is paid with.
#[derive(Clone, Copy, Debug, GraphQLEnum)]
pub enum PaymentMethod {
    /// Mobile money push.
    MobileMoney,

    /// Debit or credit card.
    Card,

    /// Direct bank transfer.
    BankTransfer,
}

impl From<PaymentMethod> for domain::PaymentMethod {
    fn from(method: PaymentMethod) -> Self {
        match method {
            PaymentMethod::MobileMoney => Self::MobileMoney,
            PaymentMethod::Card => Self::Card,
            PaymentMethod::BankTransfer => Self::BankTransfer,
        }
    }
}

/// Charge of a paid reservation.
#[derive(Clone, Debug, From)]
pub struct Payment(domain::Payment);

/// Charge of a paid reservation.
#[graphql_object(context = Context)]
impl Payment {
    /// Unique identifier of this `Payment`.
    #[must_use]
    pub fn id(&self) -> Id {
        self.0.id.into()
    }

    /// ID of the reserved `Item`.
    #[must_use]
    pub fn item_id(&self) -> api::item::Id {
        self.0.item_id.into()
    }

    /// Charged amount.
    #[must_use]
    pub fn amount(&self) -> Money {
        self.0.amount
    }

    /// Status of this `Payment`.
    #[must_use]
    pub fn status(&self) -> Status {
        self.0.status.into()
    }

    /// Reason of the decline, if this `Payment` has failed.
    #[must_use]
    pub fn decline_reason(&self) -> Option<DeclineReason> {
        self.0.decline_reason().map(Into::into)
    }

    /// Number of charge attempts made so far.
    #[must_use]
    pub fn attempts(&self) -> i32 {
        i32::from(self.0.attempts)
    }

    /// ID of the `Booking` made with this `Payment`, once completed.
    #[must_use]
    pub fn booking_id(&self) -> Option<api::booking::Id> {
        self.0.booking_id.map(Into::into)
    }

    /// `DateTime` when this `Payment` was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime {
        self.0.created_at.coerce()
    }

    /// `DateTime` when this `Payment` was last updated.
    #[must_use]
    pub fn updated_at(&self) -> DateTime {
        self.0.updated_at.coerce()
    }
}

/// Status of a `Payment`.
#[derive(Clone, Copy, Debug, GraphQLEnum)]
#[graphql(name = "PaymentStatus")]
pub enum Status {
    /// Charge is initiated, but not confirmed yet.
    Pending,

    /// Charge is confirmed by the payer.
    Completed,

    /// Charge is declined, failed or expired.
    Failed,
}

impl From<domain::payment::Status> for Status {
    fn from(status: domain::payment::Status) -> Self {
        use domain::payment::Status as S;
        match status {
            S::Pending => Self::Pending,
            S::Completed => Self::Completed,
            S::Failed => Self::Failed,
        }
    }
}

/// Reason of a declined `Payment`.
#[derive(Clone, Copy, Debug, GraphQLEnum)]
pub enum DeclineReason {
    /// Payer has insufficient funds.
    InsufficientFunds,

    /// Payer entered a wrong PIN.
    WrongPin,

    /// Payer cancelled the charge.
    CancelledByUser,

    /// Payer didn't respond on the device in time.
    DeviceTimeout,

    /// Payer's device was busy with another request.
    SubscriberBusy,

    /// Charge request was rejected by the payment gateway.
    InvalidRequest,

    /// `Payment` stayed pending for too long.
    Expired,
}

impl From<domain::payment::DeclineReason> for DeclineReason {
    fn from(reason: domain::payment::DeclineReason) -> Self {
        use domain::payment::DeclineReason as R;
        match reason {
            R::InsufficientFunds => Self::InsufficientFunds,
            R::WrongPin => Self::WrongPin,
            R::CancelledByUser => Self::CancelledByUser,
            R::DeviceTimeout => Self::DeviceTimeout,
            R::SubscriberBusy => Self::SubscriberBusy,
            R::InvalidRequest => Self::InvalidRequest,
            R::Expired => Self::Expired,
        }
    }
}

impl AsError for retry_payment::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        match self {
            Self::Db(e) => e.try_as_error(),
            Self::PaymentNotExists(_) => Some(PaymentError::NotExists.into()),
            Self::AlreadyReconciling(_) => {
                Some(PaymentError::AlreadyReconciling.into())
            }
            Self::AlreadyCompleted(_) => {
                Some(PaymentError::AlreadyCompleted.into())
            }
            Self::PaymentExpired(_) => Some(PaymentError::Expired.into()),
            Self::ItemNotExists(_) => {
                Some(api::item::ItemError::NotExists.into())
            }
            Self::PaymentInitiationFailed(_) => {
                Some(PaymentError::InitiationFailed.into())
            }
        }
    }
}

impl AsError for reconcile_payment::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        match self {
            Self::Db(e) => e.try_as_error(),
            Self::PaymentNotExists(_) => Some(PaymentError::NotExists.into()),
            Self::AlreadyReconciling(_) => {
                Some(PaymentError::AlreadyReconciling.into())
            }
            Self::PaymentDeclined(payment::DeclineReason::Expired) => {
                Some(PaymentError::Expired.into())
            }
            Self::PaymentDeclined(_) => {
                Some(Error::from(PaymentError::Declined).with_message(self))
            }
            Self::PaymentTimeout(_) => Some(PaymentError::Timeout.into()),
            Self::Finalization(e) => e.try_as_error(),
        }
    }
}

impl AsError for finalize_payment::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        use api::booking::ReservationError as R;

        match self {
            Self::Db(e) => e.try_as_error(),
            Self::PaymentNotExists(_) => Some(PaymentError::NotExists.into()),
            Self::InsufficientCapacity(e) => {
                Some(Error::from(R::InsufficientCapacity).with_message(e))
            }
            Self::FacilityConflict(e) => {
                Some(Error::from(R::FacilityConflict).with_message(e))
            }
            Self::PaymentNotCompleted { .. }
            | Self::ItemNotExists(_)
            | Self::BookingNotExists(_) => None,
        }
    }
}

define_error! {
    enum PaymentError {
        #[code = "PAYMENT_NOT_EXISTS"]
        #[status = NOT_FOUND]
        #[message = "`Payment` with the specified ID does not exist"]
        NotExists,

        #[code = "PAYMENT_METHOD_UNSUPPORTED"]
        #[status = BAD_REQUEST]
        #[message = "Payment method is not available"]
        MethodUnsupported,

        #[code = "PAYMENT_INITIATION_FAILED"]
        #[status = BAD_GATEWAY]
        #[message = "Payment provider didn't accept the charge"]
        InitiationFailed,

        #[code = "PAYMENT_ALREADY_RECONCILING"]
        #[status = CONFLICT]
        #[message = "`Payment` is being awaited already"]
        AlreadyReconciling,

        #[code = "PAYMENT_ALREADY_COMPLETED"]
        #[status = CONFLICT]
        #[message = "`Payment` is completed already"]
        AlreadyCompleted,

        #[code = "PAYMENT_EXPIRED"]
        #[status = GONE]
        #[message = "`Payment` is expired"]
        Expired,

        #[code = "PAYMENT_DECLINED"]
        #[status = PAYMENT_REQUIRED]
        #[message = "Payment declined"]
        Declined,

        #[code = "PAYMENT_TIMEOUT"]
        #[status = GATEWAY_TIMEOUT]
        #[message = "Payment wasn't confirmed in time"]
        Timeout,
    }
}

#[cfg(test)]
mod spec {
    use service::{
        domain::payment,
        task::reconcile_payment::ExecutionError,
    };

    use crate::AsError as _;

    #[test]
    fn retryable_outcomes_stay_retryable() {
        let declined =
            ExecutionError::PaymentDeclined(payment::DeclineReason::WrongPin);
        let err = declined.as_error();
        assert_eq!(err.code, "PAYMENT_DECLINED");
        assert_eq!(err.message, "Payment declined: wrong PIN");
        assert_eq!(err.is_retryable(), declined.is_retryable());

        let timeout = ExecutionError::PaymentTimeout(payment::Id::new());
        assert!(timeout.as_error().is_retryable());

        let expired =
            ExecutionError::PaymentDeclined(payment::DeclineReason::Expired);
        let err = expired.as_error();
        assert_eq!(err.code, "PAYMENT_EXPIRED");
        assert!(!err.is_retryable());
        assert!(!expired.is_retryable());

        let busy = ExecutionError::AlreadyReconciling(payment::Id::new());
        assert!(!busy.as_error().is_retryable());
        assert!(!busy.is_retryable());
    }
}
