//! Background [`Task`]s definitions.

mod background;
pub mod expire_stale_payments;
pub mod reconcile_payment;

pub use common::Handler as Task;

pub use self::{
    background::{Background, Failure},
    expire_stale_payments::ExpireStalePayments,
    reconcile_payment::{Outcome, ReconcilePayment},
};
