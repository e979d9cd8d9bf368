//! Payment [`Gateway`] definitions.

#[cfg(any(test, feature = "memory"))]
pub mod memory;
pub mod mpesa;

use common::Money;
use derive_more::{Display, Error as StdError, From};
#[cfg(doc)]
use common::operations::Initiate;

use crate::domain::payment;

#[cfg(any(test, feature = "memory"))]
pub use self::memory::Memory;
pub use self::mpesa::Mpesa;

pub use common::Handler as Gateway;

/// External mobile-money charge, pushed to the payer's phone via
/// [`Initiate`].
///
/// Its acceptance yields a [`payment::CheckoutId`], while the outcome arrives
/// asynchronously through a callback.
#[derive(Clone, Debug)]
pub struct Charge {
    /// ID of the [`Payment`] this [`Charge`] backs.
    ///
    /// [`Payment`]: crate::domain::Payment
    pub payment_id: payment::Id,

    /// [`payment::Phone`] to push this [`Charge`] to.
    pub phone: payment::Phone,

    /// Amount to charge.
    pub amount: Money,

    /// Account reference shown to the payer.
    pub reference: String,

    /// Description shown to the payer.
    pub description: String,
}

/// Payment [`Gateway`] error.
#[derive(Debug, Display, From, StdError)]
pub enum Error {
    /// [`Mpesa`] gateway error.
    #[display("`Mpesa` gateway error: {_0}")]
    Mpesa(mpesa::Error),

    /// [`Memory`] gateway error.
    #[cfg(any(test, feature = "memory"))]
    #[display("`Memory` gateway error: {_0}")]
    Memory(memory::Error),
}
