//! [`Query`] collection related to a single [`Commission`].

use common::operations::By;

use crate::domain::{booking, Commission};
#[cfg(doc)]
use crate::{domain::Booking, Query};

use super::DatabaseQuery;

/// Queries a [`Commission`] by the [`booking::Id`] of the referred
/// [`Booking`].
pub type ByBooking = DatabaseQuery<By<Option<Commission>, booking::Id>>;
