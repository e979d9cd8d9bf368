//! [`Query`] collection related to a single [`Item`].

use common::operations::By;

use crate::domain::{item, Item};
#[cfg(doc)]
use crate::Query;

use super::DatabaseQuery;

/// Queries an [`Item`] by its [`item::Id`].
pub type ById = DatabaseQuery<By<Option<Item>, item::Id>>;
