//! Infrastructure layer.

pub mod database;
pub mod gateway;

pub use self::{database::Database, gateway::Gateway};
#[cfg(any(test, feature = "memory"))]
pub use self::database::{memory, Memory};
#[cfg(feature = "postgres")]
pub use self::database::{postgres, Postgres};
