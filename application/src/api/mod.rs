//! GraphQL API definitions.

pub mod booking;
pub mod item;
mod mutation;
pub mod payment;
mod query;
pub mod scalar;
mod subscription;

pub use self::{
    booking::Booking, mutation::Mutation, payment::Payment, query::Query,
    subscription::Subscription,
};

/// GraphQL schema.
pub type Schema = juniper::RootNode<'static, Query, Mutation, Subscription>;
