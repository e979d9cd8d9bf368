//! Service contains the business logic of the application.
//!
//! List of available Cargo features:
#![doc = document_features::document_features!()]
#![deny(
    nonstandard_style,
    rust_2018_idioms,
    rustdoc::all,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code
)]
#![forbid(non_ascii_idents)]
#![warn(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    clippy::pedantic,
    clippy::wildcard_enum_match_arm,
    deprecated_in_future,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    unused_crate_dependencies,
    unused_import_braces,
    unused_labels,
    unused_lifetimes,
    unused_qualifications,
    unused_results
)]

pub mod command;
pub mod domain;
pub mod infra;
pub mod query;
pub mod read;
pub mod task;
#[cfg(test)]
mod tests;

use std::{error::Error, time};

use common::operations::{By, Start};
use tokio::sync::broadcast;
use tracing as log;

use crate::domain::{commission, item, payment, Booking, Payment};
#[cfg(doc)]
use crate::infra::{Database, Gateway};

pub use self::{command::Command, query::Query, task::Task};

/// [`Service`] configuration.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Time an advisory availability snapshot is served from cache for.
    pub availability_cache_ttl: time::Duration,

    /// [`commission::Policy`] of awarded commissions.
    pub commission: commission::Policy,

    /// [`task::ExpireStalePayments`] configuration.
    pub expire_stale_payments: task::expire_stale_payments::Config,
}

/// Notification about a reservation outcome, to be delivered by an external
/// notifier.
#[derive(Clone, Debug)]
pub enum Event {
    /// [`Booking`] is confirmed.
    BookingConfirmed {
        /// Confirmed [`Booking`].
        booking: Booking,

        /// Name of the booked [`item::Item`].
        item_name: item::Name,
    },

    /// [`Payment`] failed, so its reservation wasn't made.
    PaymentFailed {
        /// Failed [`Payment`].
        payment: Payment,

        /// Reason of the failure.
        reason: payment::DeclineReason,
    },
}

/// Domain service.
#[derive(Clone, Debug)]
pub struct Service<Db, Gw> {
    /// Configuration of this [`Service`].
    config: Config,

    /// [`Database`] of this [`Service`].
    database: Db,

    /// Payment [`Gateway`] of this [`Service`].
    gateway: Gw,

    /// Sender of [`Event`]s.
    events: broadcast::Sender<Event>,

    /// Advisory availability cache.
    availability: query::availability::Cache,

    /// [`Payment`]s being reconciled at the moment.
    reconciling: task::reconcile_payment::InFlight,
}

impl<Db, Gw> Service<Db, Gw> {
    /// Capacity of the [`Event`]s channel.
    const EVENTS_CAPACITY: usize = 256;

    /// Creates a new [`Service`] with the provided parameters.
    pub fn new(
        config: Config,
        database: Db,
        gateway: Gw,
    ) -> (Self, task::Background)
    where
        Self: Task<
                Start<
                    By<
                        task::ExpireStalePayments<Self>,
                        task::expire_stale_payments::Config,
                    >,
                >,
                Ok = (),
                Err: Error,
            > + Clone
            + 'static,
    {
        let (events, _) = broadcast::channel(Self::EVENTS_CAPACITY);
        let this = Service {
            config,
            database,
            gateway,
            events,
            availability: query::availability::Cache::new(
                config.availability_cache_ttl,
            ),
            reconciling: task::reconcile_payment::InFlight::default(),
        };

        let mut bg = task::Background::default();
        let svc = this.clone();
        bg.spawn("ExpireStalePayments", async move {
            svc.execute(Start(By::new(svc.config().expire_stale_payments)))
                .await
        });

        (this, bg)
    }

    /// Returns [`Config`] of this [`Service`].
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns [`Database`] of this [`Service`].
    #[must_use]
    pub fn database(&self) -> &Db {
        &self.database
    }

    /// Returns payment [`Gateway`] of this [`Service`].
    #[must_use]
    pub fn gateway(&self) -> &Gw {
        &self.gateway
    }

    /// Subscribes to the [`Event`]s emitted by this [`Service`].
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Emits the provided [`Event`] to the current subscribers, if any.
    fn emit(&self, event: Event) {
        if self.events.send(event).is_err() {
            log::debug!("`Event` is emitted without subscribers");
        }
    }
}
