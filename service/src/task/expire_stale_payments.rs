//! [`ExpireStalePayments`] [`Task`].

use std::{convert::Infallible, error::Error, time};

use common::operations::{By, Perform, Start, Update};
use tokio::time::interval;
use tracerr::Traced;
use tracing as log;

#[cfg(doc)]
use crate::domain::Payment;
use crate::{
    domain::payment,
    infra::{database, Database},
    Service,
};

use super::Task;

/// Configuration for [`ExpireStalePayments`] [`Task`].
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Interval between stale [`Payment`]s checks.
    pub interval: time::Duration,

    /// Timeout after which a pending [`Payment`] is considered stale.
    pub timeout: time::Duration,
}

/// [`Task`] for failing [`Payment`]s left pending for too long.
#[derive(Clone, Copy, Debug)]
pub struct ExpireStalePayments<S> {
    /// [`Config`] of this [`Task`].
    config: Config,

    /// [`Service`] instance.
    service: S,
}

impl<Db, Gw> Task<Start<By<ExpireStalePayments<Self>, Config>>>
    for Service<Db, Gw>
where
    ExpireStalePayments<Service<Db, Gw>>:
        Task<Perform<()>, Ok = (), Err: Error> + Send + Sync + 'static,
    Self: Clone,
{
    type Ok = ();
    type Err = Infallible;

    async fn execute(
        &self,
        Start(by): Start<By<ExpireStalePayments<Self>, Config>>,
    ) -> Result<Self::Ok, Self::Err> {
        let config = by.into_inner();
        let task = ExpireStalePayments {
            config,
            service: self.clone(),
        };

        let mut interval = interval(task.config.interval);
        loop {
            let _ = interval.tick().await;
            _ = task.execute(Perform(())).await.map_err(|e| {
                log::error!("`task::ExpireStalePayments` failed: {e}");
            });
        }
    }
}

impl<Db, Gw> Task<Perform<()>> for ExpireStalePayments<Service<Db, Gw>>
where
    Db: Database<
        Update<payment::Expiration>,
        Ok = u64,
        Err = Traced<database::Error>,
    >,
{
    type Ok = ();
    type Err = ExecutionError;

    async fn execute(&self, _: Perform<()>) -> Result<Self::Ok, Self::Err> {
        let expiration = payment::Expiration {
            created_before: payment::CreationDateTime::now()
                - self.config.timeout,
            expired_at: payment::UpdateDateTime::now(),
        };
        let expired = self
            .service
            .database()
            .execute(Update(expiration))
            .await
            .map_err(tracerr::wrap!())?;
        if expired > 0 {
            log::info!("{expired} stale `Payment`(s) expired");
        }
        Ok(())
    }
}

/// Error of [`ExpireStalePayments`] execution.
pub type ExecutionError = Traced<database::Error>;
