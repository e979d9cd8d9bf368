//! Background environment for running [`Task`]s.

use std::{
    error::Error,
    future::{Future, IntoFuture},
    iter,
};

use derive_more::Display;
use futures::{
    future::{self, LocalBoxFuture},
    FutureExt as _, TryFutureExt as _,
};
use tokio::task;
use tracing as log;

#[cfg(doc)]
use crate::Task;

/// Background environment for running long-living [`Task`]s.
///
/// Resolves once all the spawned [`Task`]s complete, or as soon as any of
/// them fails.
#[derive(Debug, Default)]
pub struct Background {
    /// Local set of the spawned [`Task`]s.
    set: task::LocalSet,

    /// Handles of the spawned [`Task`]s.
    handles: Vec<(&'static str, task::JoinHandle<Result<(), Failure>>)>,
}

impl Background {
    /// Spawns a new named [`Task`] inside this [`Background`] environment.
    pub fn spawn<F, E>(&mut self, name: &'static str, future: F)
    where
        F: Future<Output = Result<(), E>> + 'static,
        E: Error + 'static,
    {
        log::debug!("`task::{name}` is spawned");
        let handle = self.set.spawn_local(future.map_err(move |e| Failure {
            task: name,
            source: Box::new(e),
        }));
        self.handles.push((name, handle));
    }
}

impl IntoFuture for Background {
    type Output = Result<(), Failure>;
    type IntoFuture = LocalBoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        let Self { set, handles } = self;
        future::try_join_all(iter::once(set.map(Ok).boxed_local()).chain(
            handles.into_iter().map(|(name, h)| {
                h.map(move |res| {
                    res.unwrap_or_else(|e| {
                        Err(Failure {
                            task: name,
                            source: Box::new(e),
                        })
                    })
                })
                .boxed_local()
            }),
        ))
        .map_ok(drop)
        .boxed_local()
    }
}

/// Failure of a [`Task`] spawned in a [`Background`] environment.
#[derive(Debug, Display)]
#[display("`task::{task}` failed: {source}")]
pub struct Failure {
    /// Name of the failed [`Task`].
    pub task: &'static str,

    /// Error the [`Task`] failed with.
    pub source: Box<dyn Error + 'static>,
}

impl Error for Failure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&*self.source)
    }
}
