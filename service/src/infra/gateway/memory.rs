//! Scripted in-memory [`Gateway`] implementation.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
};

use common::operations::Initiate;
use derive_more::{Display, Error as StdError};
use tracerr::Traced;

use crate::{
    domain::payment,
    infra::{
        gateway::{self, Charge},
        Gateway,
    },
};

/// Scripted in-memory [`Gateway`].
///
/// Accepts every [`Charge`] unless told otherwise via [`Memory::reject_next`].
#[derive(Clone, Debug, Default)]
pub struct Memory {
    /// State shared between the clones of this [`Memory`] gateway.
    state: Arc<Mutex<State>>,
}

/// State of a [`Memory`] gateway.
#[derive(Debug, Default)]
struct State {
    /// Scripted rejections of the upcoming [`Charge`]s.
    rejections: VecDeque<Error>,

    /// [`Charge`]s initiated so far.
    charges: Vec<Charge>,
}

impl Memory {
    /// Creates a new [`Memory`] gateway accepting every [`Charge`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next initiated [`Charge`] fail with the provided [`Error`].
    pub fn reject_next(&self, err: Error) {
        self.state().rejections.push_back(err);
    }

    /// Returns the [`Charge`]s initiated so far.
    #[must_use]
    pub fn charges(&self) -> Vec<Charge> {
        self.state().charges.clone()
    }

    /// Locks the [`State`] of this [`Memory`] gateway.
    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Gateway<Initiate<Charge>> for Memory {
    type Ok = payment::CheckoutId;
    type Err = Traced<gateway::Error>;

    async fn execute(
        &self,
        Initiate(charge): Initiate<Charge>,
    ) -> Result<Self::Ok, Self::Err> {
        let mut state = self.state();
        if let Some(err) = state.rejections.pop_front() {
            return Err(tracerr::new!(gateway::Error::from(err)));
        }
        state.charges.push(charge);
        let n = state.charges.len();
        drop(state);

        payment::CheckoutId::new(format!("ws_CO_{n:012}"))
            .ok_or_else(|| {
                tracerr::new!(gateway::Error::from(Error::Unreachable))
            })
    }
}

/// [`Memory`] gateway error.
#[derive(Clone, Copy, Debug, Display, StdError)]
pub enum Error {
    /// Gateway couldn't be reached.
    #[display("payment gateway is unreachable")]
    Unreachable,

    /// Gateway rejected the [`Charge`].
    #[display("charge is rejected")]
    Rejected,
}
