pub mod executor;
pub mod naming;
pub mod orchestrator;
pub mod plan;
pub mod progress;
pub mod temp;

use crate::cancel::CancelToken;
use crate::error::SplitError;
use progress::{EventSink, RunState};

/// Everything a run needs from its caller: where to publish events and the
/// flag that cancels it.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub events: EventSink,
    pub cancel: CancelToken,
}

impl RunContext {
    pub fn new(events: EventSink, cancel: CancelToken) -> Self {
        Self { events, cancel }
    }

    /// Context that drops events and is never cancelled.
    pub fn detached() -> Self {
        Self::new(EventSink::discard(), CancelToken::new())
    }

    /// Cancellation checkpoint followed by a state change.
    pub fn enter(&self, state: RunState) -> Result<(), SplitError> {
        self.cancel.check()?;
        tracing::info!(%state, "split state");
        self.events.state(state);
        Ok(())
    }
}
