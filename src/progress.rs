//! Progress reporting from inside a run to whoever consumes the stream.

use crate::error::StageError;
use crate::models::{ProgressEvent, Stage};
use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::fmt::Display;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Finite, non-restartable sequence of events for one run.
pub type ProgressStream = BoxStream<'static, ProgressEvent>;

#[derive(Debug, Default)]
struct RunState {
    current: Option<Stage>,
    failure: Option<StageError>,
}

/// Sending half handed to every stage of a run.
#[derive(Clone)]
pub struct ProgressSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    state: Arc<Mutex<RunState>>,
}

impl ProgressSink {
    pub fn channel() -> (Self, ProgressStream) {
        let (tx, rx) = mpsc::unbounded();
        let sink = Self {
            tx,
            state: Arc::new(Mutex::new(RunState::default())),
        };
        (sink, rx.boxed())
    }

    /// Marks `stage` as entered and announces it.
    pub fn enter(&self, stage: Stage) {
        if let Ok(mut state) = self.state.lock() {
            state.current = Some(stage);
        }
        self.emit(ProgressEvent::Stage { stage });
    }

    pub fn emit(&self, event: ProgressEvent) {
        if self.tx.unbounded_send(event).is_err() {
            debug!("progress receiver dropped");
        }
    }

    pub fn current_stage(&self) -> Option<Stage> {
        self.state.lock().ok().and_then(|state| state.current)
    }

    pub fn record_failure(&self, failure: StageError) {
        if let Ok(mut state) = self.state.lock() {
            state.failure.get_or_insert(failure);
        }
    }

    /// The failure a stage recorded, or `fallback` attributed to the
    /// stage in progress.
    pub fn failure_or(&self, fallback: impl Display) -> StageError {
        let recorded = self
            .state
            .lock()
            .ok()
            .and_then(|mut state| state.failure.take());
        recorded.unwrap_or_else(|| {
            StageError::new(
                self.current_stage().unwrap_or(Stage::Planning),
                fallback.to_string(),
            )
        })
    }

    /// Ends the stream; dropping the last sink has the same effect.
    pub fn close(&self) {
        self.tx.close_channel();
    }
}
