//! Folds bursts of viewport change signals into one notification

use futures_util::stream::{self, BoxStream, SelectAll};
use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::viewport::{Viewport, ViewportSignal};

const EVENT_CAPACITY: usize = 32;
/// A burst ends once no signal arrives for this long.
const QUIET_PERIOD: Duration = Duration::from_millis(10);
/// Upper bound on one burst so a chatty viewport still gets reported.
const MAX_BURST: Duration = Duration::from_millis(100);

/// Emitted once for every burst of viewport changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisibilityChanged {
    /// Distinct signals in the burst, in arrival order.
    pub signals: Vec<ViewportSignal>,
}

/// Listens to all five viewport signals until disposed or dropped.
#[derive(Debug)]
pub struct ChangeCoalescer {
    events: broadcast::Sender<VisibilityChanged>,
    task: Option<JoinHandle<()>>,
}

impl ChangeCoalescer {
    /// Subscribe to the viewport and start the listening task on the current runtime.
    pub fn new(viewport: &dyn Viewport) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let signals = stream::select_all(
            ViewportSignal::ALL.map(|signal| signal_stream(signal, viewport.subscribe(signal))),
        );
        let task = tokio::spawn(coalesce(signals, events.clone()));
        Self {
            events,
            task: Some(task),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VisibilityChanged> {
        self.events.subscribe()
    }

    /// Stop listening; later viewport changes are not reported.
    pub fn dispose(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Change coalescer disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.task.is_none()
    }
}

impl Drop for ChangeCoalescer {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn signal_stream(
    signal: ViewportSignal,
    rx: broadcast::Receiver<()>,
) -> BoxStream<'static, ViewportSignal> {
    stream::unfold(rx, move |mut rx| async move {
        match rx.recv().await {
            // A lagged receiver still means the signal fired
            Ok(()) | Err(RecvError::Lagged(_)) => Some((signal, rx)),
            Err(RecvError::Closed) => None,
        }
    })
    .boxed()
}

async fn coalesce(
    mut signals: SelectAll<BoxStream<'static, ViewportSignal>>,
    events: broadcast::Sender<VisibilityChanged>,
) {
    while let Some(first) = signals.next().await {
        let mut fired = vec![first];
        let deadline = Instant::now() + MAX_BURST;

        // Keep collecting until the viewport has been quiet for a moment
        let mut closed = false;
        loop {
            let wait = QUIET_PERIOD.min(deadline.saturating_duration_since(Instant::now()));
            match tokio::time::timeout(wait, signals.next()).await {
                Ok(Some(signal)) => {
                    if !fired.contains(&signal) {
                        fired.push(signal);
                    }
                }
                Ok(None) => {
                    closed = true;
                    break;
                }
                Err(_) => break,
            }
        }

        debug!("Visibility changed ({:?})", fired);
        let _ = events.send(VisibilityChanged { signals: fired });
        if closed {
            break;
        }
    }
    debug!("Viewport closed; change coalescer stopped");
}
