use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::warn;

use crate::decoder::DecodedEvent;

/// Error returned by an observer. Logged, never propagated.
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// Receives every decoded camera event.
pub trait Observer: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str {
        "observer"
    }

    fn on_event(&self, event: &DecodedEvent) -> Result<(), ObserverError>;
}

impl<F> Observer for F
where
    F: Fn(&DecodedEvent) -> Result<(), ObserverError> + Send + Sync,
{
    fn on_event(&self, event: &DecodedEvent) -> Result<(), ObserverError> {
        self(event)
    }
}

/// Fans decoded events out to observers in registration order.
///
/// Observers are added during setup. Once the dispatcher is shared with
/// the listeners it is read-only.
#[derive(Default)]
pub struct EventDispatcher {
    observers: Vec<Arc<dyn Observer>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: Arc<dyn Observer>) {
        self.observers.push(observer);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.register(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Deliver `event` to every observer. Returns how many accepted it.
    ///
    /// A failing or panicking observer is logged and skipped.
    pub fn publish(&self, event: &DecodedEvent) -> usize {
        let mut delivered = 0;
        for (index, observer) in self.observers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| observer.on_event(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(err)) => warn!(
                    observer = observer.name(),
                    index,
                    event = event.kind(),
                    error = %err,
                    "observer failed"
                ),
                Err(_) => warn!(
                    observer = observer.name(),
                    index,
                    event = event.kind(),
                    "observer panicked"
                ),
            }
        }
        delivered
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("observers", &self.observers.len())
            .finish()
    }
}
