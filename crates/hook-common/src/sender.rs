//! The [`EventSender`] trait is how hook code hands finished events to the
//! transport.
//!
//! [`EventSender::send`] must never block: it runs on the syscall path and
//! observability output must not create backpressure on the monitored
//! workload. A full transport drops the event, there is no retry.

use tokio::sync::mpsc;

pub trait EventSender<T>: Clone + Send + 'static {
    /// Must not block since it runs synchronously inside hook invocations.
    fn send(&mut self, event: T);
}

/// Simple implementation for tokio::mpsc bounded channels.
/// Sending with full channel will drop messages.
impl<T: 'static + Send> EventSender<T> for mpsc::Sender<T> {
    fn send(&mut self, event: T) {
        if self.try_send(event).is_err() {
            log::warn!("dropping msg");
        }
    }
}

/// EventSenderWrapper wraps an EventSender with a new one which calls
/// a callback on every event passing through. This is useful for code
/// which wants to take some action when sending events.
#[derive(Clone)]
pub struct EventSenderWrapper<S, F> {
    cb: F,
    inner: S,
}

impl<S, F> EventSenderWrapper<S, F> {
    pub fn new(inner: S, cb: F) -> Self {
        Self { inner, cb }
    }
}

impl<S, F, T> EventSender<T> for EventSenderWrapper<S, F>
where
    S: EventSender<T>,
    F: FnMut(&T) + Clone + Send + 'static,
{
    fn send(&mut self, event: T) {
        (self.cb)(&event);
        self.inner.send(event)
    }
}
