//! SysEx listener chain with awaitable requests
//!
//! Inbound hex is offered to listeners most-recently-registered first; the
//! first one returning `true` claims the message. Requests register a
//! one-shot listener, send, and race the reply against a timeout.
//!
//! Dispatch runs from a single task (see [`connection`](crate::connection)),
//! so listeners observe messages in arrival order.

use regex::Regex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::hex::pretty_hex;

/// Error type for transport operations
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Timed out waiting for a reply to {request}")]
    Timeout { request: String },

    #[error("Failed to send SysEx: {0}")]
    Send(String),

    #[error("Transport closed before a reply arrived")]
    Closed,
}

/// Anything that can put a hex SysEx message on the wire
pub trait SysexOutput: Send {
    fn send_hex(&mut self, hex: &str) -> Result<(), TransportError>;
}

/// Output that pushes each message into a channel (tests, loopback)
pub struct ChannelOutput(pub flume::Sender<String>);

impl SysexOutput for ChannelOutput {
    fn send_hex(&mut self, hex: &str) -> Result<(), TransportError> {
        self.0
            .send(hex.to_string())
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

/// Request timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Wait after a fire-and-forget send so the device can process it
    pub settle: Duration,
    /// How long a request waits for its reply
    pub timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(100),
            timeout: Duration::from_millis(2000),
        }
    }
}

pub type ListenerId = u64;

type Listener = Arc<dyn Fn(&str) -> bool + Send + Sync>;
type Hook = Arc<dyn Fn(&str) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Single-shot reply slot
///
/// `fulfill` and `cancel` both swap the settled flag, so whichever runs
/// first wins and the other becomes a no-op.
pub struct Subscription<T> {
    settled: AtomicBool,
    reply: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> Subscription<T> {
    pub fn new() -> (Arc<Self>, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let subscription = Arc::new(Self {
            settled: AtomicBool::new(false),
            reply: Mutex::new(Some(tx)),
        });
        (subscription, rx)
    }

    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    /// Deliver the reply; false if already settled
    pub fn fulfill(&self, value: T) -> bool {
        if self.settled.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(tx) = lock(&self.reply).take() {
            // Receiver gone means the requester stopped waiting
            let _ = tx.send(value);
        }
        true
    }

    /// Abandon the reply; false if already settled
    pub fn cancel(&self) -> bool {
        if self.settled.swap(true, Ordering::AcqRel) {
            return false;
        }
        lock(&self.reply).take();
        true
    }
}

/// Unregisters its listener when dropped
#[must_use = "the listener is removed as soon as the guard is dropped"]
pub struct ListenerGuard<'a> {
    transport: &'a SysexTransport,
    id: ListenerId,
}

impl Drop for ListenerGuard<'_> {
    fn drop(&mut self) {
        self.transport.unregister(self.id);
    }
}

/// Bidirectional SysEx channel with an ordered listener chain
pub struct SysexTransport {
    name: String,
    output: Mutex<Box<dyn SysexOutput>>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
    timing: Timing,
    forward: Mutex<Option<Hook>>,
    unhandled: Mutex<Option<Hook>>,
}

impl SysexTransport {
    pub fn new(name: impl Into<String>, output: impl SysexOutput + 'static, timing: Timing) -> Self {
        Self {
            name: name.into(),
            output: Mutex::new(Box::new(output)),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            timing,
            forward: Mutex::new(None),
            unhandled: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    /// Add a listener ahead of every existing one
    pub fn register_listener(
        &self,
        listener: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners).insert(0, (id, Arc::new(listener)));
        id
    }

    /// Remove a listener; false if it was already gone
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Tie listener `id` to the returned guard's lifetime
    pub fn guard(&self, id: ListenerId) -> ListenerGuard<'_> {
        ListenerGuard {
            transport: self,
            id,
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Observe every inbound message before the listeners see it
    pub fn set_forward(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *lock(&self.forward) = Some(Arc::new(hook));
    }

    /// Replace the default diagnostic sink for unclaimed messages
    pub fn set_unhandled(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *lock(&self.unhandled) = Some(Arc::new(hook));
    }

    /// Transmit immediately
    pub fn send(&self, hex: &str) -> Result<(), TransportError> {
        log::debug!("[MIDI OUT] {}: {}", self.name, pretty_hex(hex));
        lock(&self.output).send_hex(hex).map_err(|e| {
            log::warn!("[MIDI OUT] {}: send failed: {}", self.name, e);
            e
        })
    }

    /// Transmit, then wait out the settle delay
    pub async fn send_async(&self, hex: &str) -> Result<(), TransportError> {
        self.send(hex)?;
        tokio::time::sleep(self.timing.settle).await;
        Ok(())
    }

    /// Transmit and wait for the first inbound message matching `pattern`
    pub async fn request_async(&self, hex: &str, pattern: Regex) -> Result<String, TransportError> {
        self.request_object_async(hex, move |reply| {
            pattern.is_match(reply).then(|| reply.to_string())
        })
        .await
    }

    /// Transmit and wait for the first inbound message `decode` accepts
    pub async fn request_object_async<T: Send + 'static>(
        &self,
        hex: &str,
        decode: impl Fn(&str) -> Option<T> + Send + Sync + 'static,
    ) -> Result<T, TransportError> {
        let (subscription, mut reply) = Subscription::new();
        let waiting = Arc::clone(&subscription);
        let id = self.register_listener(move |payload| {
            if waiting.is_settled() {
                return false;
            }
            match decode(payload) {
                Some(value) => waiting.fulfill(value),
                None => false,
            }
        });
        // Unregisters on every exit, including a caller dropping this future
        let _listener = self.guard(id);

        self.send(hex)?;

        match tokio::time::timeout(self.timing.timeout, &mut reply).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                if subscription.cancel() {
                    log::warn!(
                        "[MIDI IN] {}: no reply to {} within {:?}",
                        self.name,
                        pretty_hex(hex),
                        self.timing.timeout
                    );
                    Err(TransportError::Timeout {
                        request: hex.to_string(),
                    })
                } else {
                    // Fulfilled right as the timer fired
                    reply.try_recv().map_err(|_| TransportError::Closed)
                }
            }
        }
    }

    /// Offer one inbound message to the chain; true if a listener claimed it
    pub fn dispatch(&self, hex: &str) -> bool {
        let hex = hex.to_ascii_lowercase();
        log::debug!("[MIDI IN] {}: {}", self.name, pretty_hex(&hex));

        let forward = lock(&self.forward).clone();
        if let Some(forward) = forward {
            forward(&hex);
        }

        let snapshot: Vec<Listener> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        if snapshot.iter().any(|listener| listener(&hex)) {
            return true;
        }

        let unhandled = lock(&self.unhandled).clone();
        match unhandled {
            Some(sink) => sink(&hex),
            None => log::debug!("[MIDI IN] {}: unhandled {}", self.name, pretty_hex(&hex)),
        }
        false
    }
}
