//! Device-scoped view of a transport
//!
//! Adds and strips the SL88 preamble/terminator so everything above works on
//! bare payload hex. Listeners registered here only see framed messages.

use crate::grammar::{GrammarError, SysexMessage};
use crate::transport::{ListenerGuard, ListenerId, SysexTransport, TransportError};
use regex::Regex;
use std::sync::Arc;

/// Default Studiologic preamble: SysEx start plus manufacturer id
pub const DEFAULT_PREAMBLE: &str = "f000204b";

/// SysEx end
pub const DEFAULT_TERMINATOR: &str = "f7";

/// Error type for device operations
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error(transparent)]
    Grammar(#[from] GrammarError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Fixed hex around every payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framing {
    preamble: String,
    terminator: String,
}

impl Default for Framing {
    fn default() -> Self {
        Self::new(DEFAULT_PREAMBLE, DEFAULT_TERMINATOR)
    }
}

impl Framing {
    pub fn new(preamble: &str, terminator: &str) -> Self {
        Self {
            preamble: preamble.to_ascii_lowercase(),
            terminator: terminator.to_ascii_lowercase(),
        }
    }

    pub fn wrap(&self, payload: &str) -> String {
        format!("{}{}{}", self.preamble, payload, self.terminator)
    }

    /// Payload of a framed message, or `None` if the framing does not match
    pub fn strip<'a>(&self, hex: &'a str) -> Option<&'a str> {
        hex.strip_prefix(self.preamble.as_str())?
            .strip_suffix(self.terminator.as_str())
    }
}

/// One SL88 reachable through a transport
pub struct Sl88Device {
    transport: Arc<SysexTransport>,
    framing: Framing,
}

impl Sl88Device {
    pub fn new(transport: Arc<SysexTransport>, framing: Framing) -> Arc<Self> {
        Arc::new(Self { transport, framing })
    }

    pub fn transport(&self) -> &Arc<SysexTransport> {
        &self.transport
    }

    pub fn framing(&self) -> &Framing {
        &self.framing
    }

    /// Listen for payloads carrying this device's framing
    pub fn register_listener(
        &self,
        listener: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> ListenerId {
        let framing = self.framing.clone();
        self.transport
            .register_listener(move |hex| framing.strip(hex).is_some_and(&listener))
    }

    pub fn unregister(&self, id: ListenerId) -> bool {
        self.transport.unregister(id)
    }

    pub fn guard(&self, id: ListenerId) -> ListenerGuard<'_> {
        self.transport.guard(id)
    }

    /// Diagnostic sink for unclaimed messages (payload when framed, raw hex otherwise)
    pub fn set_unhandled(&self, sink: impl Fn(&str) + Send + Sync + 'static) {
        let framing = self.framing.clone();
        self.transport
            .set_unhandled(move |hex| sink(framing.strip(hex).unwrap_or(hex)));
    }

    pub fn send(&self, payload: &str) -> Result<(), DeviceError> {
        Ok(self.transport.send(&self.framing.wrap(payload))?)
    }

    pub async fn send_async(&self, payload: &str) -> Result<(), DeviceError> {
        Ok(self
            .transport
            .send_async(&self.framing.wrap(payload))
            .await?)
    }

    /// Send and wait for a payload matching `pattern`
    pub async fn request_async(&self, payload: &str, pattern: Regex) -> Result<String, DeviceError> {
        let framing = self.framing.clone();
        let reply = self
            .transport
            .request_object_async(&self.framing.wrap(payload), move |hex| {
                framing
                    .strip(hex)
                    .filter(|p| pattern.is_match(p))
                    .map(str::to_string)
            })
            .await?;
        Ok(reply)
    }

    /// Send and wait for a payload `decode` accepts
    pub async fn request_object_async<T: Send + 'static>(
        &self,
        payload: &str,
        decode: impl Fn(&str) -> Option<T> + Send + Sync + 'static,
    ) -> Result<T, DeviceError> {
        let framing = self.framing.clone();
        let reply = self
            .transport
            .request_object_async(&self.framing.wrap(payload), move |hex| {
                framing.strip(hex).and_then(&decode)
            })
            .await?;
        Ok(reply)
    }

    pub fn send_message<M: SysexMessage>(&self, message: &M) -> Result<(), DeviceError> {
        self.send(&message.encode()?)
    }

    pub async fn send_message_async<M: SysexMessage>(&self, message: &M) -> Result<(), DeviceError> {
        self.send_async(&message.encode()?).await
    }

    /// Send `message` and wait for the first reply decoding as `R`
    pub async fn request_message<M: SysexMessage, R: SysexMessage>(
        &self,
        message: &M,
    ) -> Result<R, DeviceError> {
        self.request_object_async(&message.encode()?, R::decode).await
    }
}
