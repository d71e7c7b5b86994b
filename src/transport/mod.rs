//! Layered transports.
//!
//! A transport stack is a chain of [`Transport`] objects. The bottom link
//! owns the I/O resource ([`TcpTransport`] over [`IoTransport`], or
//! [`MockTransport`] in tests); filters such as [`WireFormatNegotiator`] and
//! [`ResponseCorrelator`] wrap the next link and intercept only what they
//! augment. Inbound commands travel the other way: each link is the
//! [`TransportListener`] of the link below it, and the top link hands them to
//! the application's listener.
//!
//! [`TransportRegistry`] builds stacks from broker URIs.
//!
//! [`WireFormatNegotiator`]: crate::wireformat::WireFormatNegotiator

mod correlator;
mod failover;
mod inactivity;
mod io;
mod mock;
mod registry;
mod tcp;

pub use correlator::{FutureResponse, ResponseCallback, ResponseCorrelator, ResponseFuture};
pub use failover::{FailoverTransport, ReconnectPolicy, SendWhileDisconnected, UriPool};
pub use inactivity::InactivityMonitor;
pub use io::IoTransport;
pub use mock::{DefaultResponseBuilder, MockTransport, ResponseBuilder};
pub use registry::{
    FailoverTransportFactory, MockTransportFactory, TcpTransportFactory, TransportFactory,
    TransportRegistry,
};
pub use tcp::{DefaultSocketFactory, SocketFactory, SocketOptions, TcpTransport};

use crate::commands::{Command, Response};
use crate::error::Error;
use downcast_rs::{impl_downcast, DowncastSync};
use std::any::TypeId;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;
use tracing::{debug, warn};

// ============================================================================
// Transport Traits
// ============================================================================

/// Receives inbound commands and asynchronous failures from a transport.
///
/// Callbacks run on the transport's reader thread. Implementations must not
/// block for long and must not join that thread.
pub trait TransportListener: Send + Sync {
    fn on_command(&self, command: Command);

    /// Called once when the transport fails in the background.
    fn on_exception(&self, error: Error);

    /// The connection was lost and a reconnect is in progress.
    fn transport_interrupted(&self) {}

    /// A lost connection was restored.
    fn transport_resumed(&self) {}
}

/// One link in a transport chain.
///
/// Lifecycle is `Created -> Started -> Closed` and never moves backwards.
/// Every method takes `&self`; transports are shared between application
/// threads and their reader thread.
pub trait Transport: DowncastSync {
    /// Starts the transport. Starting twice is a no-op; starting a closed
    /// transport fails with [`Error::Closed`].
    fn start(&self) -> Result<(), Error>;

    /// Stops background activity. A stopped transport should be closed.
    fn stop(&self) -> Result<(), Error>;

    /// Releases the underlying resources. Idempotent.
    fn close(&self) -> Result<(), Error>;

    /// Sends a command without waiting for an answer.
    fn oneway(&self, command: Command) -> Result<(), Error>;

    /// Sends a command and blocks until the matching response arrives.
    fn request(&self, _command: Command) -> Result<Response, Error> {
        Err(Error::UnsupportedOperation("request"))
    }

    /// Like [`Transport::request`] but fails with [`Error::Timeout`] once
    /// `timeout` passes.
    fn request_timeout(&self, _command: Command, _timeout: Duration) -> Result<Response, Error> {
        Err(Error::UnsupportedOperation("request"))
    }

    /// Replaces the listener. Each transport has at most one.
    fn set_transport_listener(&self, listener: Option<Arc<dyn TransportListener>>);

    fn transport_listener(&self) -> Option<Arc<dyn TransportListener>>;

    fn is_connected(&self) -> bool;

    fn is_closed(&self) -> bool;

    fn is_fault_tolerant(&self) -> bool {
        false
    }

    fn is_reconnect_supported(&self) -> bool {
        false
    }

    /// Address of the remote peer, when connected.
    fn remote_address(&self) -> Option<String> {
        None
    }

    /// Tells the chain that nobody waits for the response to `command_id`
    /// any more, so layers that keep requests for replay can drop it.
    /// Filters forward this to the next link.
    fn untrack_request(&self, _command_id: i32) {}

    /// Walks the chain looking for the link whose concrete type is `type_id`.
    ///
    /// Use [`narrow`] for a typed result.
    fn narrow(self: Arc<Self>, type_id: TypeId) -> Option<Arc<dyn Transport>>;
}
impl_downcast!(sync Transport);

/// Finds the link of type `T` in the chain starting at `transport`.
///
/// ```
/// use openwire_transport::transport::{narrow, MockTransport, ResponseCorrelator, Transport};
/// use std::sync::Arc;
///
/// let mock = Arc::new(MockTransport::new("demo"));
/// let stack: Arc<dyn Transport> = ResponseCorrelator::new(mock.clone());
/// let found = narrow::<MockTransport>(&stack).unwrap();
/// assert!(Arc::ptr_eq(&found, &mock));
/// ```
pub fn narrow<T: Transport>(transport: &Arc<dyn Transport>) -> Option<Arc<T>> {
    transport
        .clone()
        .narrow(TypeId::of::<T>())
        .and_then(|link| link.downcast_arc::<T>().ok())
}

// ============================================================================
// Shared Building Blocks
// ============================================================================

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds a transport's listener and forwards events to it.
#[derive(Default)]
pub(crate) struct ListenerSlot {
    listener: RwLock<Option<Arc<dyn TransportListener>>>,
}

impl ListenerSlot {
    pub(crate) fn set(&self, listener: Option<Arc<dyn TransportListener>>) {
        *self
            .listener
            .write()
            .unwrap_or_else(PoisonError::into_inner) = listener;
    }

    pub(crate) fn get(&self) -> Option<Arc<dyn TransportListener>> {
        self.listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn on_command(&self, command: Command) {
        match self.get() {
            Some(listener) => listener.on_command(command),
            None => debug!(command = command.type_name(), "No listener, dropping command"),
        }
    }

    pub(crate) fn on_exception(&self, error: Error) {
        match self.get() {
            Some(listener) => listener.on_exception(error),
            None => warn!(%error, "No listener for transport failure"),
        }
    }

    pub(crate) fn transport_interrupted(&self) {
        if let Some(listener) = self.get() {
            listener.transport_interrupted();
        }
    }

    pub(crate) fn transport_resumed(&self) {
        if let Some(listener) = self.get() {
            listener.transport_resumed();
        }
    }
}

/// Listener installed by a filter on the link below it. Holds the filter
/// weakly so the chain has no reference cycle.
pub(crate) struct Upstream<T>(Weak<T>);

impl<T: TransportListener + 'static> Upstream<T> {
    pub(crate) fn listener(filter: Weak<T>) -> Arc<dyn TransportListener> {
        Arc::new(Upstream(filter))
    }
}

impl<T: TransportListener> TransportListener for Upstream<T> {
    fn on_command(&self, command: Command) {
        if let Some(filter) = self.0.upgrade() {
            filter.on_command(command);
        }
    }

    fn on_exception(&self, error: Error) {
        if let Some(filter) = self.0.upgrade() {
            filter.on_exception(error);
        }
    }

    fn transport_interrupted(&self) {
        if let Some(filter) = self.0.upgrade() {
            filter.transport_interrupted();
        }
    }

    fn transport_resumed(&self) {
        if let Some(filter) = self.0.upgrade() {
            filter.transport_resumed();
        }
    }
}

const CREATED: u8 = 0;
const STARTED: u8 = 1;
const CLOSED: u8 = 2;

/// The `Created -> Started -> Closed` state machine shared by every link.
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    /// Moves to Started. Returns false when already started.
    pub(crate) fn begin_start(&self) -> Result<bool, Error> {
        match self
            .state
            .compare_exchange(CREATED, STARTED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(true),
            Err(STARTED) => Ok(false),
            Err(_) => Err(Error::Closed),
        }
    }

    /// Undoes a `begin_start` whose start-up work failed.
    pub(crate) fn abort_start(&self) {
        let _ = self
            .state
            .compare_exchange(STARTED, CREATED, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Moves to Closed. Returns true only for the first call.
    pub(crate) fn begin_close(&self) -> bool {
        self.state.swap(CLOSED, Ordering::AcqRel) != CLOSED
    }

    pub(crate) fn is_started(&self) -> bool {
        self.state.load(Ordering::Acquire) == STARTED
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) == CLOSED
    }

    pub(crate) fn check_open(&self) -> Result<(), Error> {
        if self.is_closed() {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_is_monotonic() {
        let lifecycle = Lifecycle::default();
        assert!(!lifecycle.is_started());
        assert!(lifecycle.begin_start().unwrap());
        assert!(!lifecycle.begin_start().unwrap());
        assert!(lifecycle.begin_close());
        assert!(!lifecycle.begin_close());
        assert!(matches!(lifecycle.begin_start(), Err(Error::Closed)));
        assert!(lifecycle.check_open().is_err());
    }

    #[test]
    fn aborted_start_can_be_retried() {
        let lifecycle = Lifecycle::default();
        assert!(lifecycle.begin_start().unwrap());
        lifecycle.abort_start();
        assert!(!lifecycle.is_started());
        assert!(lifecycle.begin_start().unwrap());
    }
}
