//! Request/response correlation.
//!
//! [`ResponseCorrelator`] stamps every outbound command with a fresh id and
//! matches inbound responses to the requests waiting for them through
//! [`FutureResponse`] slots keyed by that id.

use super::{lock, ListenerSlot, Transport, TransportListener, Upstream};
use crate::commands::{Command, Response};
use crate::error::Error;
use futures::channel::oneshot;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, trace, warn};

/// Called once with the outcome of an asynchronous request; `None` means the
/// transport failed or closed before a response arrived.
pub type ResponseCallback = Box<dyn FnOnce(Option<Response>) + Send>;

// ============================================================================
// FutureResponse
// ============================================================================

/// Single-slot container for the response to one request.
///
/// Resolved exactly once, either with a response or with `None` when the
/// transport gives up. Waiters block on a condition variable that is separate
/// from the correlator's request map.
#[derive(Default)]
pub struct FutureResponse {
    slot: Mutex<Option<Option<Response>>>,
    ready: Condvar,
    callback: Mutex<Option<ResponseCallback>>,
}

impl FutureResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ResponseCallback) -> Self {
        Self {
            callback: Mutex::new(Some(callback)),
            ..Self::default()
        }
    }

    /// Resolves the slot and wakes every waiter. Later calls are ignored.
    pub fn set_response(&self, response: Option<Response>) {
        {
            let mut slot = lock(&self.slot);
            if slot.is_some() {
                return;
            }
            *slot = Some(response.clone());
            self.ready.notify_all();
        }
        if let Some(callback) = lock(&self.callback).take() {
            callback(response);
        }
    }

    pub fn is_done(&self) -> bool {
        lock(&self.slot).is_some()
    }

    /// Blocks until the slot is resolved.
    pub fn get_response(&self) -> Option<Response> {
        let slot = lock(&self.slot);
        let slot = self
            .ready
            .wait_while(slot, |slot| slot.is_none())
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        slot.clone().flatten()
    }

    /// Blocks until the slot is resolved or `timeout` passes.
    pub fn get_response_timeout(&self, timeout: Duration) -> Result<Option<Response>, Error> {
        let slot = lock(&self.slot);
        let (slot, result) = self
            .ready
            .wait_timeout_while(slot, timeout, |slot| slot.is_none())
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if result.timed_out() && slot.is_none() {
            return Err(Error::Timeout(timeout));
        }
        Ok(slot.clone().flatten())
    }
}

impl fmt::Debug for FutureResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureResponse")
            .field("done", &self.is_done())
            .finish()
    }
}

/// Future returned by [`ResponseCorrelator::send_request`].
#[derive(Debug)]
pub struct ResponseFuture {
    receiver: oneshot::Receiver<Option<Response>>,
    command_type: &'static str,
    command_id: i32,
}

impl ResponseFuture {
    pub fn command_id(&self) -> i32 {
        self.command_id
    }
}

impl Future for ResponseFuture {
    type Output = Result<Response, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let command_type = self.command_type;
        let command_id = self.command_id;
        Pin::new(&mut self.receiver).poll(cx).map(|outcome| match outcome {
            Ok(Some(response)) => Ok(response),
            Ok(None) | Err(oneshot::Canceled) => Err(Error::NoResponse {
                command_type,
                command_id,
                cause: None,
            }),
        })
    }
}

// ============================================================================
// ResponseCorrelator
// ============================================================================

#[derive(Default)]
struct Requests {
    pending: HashMap<i32, Arc<FutureResponse>>,
    prior_error: Option<String>,
}

/// Filter that turns any transport into a request/response transport.
///
/// Ids start at 1 and increase by one for every `oneway` or `request`. A
/// request's slot is registered before the command is sent and removed on
/// every exit path. When the transport below fails or this filter is closed,
/// every waiter is released with no response and later sends fail.
pub struct ResponseCorrelator {
    next: Arc<dyn Transport>,
    listener: ListenerSlot,
    next_command_id: AtomicI32,
    requests: Mutex<Requests>,
    closed: AtomicBool,
}

// Removes a request's slot however the request ends. A slot still present
// means no response came, so the links below stop tracking the request too.
struct RequestGuard<'a> {
    correlator: &'a ResponseCorrelator,
    command_id: i32,
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        let abandoned = lock(&self.correlator.requests)
            .pending
            .remove(&self.command_id)
            .is_some();
        if abandoned {
            self.correlator.next.untrack_request(self.command_id);
        }
    }
}

impl ResponseCorrelator {
    pub fn new(next: Arc<dyn Transport>) -> Arc<Self> {
        let correlator = Arc::new(Self {
            next,
            listener: ListenerSlot::default(),
            next_command_id: AtomicI32::new(1),
            requests: Mutex::new(Requests::default()),
            closed: AtomicBool::new(false),
        });
        correlator
            .next
            .set_transport_listener(Some(Upstream::listener(Arc::downgrade(&correlator))));
        correlator
    }

    /// Number of requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        lock(&self.requests).pending.len()
    }

    /// Sends a request without blocking. The returned slot resolves when the
    /// response arrives; `callback`, if given, runs on the thread that
    /// resolves it.
    pub fn async_request(
        &self,
        command: Command,
        callback: Option<ResponseCallback>,
    ) -> Result<Arc<FutureResponse>, Error> {
        let future = Arc::new(match callback {
            Some(callback) => FutureResponse::with_callback(callback),
            None => FutureResponse::new(),
        });
        self.submit(command, future.clone())?;
        Ok(future)
    }

    /// Sends a request and returns a future for its response.
    ///
    /// Dropping the future does not cancel the request; its slot is removed
    /// when the response arrives or the transport fails.
    pub fn send_request(&self, command: Command) -> Result<ResponseFuture, Error> {
        let command_type = command.type_name();
        let (sender, receiver) = oneshot::channel();
        let future = Arc::new(FutureResponse::with_callback(Box::new(move |response| {
            let _ = sender.send(response);
        })));
        let command_id = self.submit(command, future)?;
        Ok(ResponseFuture {
            receiver,
            command_type,
            command_id,
        })
    }

    // Registers `future` and sends `command` without waiting.
    fn submit(&self, mut command: Command, future: Arc<FutureResponse>) -> Result<i32, Error> {
        self.check_usable()?;
        let command_id = self.stamp(&mut command, true);
        self.register(command_id, future)?;
        if let Err(err) = self.next.oneway(command) {
            lock(&self.requests).pending.remove(&command_id);
            self.next.untrack_request(command_id);
            return Err(err);
        }
        Ok(command_id)
    }

    fn check_usable(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        if let Some(reason) = &lock(&self.requests).prior_error {
            return Err(Error::TransportFailure(reason.clone()));
        }
        Ok(())
    }

    fn stamp(&self, command: &mut Command, response_required: bool) -> i32 {
        let command_id = self.next_command_id.fetch_add(1, Ordering::AcqRel);
        command.set_command_id(command_id);
        command.set_response_required(response_required);
        command_id
    }

    fn register(&self, command_id: i32, future: Arc<FutureResponse>) -> Result<(), Error> {
        let mut requests = lock(&self.requests);
        if let Some(reason) = &requests.prior_error {
            return Err(Error::TransportFailure(reason.clone()));
        }
        requests.pending.insert(command_id, future);
        Ok(())
    }

    fn send_and_wait(
        &self,
        mut command: Command,
        timeout: Option<Duration>,
    ) -> Result<Response, Error> {
        self.check_usable()?;
        let command_id = self.stamp(&mut command, true);
        let command_type = command.type_name();
        let future = Arc::new(FutureResponse::new());
        self.register(command_id, future.clone())?;
        let _guard = RequestGuard {
            correlator: self,
            command_id,
        };

        let started = Instant::now();
        self.next.oneway(command)?;
        let response = match timeout {
            None => future.get_response(),
            Some(timeout) => {
                let remaining = timeout.saturating_sub(started.elapsed());
                future
                    .get_response_timeout(remaining)
                    .map_err(|_| Error::Timeout(timeout))?
            }
        };
        response.ok_or_else(|| Error::NoResponse {
            command_type,
            command_id,
            cause: lock(&self.requests).prior_error.clone(),
        })
    }

    // Releases every waiter with no response and remembers the first cause.
    fn dispose(&self, reason: String) {
        let released: Vec<_> = {
            let mut requests = lock(&self.requests);
            if requests.prior_error.is_none() {
                requests.prior_error = Some(reason);
            }
            requests.pending.drain().map(|(_, future)| future).collect()
        };
        if !released.is_empty() {
            debug!(count = released.len(), "Releasing pending requests");
        }
        for future in released {
            future.set_response(None);
        }
    }
}

impl Transport for ResponseCorrelator {
    fn start(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        self.next.start()
    }

    fn stop(&self) -> Result<(), Error> {
        self.next.stop()
    }

    #[instrument(skip(self))]
    fn close(&self) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.dispose("transport closed".into());
        self.next.close()
    }

    fn oneway(&self, mut command: Command) -> Result<(), Error> {
        self.check_usable()?;
        self.stamp(&mut command, false);
        self.next.oneway(command)
    }

    fn request(&self, command: Command) -> Result<Response, Error> {
        self.send_and_wait(command, None)
    }

    fn request_timeout(&self, command: Command, timeout: Duration) -> Result<Response, Error> {
        self.send_and_wait(command, Some(timeout))
    }

    fn set_transport_listener(&self, listener: Option<Arc<dyn TransportListener>>) {
        self.listener.set(listener);
    }

    fn transport_listener(&self) -> Option<Arc<dyn TransportListener>> {
        self.listener.get()
    }

    fn is_connected(&self) -> bool {
        self.next.is_connected()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.next.is_closed()
    }

    fn is_fault_tolerant(&self) -> bool {
        self.next.is_fault_tolerant()
    }

    fn is_reconnect_supported(&self) -> bool {
        self.next.is_reconnect_supported()
    }

    fn remote_address(&self) -> Option<String> {
        self.next.remote_address()
    }

    fn untrack_request(&self, command_id: i32) {
        self.next.untrack_request(command_id);
    }

    fn narrow(self: Arc<Self>, type_id: TypeId) -> Option<Arc<dyn Transport>> {
        if type_id == TypeId::of::<Self>() {
            return Some(self);
        }
        self.next.clone().narrow(type_id)
    }
}

impl TransportListener for ResponseCorrelator {
    fn on_command(&self, command: Command) {
        let Command::Response(response) = command else {
            self.listener.on_command(command);
            return;
        };
        let future = lock(&self.requests)
            .pending
            .remove(&response.correlation_id);
        match future {
            Some(future) => future.set_response(Some(response)),
            None => trace!(
                correlation_id = response.correlation_id,
                "Ignoring response with no pending request"
            ),
        }
    }

    fn on_exception(&self, error: Error) {
        warn!(%error, "Transport failed, releasing pending requests");
        self.dispose(error.to_string());
        self.listener.on_exception(error);
    }

    fn transport_interrupted(&self) {
        self.listener.transport_interrupted();
    }

    fn transport_resumed(&self) {
        self.listener.transport_resumed();
    }
}

impl Drop for ResponseCorrelator {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
