use super::OpenWireFormat;
use crate::commands::Command;
use crate::error::Error;
use crate::transport::{lock, ListenerSlot, Transport, TransportListener, Upstream};
use std::any::TypeId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, PartialEq)]
enum Negotiation {
    Pending,
    Done,
    Failed(String),
}

/// Filter that performs the `WireFormatInfo` handshake.
///
/// Sends the local preferred `WireFormatInfo` when started. When the peer's
/// arrives, the wire format is renegotiated and the command is passed on.
/// Outbound commands wait for the handshake, up to the wire format's
/// negotiate timeout.
pub struct WireFormatNegotiator {
    next: Arc<dyn Transport>,
    wire_format: Arc<OpenWireFormat>,
    listener: ListenerSlot,
    negotiation: Mutex<Negotiation>,
    negotiated: Condvar,
    info_sent: AtomicBool,
}

impl WireFormatNegotiator {
    pub fn new(next: Arc<dyn Transport>, wire_format: Arc<OpenWireFormat>) -> Arc<Self> {
        let negotiator = Arc::new(Self {
            next,
            wire_format,
            listener: ListenerSlot::default(),
            negotiation: Mutex::new(Negotiation::Pending),
            negotiated: Condvar::new(),
            info_sent: AtomicBool::new(false),
        });
        negotiator
            .next
            .set_transport_listener(Some(Upstream::listener(Arc::downgrade(&negotiator))));
        negotiator
    }

    pub fn wire_format(&self) -> &Arc<OpenWireFormat> {
        &self.wire_format
    }

    /// True once the peer's `WireFormatInfo` has been applied.
    pub fn is_negotiated(&self) -> bool {
        *lock(&self.negotiation) == Negotiation::Done
    }

    fn finish(&self, outcome: Negotiation) {
        let mut negotiation = lock(&self.negotiation);
        if *negotiation == Negotiation::Pending {
            *negotiation = outcome;
            self.negotiated.notify_all();
        }
    }

    fn wait_for_negotiation(&self) -> Result<(), Error> {
        let timeout = self.wire_format.negotiate_timeout();
        let negotiation = lock(&self.negotiation);
        let (negotiation, _) = self
            .negotiated
            .wait_timeout_while(negotiation, timeout, |state| *state == Negotiation::Pending)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match &*negotiation {
            Negotiation::Done => Ok(()),
            Negotiation::Failed(reason) => Err(Error::TransportFailure(reason.clone())),
            Negotiation::Pending => Err(Error::TransportFailure(format!(
                "wire format negotiation timed out after {timeout:?}: peer did not send its wire format"
            ))),
        }
    }
}

impl Transport for WireFormatNegotiator {
    #[instrument(skip(self))]
    fn start(&self) -> Result<(), Error> {
        self.next.start()?;
        if !self.info_sent.swap(true, Ordering::AcqRel) {
            let info = self.wire_format.preferred_wire_format_info().clone();
            debug!(version = info.version, "Sending WireFormatInfo");
            if let Err(err) = self.next.oneway(info.into()) {
                self.finish(Negotiation::Failed(err.to_string()));
                return Err(err);
            }
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), Error> {
        self.next.stop()
    }

    fn close(&self) -> Result<(), Error> {
        self.finish(Negotiation::Failed("transport closed".into()));
        self.next.close()
    }

    fn oneway(&self, command: Command) -> Result<(), Error> {
        if !matches!(command, Command::WireFormatInfo(_)) {
            self.wait_for_negotiation()?;
        }
        self.next.oneway(command)
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
        self.next.is_closed()
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

impl TransportListener for WireFormatNegotiator {
    fn on_command(&self, command: Command) {
        if let Command::WireFormatInfo(info) = &command {
            if let Err(err) = self.wire_format.renegotiate(info) {
                warn!(%err, "Wire format negotiation failed");
                self.finish(Negotiation::Failed(err.to_string()));
                self.listener.on_exception(err);
                return;
            }
            self.finish(Negotiation::Done);
        }
        self.listener.on_command(command);
    }

    fn on_exception(&self, error: Error) {
        self.finish(Negotiation::Failed(error.to_string()));
        self.listener.on_exception(error);
    }

    fn transport_interrupted(&self) {
        self.listener.transport_interrupted();
    }

    fn transport_resumed(&self) {
        self.listener.transport_resumed();
    }
}
