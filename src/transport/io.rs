use super::{lock, Lifecycle, ListenerSlot, Transport, TransportListener};
use crate::commands::{Command, DataStructure};
use crate::error::Error;
use crate::wireformat::OpenWireFormat;
use std::any::TypeId;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, instrument, trace, warn};

type Input = Box<dyn Read + Send>;
type Output = Box<dyn Write + Send>;

/// Frames commands over a pair of byte streams.
///
/// Outbound commands are marshalled on the caller's thread under a write
/// lock. A dedicated reader thread unmarshals inbound frames and hands each
/// command to the listener. Errors seen after `close` are not reported.
///
/// The owner of the streams must unblock a pending read before calling
/// `close` (for sockets, by shutting the socket down); `close` joins the
/// reader thread unless it is called from that thread.
pub struct IoTransport {
    inner: Arc<Inner>,
    input: Mutex<Option<Input>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    wire_format: Arc<OpenWireFormat>,
    listener: ListenerSlot,
    lifecycle: Lifecycle,
    output: Mutex<Option<Output>>,
}

impl IoTransport {
    pub fn new(wire_format: Arc<OpenWireFormat>) -> Self {
        Self {
            inner: Arc::new(Inner {
                wire_format,
                listener: ListenerSlot::default(),
                lifecycle: Lifecycle::default(),
                output: Mutex::new(None),
            }),
            input: Mutex::new(None),
            reader: Mutex::new(None),
        }
    }

    /// Sets the stream the reader thread consumes. Must precede `start`.
    pub fn set_input_stream(&self, input: impl Read + Send + 'static) {
        *lock(&self.input) = Some(Box::new(input));
    }

    pub fn set_output_stream(&self, output: impl Write + Send + 'static) {
        *lock(&self.inner.output) = Some(Box::new(output));
    }

    pub fn wire_format(&self) -> &Arc<OpenWireFormat> {
        &self.inner.wire_format
    }

    fn read_loop(inner: Arc<Inner>, mut input: Input) {
        while !inner.lifecycle.is_closed() {
            let data = match inner.wire_format.unmarshal(&mut input) {
                Ok(Some(data)) => data,
                Ok(None) => continue,
                Err(err) => {
                    inner.report_failure(err);
                    break;
                }
            };
            match data {
                DataStructure::Command(command) => {
                    trace!(command = command.type_name(), id = command.command_id(), "Received command");
                    inner.listener.on_command(command);
                }
                other => {
                    inner.report_failure(Error::malformed(format!(
                        "received non-command structure of type {}",
                        other.data_structure_type()
                    )));
                    break;
                }
            }
        }
        debug!("Reader thread exiting");
    }
}

impl Inner {
    fn report_failure(&self, error: Error) {
        if self.lifecycle.is_closed() {
            debug!(%error, "Ignoring read error after close");
            return;
        }
        warn!(%error, "Transport read failed");
        self.listener.on_exception(error);
    }
}

impl Transport for IoTransport {
    #[instrument(skip(self))]
    fn start(&self) -> Result<(), Error> {
        if !self.inner.lifecycle.begin_start()? {
            return Ok(());
        }
        let streams_ready = lock(&self.inner.output).is_some();
        let input = match lock(&self.input).take() {
            Some(input) if streams_ready => input,
            _ => {
                self.inner.lifecycle.abort_start();
                return Err(Error::TransportFailure(
                    "input and output streams must be set before start".into(),
                ));
            }
        };

        let inner = self.inner.clone();
        let handle = thread::Builder::new()
            .name("openwire-reader".into())
            .spawn(move || Self::read_loop(inner, input));
        match handle {
            Ok(handle) => {
                *lock(&self.reader) = Some(handle);
                debug!("Started reader thread");
                Ok(())
            }
            Err(err) => {
                self.inner.lifecycle.abort_start();
                Err(err.into())
            }
        }
    }

    fn stop(&self) -> Result<(), Error> {
        self.close()
    }

    #[instrument(skip(self))]
    fn close(&self) -> Result<(), Error> {
        if !self.inner.lifecycle.begin_close() {
            return Ok(());
        }
        if let Some(mut output) = lock(&self.inner.output).take() {
            if let Err(err) = output.flush() {
                debug!(%err, "Flush on close failed");
            }
        }
        lock(&self.input).take();

        if let Some(handle) = lock(&self.reader).take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("Reader thread panicked");
            }
        }
        debug!("Closed I/O transport");
        Ok(())
    }

    fn oneway(&self, command: Command) -> Result<(), Error> {
        self.inner.lifecycle.check_open()?;
        if !self.inner.lifecycle.is_started() {
            return Err(Error::TransportFailure("transport not started".into()));
        }
        trace!(command = command.type_name(), id = command.command_id(), "Sending command");

        let mut output = lock(&self.inner.output);
        let out = output.as_mut().ok_or(Error::Closed)?;
        let data = DataStructure::Command(command);
        self.inner.wire_format.marshal(Some(&data), out)?;
        out.flush()?;
        Ok(())
    }

    fn set_transport_listener(&self, listener: Option<Arc<dyn TransportListener>>) {
        self.inner.listener.set(listener);
    }

    fn transport_listener(&self) -> Option<Arc<dyn TransportListener>> {
        self.inner.listener.get()
    }

    fn is_connected(&self) -> bool {
        self.inner.lifecycle.is_started()
    }

    fn is_closed(&self) -> bool {
        self.inner.lifecycle.is_closed()
    }

    fn narrow(self: Arc<Self>, type_id: TypeId) -> Option<Arc<dyn Transport>> {
        (type_id == TypeId::of::<Self>()).then_some(self as Arc<dyn Transport>)
    }
}

impl Drop for IoTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
