use super::{lock, Lifecycle, ListenerSlot, Transport, TransportListener};
use crate::commands::{Command, CommandVisitor, Response, WireFormatInfo};
use crate::config::{get_namespaced_bool_or, get_namespaced_string, get_namespaced_usize_or, with_parameters};
use crate::error::Error;
use crate::uri::BrokerUri;
use crate::wireformat::MAX_SUPPORTED_VERSION;
use ::config::Config;
use std::any::TypeId;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use tracing::{debug, instrument, trace};

const CONFIG_NAMESPACE: &str = "mock";

/// Decides how a [`MockTransport`] answers the commands sent through it.
pub trait ResponseBuilder: Send + Sync {
    /// The response to deliver for `command`, if any.
    fn build_response(&self, command: &Command) -> Option<Response>;

    /// Further inbound commands triggered by `command`.
    fn build_incoming_commands(&self, _command: &Command) -> Vec<Command> {
        Vec::new()
    }
}

/// Answers like a minimal broker: replies to `WireFormatInfo` with its own
/// and acknowledges every command that requires a response.
#[derive(Debug, Clone, Default)]
pub struct DefaultResponseBuilder;

struct Handshake;

impl CommandVisitor for Handshake {
    fn process_wire_format_info(&mut self, info: &WireFormatInfo) -> Result<Option<Command>, Error> {
        let version = info.version.min(MAX_SUPPORTED_VERSION);
        Ok(Some(WireFormatInfo::new(version).into()))
    }
}

impl ResponseBuilder for DefaultResponseBuilder {
    fn build_response(&self, command: &Command) -> Option<Response> {
        command
            .is_response_required()
            .then(|| Response::new(command.command_id()))
    }

    fn build_incoming_commands(&self, command: &Command) -> Vec<Command> {
        command
            .visit(&mut Handshake)
            .ok()
            .flatten()
            .into_iter()
            .collect()
    }
}

#[derive(Debug, Clone)]
struct MockSettings {
    auto_respond: bool,
    fail_on_start: bool,
    fail_on_send_message: bool,
    num_sent_messages_before_fail: usize,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            auto_respond: true,
            fail_on_start: false,
            fail_on_send_message: false,
            num_sent_messages_before_fail: 0,
        }
    }
}

/// In-process transport for tests.
///
/// Every outbound command is recorded. With auto-respond on, the
/// [`ResponseBuilder`]'s answers are delivered to the listener from a
/// dispatcher thread, the way a broker's replies arrive from a reader thread.
/// [`MockTransport::fire_command`] and [`MockTransport::fire_exception`]
/// inject inbound events on the caller's thread.
pub struct MockTransport {
    name: String,
    listener: Arc<ListenerSlot>,
    lifecycle: Lifecycle,
    settings: Mutex<MockSettings>,
    responder: RwLock<Arc<dyn ResponseBuilder>>,
    sent: Mutex<Vec<Command>>,
    num_sent: Mutex<usize>,
    outbox: Mutex<Option<Sender<Command>>>,
    inbox: Mutex<Option<Receiver<Command>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl MockTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_settings(name.into(), MockSettings::default())
    }

    /// Creates a mock from a `mock://name?key=value` URI. Settings come
    /// from the `mock` namespace: `autoRespond`, `failOnStart`,
    /// `failOnSendMessage` and `numSentMessagesBeforeFail`.
    pub fn from_uri(uri: &BrokerUri, config: &Config) -> Result<Self, Error> {
        let config = with_parameters(config, uri.parameters())?;
        let defaults = MockSettings::default();
        let settings = MockSettings {
            auto_respond: get_namespaced_bool_or(
                &config,
                CONFIG_NAMESPACE,
                "autoRespond",
                defaults.auto_respond,
            )?,
            fail_on_start: get_namespaced_bool_or(
                &config,
                CONFIG_NAMESPACE,
                "failOnStart",
                defaults.fail_on_start,
            )?,
            fail_on_send_message: get_namespaced_bool_or(
                &config,
                CONFIG_NAMESPACE,
                "failOnSendMessage",
                defaults.fail_on_send_message,
            )?,
            num_sent_messages_before_fail: get_namespaced_usize_or(
                &config,
                CONFIG_NAMESPACE,
                "numSentMessagesBeforeFail",
                defaults.num_sent_messages_before_fail,
            )?,
        };
        let name = match uri.host() {
            Some(host) => host.to_string(),
            None => get_namespaced_string(&config, CONFIG_NAMESPACE, "name")?
                .unwrap_or_else(|| "mock".to_string()),
        };
        Ok(Self::with_settings(name, settings))
    }

    fn with_settings(name: String, settings: MockSettings) -> Self {
        let (outbox, inbox) = channel();
        Self {
            name,
            listener: Arc::new(ListenerSlot::default()),
            lifecycle: Lifecycle::default(),
            settings: Mutex::new(settings),
            responder: RwLock::new(Arc::new(DefaultResponseBuilder)),
            sent: Mutex::new(Vec::new()),
            num_sent: Mutex::new(0),
            outbox: Mutex::new(Some(outbox)),
            inbox: Mutex::new(Some(inbox)),
            dispatcher: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_response_builder(&self, builder: Arc<dyn ResponseBuilder>) {
        *self
            .responder
            .write()
            .unwrap_or_else(PoisonError::into_inner) = builder;
    }

    /// Commands sent so far, in send order.
    pub fn sent_commands(&self) -> Vec<Command> {
        lock(&self.sent).clone()
    }

    pub fn clear_sent_commands(&self) {
        lock(&self.sent).clear();
    }

    pub fn num_sent_messages(&self) -> usize {
        *lock(&self.num_sent)
    }

    pub fn set_auto_respond(&self, enabled: bool) {
        lock(&self.settings).auto_respond = enabled;
    }

    pub fn set_fail_on_start(&self, enabled: bool) {
        lock(&self.settings).fail_on_start = enabled;
    }

    /// Makes every send after the first `after` sends fail.
    pub fn set_fail_on_send_message(&self, enabled: bool, after: usize) {
        let mut settings = lock(&self.settings);
        settings.fail_on_send_message = enabled;
        settings.num_sent_messages_before_fail = after;
    }

    /// Delivers `command` to the listener as if it had been received.
    pub fn fire_command(&self, command: Command) {
        trace!(mock = %self.name, command = command.type_name(), "Firing command");
        self.listener.on_command(command);
    }

    /// Reports `error` to the listener as a background transport failure.
    pub fn fire_exception(&self, error: Error) {
        debug!(mock = %self.name, %error, "Firing exception");
        self.listener.on_exception(error);
    }

    fn dispatch_loop(listener: Arc<ListenerSlot>, inbox: Receiver<Command>) {
        for command in inbox {
            listener.on_command(command);
        }
    }
}

impl Transport for MockTransport {
    #[instrument(skip(self), fields(mock = %self.name))]
    fn start(&self) -> Result<(), Error> {
        if lock(&self.settings).fail_on_start {
            return Err(Error::TransportFailure(format!(
                "mock transport '{}' configured to fail on start",
                self.name
            )));
        }
        if !self.lifecycle.begin_start()? {
            return Ok(());
        }
        let Some(inbox) = lock(&self.inbox).take() else {
            return Ok(());
        };
        let listener = self.listener.clone();
        let handle = thread::Builder::new()
            .name(format!("mock-{}", self.name))
            .spawn(move || Self::dispatch_loop(listener, inbox));
        match handle {
            Ok(handle) => {
                *lock(&self.dispatcher) = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.lifecycle.abort_start();
                Err(err.into())
            }
        }
    }

    fn stop(&self) -> Result<(), Error> {
        self.close()
    }

    fn close(&self) -> Result<(), Error> {
        if !self.lifecycle.begin_close() {
            return Ok(());
        }
        lock(&self.outbox).take();
        lock(&self.inbox).take();
        if let Some(handle) = lock(&self.dispatcher).take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        debug!(mock = %self.name, "Mock transport closed");
        Ok(())
    }

    fn oneway(&self, command: Command) -> Result<(), Error> {
        self.lifecycle.check_open()?;
        let settings = lock(&self.settings).clone();
        {
            let mut num_sent = lock(&self.num_sent);
            if settings.fail_on_send_message && *num_sent >= settings.num_sent_messages_before_fail {
                return Err(Error::TransportFailure(format!(
                    "mock transport '{}' failed to send {}",
                    self.name,
                    command.type_name()
                )));
            }
            *num_sent += 1;
        }
        trace!(mock = %self.name, command = command.type_name(), id = command.command_id(), "Sent command");
        lock(&self.sent).push(command.clone());

        if settings.auto_respond {
            let responder = self
                .responder
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            let replies = responder
                .build_incoming_commands(&command)
                .into_iter()
                .chain(responder.build_response(&command).map(Command::from));
            if let Some(outbox) = lock(&self.outbox).as_ref() {
                for reply in replies {
                    let _ = outbox.send(reply);
                }
            }
        }
        Ok(())
    }

    fn set_transport_listener(&self, listener: Option<Arc<dyn TransportListener>>) {
        self.listener.set(listener);
    }

    fn transport_listener(&self) -> Option<Arc<dyn TransportListener>> {
        self.listener.get()
    }

    fn is_connected(&self) -> bool {
        self.lifecycle.is_started()
    }

    fn is_closed(&self) -> bool {
        self.lifecycle.is_closed()
    }

    fn remote_address(&self) -> Option<String> {
        Some(format!("mock://{}", self.name))
    }

    fn narrow(self: Arc<Self>, type_id: TypeId) -> Option<Arc<dyn Transport>> {
        (type_id == TypeId::of::<Self>()).then_some(self as Arc<dyn Transport>)
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{KeepAliveInfo, SessionInfo};
    use std::time::Duration;

    struct Forward(Mutex<Sender<Command>>);

    impl TransportListener for Forward {
        fn on_command(&self, command: Command) {
            let _ = lock(&self.0).send(command);
        }

        fn on_exception(&self, _error: Error) {}
    }

    #[test]
    fn default_builder_answers_required_responses_and_handshakes() {
        let builder = DefaultResponseBuilder;
        let mut request: Command = SessionInfo::default().into();
        request.set_command_id(7);
        assert_eq!(builder.build_response(&request), None);

        request.set_response_required(true);
        assert_eq!(builder.build_response(&request).unwrap().correlation_id, 7);

        let replies = builder.build_incoming_commands(&WireFormatInfo::new(12).into());
        assert!(matches!(&replies[..], [Command::WireFormatInfo(info)] if info.version == MAX_SUPPORTED_VERSION));
        assert!(builder
            .build_incoming_commands(&KeepAliveInfo::default().into())
            .is_empty());
    }

    #[test]
    fn auto_responses_arrive_on_the_dispatcher_thread() {
        let (tx, rx) = channel();
        let mock = MockTransport::new("auto");
        mock.set_transport_listener(Some(Arc::new(Forward(Mutex::new(tx)))));
        mock.start().unwrap();

        let mut command: Command = SessionInfo::default().into();
        command.set_command_id(3);
        command.set_response_required(true);
        mock.oneway(command).unwrap();

        let reply = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(reply.as_response().map(|r| r.correlation_id), Some(3));
        assert_eq!(mock.num_sent_messages(), 1);
    }

    #[test]
    fn fails_after_configured_number_of_sends() {
        let uri = BrokerUri::parse("mock://flaky?failOnSendMessage=true&numSentMessagesBeforeFail=2").unwrap();
        let mock = MockTransport::from_uri(&uri, &Config::default()).unwrap();
        assert_eq!(mock.name(), "flaky");
        mock.start().unwrap();
        mock.oneway(KeepAliveInfo::default().into()).unwrap();
        mock.oneway(KeepAliveInfo::default().into()).unwrap();
        assert!(mock.oneway(KeepAliveInfo::default().into()).unwrap_err().is_io());
        assert_eq!(mock.sent_commands().len(), 2);
    }

    #[test]
    fn fail_on_start_leaves_transport_startable() {
        let mock = MockTransport::new("stubborn");
        mock.set_fail_on_start(true);
        assert!(mock.start().is_err());
        assert!(!mock.is_connected());
        mock.set_fail_on_start(false);
        mock.start().unwrap();
        assert!(mock.is_connected());
    }
}
