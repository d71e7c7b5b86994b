//! Fault-tolerant transport that reconnects through a pool of broker URIs.

mod policy;
mod state_tracker;
mod uri_pool;

pub use policy::ReconnectPolicy;
pub use uri_pool::UriPool;

use super::{lock, Lifecycle, ListenerSlot, Transport, TransportListener, TransportRegistry};
use crate::commands::{Command, ConnectionControl, Response};
use state_tracker::ConnectionStateTracker;
use crate::config::{
    get_namespaced_bool_or, get_namespaced_string_or, get_namespaced_usize_or, with_parameters,
};
use crate::error::Error;
use crate::uri::BrokerUri;
use ::config::Config;
use std::any::TypeId;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::str::FromStr;
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, instrument, trace, warn};

pub(crate) const CONFIG_NAMESPACE: &str = "failover";

/// What `oneway` does with a command while no connection is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendWhileDisconnected {
    /// Hold the command in a bounded backlog and send it after reconnecting.
    #[default]
    Queue,
    /// Fail the call with [`Error::Interrupted`].
    Fail,
}

impl FromStr for SendWhileDisconnected {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "queue" => Ok(Self::Queue),
            "fail" => Ok(Self::Fail),
            _ => Err(Error::InvalidParameter {
                key: "sendWhileDisconnected".into(),
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
struct Settings {
    send_policy: SendWhileDisconnected,
    max_backlog: usize,
    update_uris_supported: bool,
}

struct Connection {
    transport: Arc<dyn Transport>,
    uri: BrokerUri,
    generation: u64,
}

#[derive(Default)]
struct State {
    connected: Option<Connection>,
    // Bumped for every connection attempt; events from older members are stale.
    generation: u64,
    // An attempt whose member failed before it was installed.
    failed_generation: Option<u64>,
    ever_connected: bool,
    failed_rounds: u32,
    reconnect_delay: Duration,
    // Set once the attempt limit is exhausted; the transport is dead from then on.
    connection_failure: Option<String>,
    backlog: VecDeque<Command>,
    // Sent commands that still wait for a response, replayed after a reconnect.
    requests: BTreeMap<i32, Command>,
    tracker: ConnectionStateTracker,
}

struct Shared {
    registry: TransportRegistry,
    member_config: Config,
    uris: UriPool,
    policy: ReconnectPolicy,
    settings: Settings,
    listener: ListenerSlot,
    lifecycle: Lifecycle,
    // Serializes sends with installing a new connection so replayed and
    // backlogged commands go out before anything newer.
    send_lock: Mutex<()>,
    state: Mutex<State>,
    changed: Condvar,
}

enum Route {
    Send(Arc<dyn Transport>, u64, Command),
    Handled(Option<Command>),
}

/// Transport that keeps one member transport connected and replaces it when
/// it fails.
///
/// Members are built through the [`TransportRegistry`] from the URIs in the
/// [`UriPool`]. A background thread connects, and reconnects after failures,
/// following the [`ReconnectPolicy`]. While disconnected, sends are queued or
/// rejected according to [`SendWhileDisconnected`]. After a reconnect, the
/// connections, sessions and producers opened so far are re-created, commands
/// still waiting for a response are sent again, and the queued backlog
/// follows.
///
/// Errors from a member that leave the connection usable, such as a command
/// that cannot be encoded, go back to the caller and do not trigger a
/// reconnect.
///
/// Once the attempt limit is exhausted, the failure goes to the listener's
/// `on_exception` and every later send fails with it.
pub struct FailoverTransport {
    shared: Arc<Shared>,
    reconnect_thread: Mutex<Option<JoinHandle<()>>>,
}

impl FailoverTransport {
    /// Creates a failover transport from a composite URI such as
    /// `failover:(tcp://a:61616,tcp://b:61616)?randomize=false`.
    ///
    /// The URI's parameters configure the failover layer; member transports
    /// see only `config` and their own URI parameters.
    pub fn new(uri: &BrokerUri, config: &Config, registry: TransportRegistry) -> Result<Self, Error> {
        if !uri.is_composite() {
            return Err(Error::InvalidUri {
                uri: uri.to_string(),
                reason: "failover URI must list its brokers in parentheses".into(),
            });
        }
        let failover_config = with_parameters(config, uri.parameters())?;
        Self::with_uris(uri.components().to_vec(), &failover_config, config.clone(), registry)
    }

    /// Creates a failover transport over an explicit list of member URIs.
    pub fn with_uris(
        uris: Vec<BrokerUri>,
        config: &Config,
        member_config: Config,
        registry: TransportRegistry,
    ) -> Result<Self, Error> {
        let policy = ReconnectPolicy::from_config(config)?;
        let send_policy = get_namespaced_string_or(
            config,
            CONFIG_NAMESPACE,
            "sendWhileDisconnected",
            "queue",
        )?
        .parse()?;
        let settings = Settings {
            send_policy,
            max_backlog: get_namespaced_usize_or(config, CONFIG_NAMESPACE, "maxBacklog", 1000)?,
            update_uris_supported: get_namespaced_bool_or(
                config,
                CONFIG_NAMESPACE,
                "updateURIsSupported",
                true,
            )?,
        };

        let pool = UriPool::with_uris(uris);
        pool.set_randomize(get_namespaced_bool_or(config, CONFIG_NAMESPACE, "randomize", true)?);

        debug!(
            uris = pool.len(),
            randomize = pool.is_randomize(),
            send_policy = ?settings.send_policy,
            "Created failover transport"
        );
        let state = State {
            reconnect_delay: policy.initial_delay,
            ..State::default()
        };
        Ok(Self {
            shared: Arc::new(Shared {
                registry,
                member_config,
                uris: pool,
                policy,
                settings,
                listener: ListenerSlot::default(),
                lifecycle: Lifecycle::default(),
                send_lock: Mutex::new(()),
                state: Mutex::new(state),
                changed: Condvar::new(),
            }),
            reconnect_thread: Mutex::new(None),
        })
    }

    pub fn uri_pool(&self) -> &UriPool {
        &self.shared.uris
    }

    pub fn reconnect_policy(&self) -> &ReconnectPolicy {
        &self.shared.policy
    }

    pub fn send_policy(&self) -> SendWhileDisconnected {
        self.shared.settings.send_policy
    }

    /// URI of the member currently connected.
    pub fn connected_uri(&self) -> Option<BrokerUri> {
        lock(&self.shared.state)
            .connected
            .as_ref()
            .map(|connection| connection.uri.clone())
    }

    /// Number of commands queued while disconnected.
    pub fn backlog_len(&self) -> usize {
        lock(&self.shared.state).backlog.len()
    }

    /// Number of sent commands that are still waiting for a response.
    pub fn tracked_requests(&self) -> usize {
        lock(&self.shared.state).requests.len()
    }

    /// Blocks until a member is connected or `timeout` passes.
    pub fn wait_connected(&self, timeout: Duration) -> bool {
        let shared = &self.shared;
        let state = lock(&shared.state);
        let (state, _) = shared
            .changed
            .wait_timeout_while(state, timeout, |state| {
                state.connected.is_none()
                    && state.connection_failure.is_none()
                    && !shared.lifecycle.is_closed()
            })
            .unwrap_or_else(PoisonError::into_inner);
        state.connected.is_some()
    }
}

impl Shared {
    fn reconnect_loop(shared: Arc<Shared>) {
        debug!("Reconnect thread started");
        loop {
            {
                let state = lock(&shared.state);
                let state = shared
                    .changed
                    .wait_while(state, |state| {
                        !shared.lifecycle.is_closed()
                            && state.connection_failure.is_none()
                            && state.connected.is_some()
                    })
                    .unwrap_or_else(PoisonError::into_inner);
                if shared.lifecycle.is_closed() || state.connection_failure.is_some() {
                    break;
                }
            }
            Self::reconnect_round(&shared);
        }
        debug!("Reconnect thread exiting");
    }

    // One pass over the pool. Sleeps first when replacing a lost connection,
    // and after the pass when it failed.
    fn reconnect_round(shared: &Arc<Shared>) {
        let delay = {
            let state = lock(&shared.state);
            (state.ever_connected && state.failed_rounds == 0).then_some(state.reconnect_delay)
        };
        if let Some(delay) = delay {
            if !shared.sleep(delay) {
                return;
            }
        }

        let mut tried = Vec::new();
        let mut connected = false;
        while let Some(uri) = shared.uris.get_uri() {
            if shared.lifecycle.is_closed() {
                tried.push(uri);
                break;
            }
            match Self::connect_to(shared, &uri) {
                Ok(()) => {
                    connected = true;
                    break;
                }
                Err(err) => {
                    warn!(uri = %uri, %err, "Failed to connect");
                    tried.push(uri);
                }
            }
        }
        shared.uris.add_uris(tried);
        if connected || shared.lifecycle.is_closed() {
            return;
        }

        let (failure, delay) = {
            let mut state = lock(&shared.state);
            state.failed_rounds += 1;
            let limit = shared.policy.attempt_limit(state.ever_connected);
            let failure = limit
                .filter(|limit| state.failed_rounds > *limit)
                .map(|limit| format!("failed to connect after {} attempts", limit + 1));
            if let Some(reason) = &failure {
                state.connection_failure = Some(reason.clone());
                state.backlog.clear();
                state.requests.clear();
                shared.changed.notify_all();
            }
            (failure, state.reconnect_delay)
        };

        if let Some(reason) = failure {
            warn!(%reason, "Giving up reconnecting");
            shared.listener.on_exception(Error::TransportFailure(reason));
            return;
        }
        debug!(?delay, "Reconnect round failed, backing off");
        if shared.sleep(delay) {
            let mut state = lock(&shared.state);
            state.reconnect_delay = shared.policy.next_delay(state.reconnect_delay);
        }
    }

    fn connect_to(shared: &Arc<Shared>, uri: &BrokerUri) -> Result<(), Error> {
        let generation = {
            let mut state = lock(&shared.state);
            state.generation += 1;
            state.generation
        };
        let transport = shared.registry.create_composite(uri, &shared.member_config)?;
        transport.set_transport_listener(Some(Arc::new(MemberListener {
            shared: Arc::downgrade(shared),
            generation,
        })));
        if let Err(err) = transport.start() {
            let _ = transport.close();
            return Err(err);
        }
        shared.install(uri, transport, generation)
    }

    // Fails when the member already reported a failure while starting.
    fn install(
        &self,
        uri: &BrokerUri,
        transport: Arc<dyn Transport>,
        generation: u64,
    ) -> Result<(), Error> {
        let send_guard = lock(&self.send_lock);
        let (replay, reconnected) = {
            let mut state = lock(&self.state);
            if self.lifecycle.is_closed() {
                drop(state);
                let _ = transport.close();
                return Ok(());
            }
            if state.failed_generation == Some(generation) {
                drop(state);
                let _ = transport.close();
                return Err(Error::TransportFailure(
                    "member transport failed while starting".into(),
                ));
            }
            let reconnected = state.ever_connected;
            state.ever_connected = true;
            state.failed_rounds = 0;
            state.reconnect_delay = self.policy.initial_delay;
            state.connected = Some(Connection {
                transport: transport.clone(),
                uri: uri.clone(),
                generation,
            });
            self.changed.notify_all();
            if !state.tracker.is_empty() {
                debug!("Restoring tracked connection state");
            }
            (Self::replay_list(&state), reconnected)
        };
        info!(uri = %uri, replayed = replay.len(), "Connected");

        if let Err(err) = self.restore(&transport, reconnected, replay) {
            drop(send_guard);
            self.handle_failure(generation, &err);
            return Ok(());
        }
        if reconnected {
            self.listener.transport_resumed();
        }
        Ok(())
    }

    // Tracked state first, then the requests it does not already cover.
    // Restored infos only ask for a response when a caller still waits.
    fn replay_list(state: &State) -> Vec<Command> {
        let mut covered = BTreeSet::new();
        let mut replay: Vec<Command> = state
            .tracker
            .restore_commands()
            .into_iter()
            .map(|mut command| {
                let pending = command.is_response_required()
                    && state.requests.contains_key(&command.command_id());
                if pending {
                    covered.insert(command.command_id());
                }
                command.set_response_required(pending);
                command
            })
            .collect();
        replay.extend(
            state
                .requests
                .values()
                .filter(|command| !covered.contains(&command.command_id()))
                .cloned(),
        );
        replay
    }

    // Sends one command during a restore. Local rejections drop the command
    // and the restore goes on; connection failures end it. Replayed state is
    // already tracked, so only backlog commands pass `track`.
    fn restore_one(
        &self,
        transport: &Arc<dyn Transport>,
        command: Command,
        track: bool,
    ) -> Result<(), Error> {
        let command_id = command.command_id();
        let tracked = command.is_response_required();
        let state_command = (track && ConnectionStateTracker::is_state_command(&command))
            .then(|| command.clone());
        let result = transport.oneway(command);
        match &result {
            Err(err) if !err.is_connection_failure() => {
                warn!(id = command_id, %err, "Dropping command rejected during restore");
                if tracked {
                    lock(&self.state).requests.remove(&command_id);
                }
                Ok(())
            }
            _ => {
                if let Some(command) = state_command {
                    lock(&self.state).tracker.track(&command);
                }
                result
            }
        }
    }

    // Runs with the send lock held, so nothing newer is sent in between.
    fn restore(
        &self,
        transport: &Arc<dyn Transport>,
        reconnected: bool,
        replay: Vec<Command>,
    ) -> Result<(), Error> {
        if reconnected {
            let control = ConnectionControl {
                fault_tolerant: true,
                ..Default::default()
            };
            transport.oneway(control.into())?;
        }
        for command in replay {
            trace!(command = command.type_name(), id = command.command_id(), "Replaying");
            self.restore_one(transport, command, false)?;
        }
        loop {
            let command = {
                let mut state = lock(&self.state);
                let Some(command) = state.backlog.pop_front() else {
                    return Ok(());
                };
                if command.is_response_required() {
                    state.requests.insert(command.command_id(), command.clone());
                }
                command
            };
            // Tracked requests and state go out again with the next replay.
            let retry = (!command.is_response_required()
                && !ConnectionStateTracker::is_state_command(&command))
            .then(|| command.clone());
            if let Err(err) = self.restore_one(transport, command, true) {
                if let Some(command) = retry {
                    lock(&self.state).backlog.push_front(command);
                }
                return Err(err);
            }
        }
    }

    fn sleep(&self, delay: Duration) -> bool {
        let state = lock(&self.state);
        let _ = self
            .changed
            .wait_timeout_while(state, delay, |_| !self.lifecycle.is_closed())
            .unwrap_or_else(PoisonError::into_inner);
        !self.lifecycle.is_closed()
    }

    fn handle_failure(&self, generation: u64, error: &Error) {
        let lost = {
            let mut state = lock(&self.state);
            if self.lifecycle.is_closed() {
                return;
            }
            match &state.connected {
                Some(connection) if connection.generation == generation => {}
                // The member is still starting; `install` will refuse it.
                _ if state.generation == generation => {
                    debug!(generation, %error, "Member failed before it was installed");
                    state.failed_generation = Some(generation);
                    return;
                }
                _ => return,
            }
            let lost = state.connected.take();
            self.changed.notify_all();
            lost
        };
        let Some(lost) = lost else { return };

        warn!(uri = %lost.uri, %error, "Connection lost, reconnecting");
        self.uris.add_uri(lost.uri.clone());
        self.listener.transport_interrupted();
        if let Err(err) = lost.transport.close() {
            debug!(%err, "Error closing failed member transport");
        }
    }

    fn handle_command(&self, generation: u64, command: Command) {
        {
            let mut state = lock(&self.state);
            if state.generation != generation {
                trace!(command = command.type_name(), "Ignoring command from stale member");
                return;
            }
            if let Command::Response(response) = &command {
                state.requests.remove(&response.correlation_id);
            }
        }
        if let Command::ConnectionControl(control) = &command {
            self.update_uris(control);
        }
        self.listener.on_command(command);
    }

    fn update_uris(&self, control: &ConnectionControl) {
        if !self.settings.update_uris_supported || control.connected_brokers.is_empty() {
            return;
        }
        for text in control.connected_brokers.split(',').map(str::trim) {
            if text.is_empty() {
                continue;
            }
            match BrokerUri::parse(text) {
                Ok(uri) => {
                    if self.uris.add_uri(uri) {
                        debug!(uri = text, "Added broker advertised by peer");
                    }
                }
                Err(err) => warn!(uri = text, %err, "Ignoring unparseable broker URI"),
            }
        }
    }

    fn route(&self, command: Command) -> Result<Route, Error> {
        let mut state = lock(&self.state);
        self.lifecycle.check_open()?;
        if let Some(reason) = &state.connection_failure {
            return Err(Error::TransportFailure(reason.clone()));
        }
        if let Some(connection) = &state.connected {
            let transport = connection.transport.clone();
            let generation = connection.generation;
            if command.is_response_required() {
                state.requests.insert(command.command_id(), command.clone());
            }
            return Ok(Route::Send(transport, generation, command));
        }

        // The broker drops the state of a lost connection anyway, so
        // removals only need to reach the tracker.
        match &command {
            Command::ShutdownInfo(_) => {
                debug!("Dropping ShutdownInfo while disconnected");
                return Ok(Route::Handled(None));
            }
            Command::RemoveInfo(info) => {
                state.tracker.track(&command);
                let reply: Option<Command> = info
                    .base
                    .response_required
                    .then(|| Response::new(command.command_id()).into());
                return Ok(Route::Handled(reply));
            }
            _ => {}
        }
        match self.settings.send_policy {
            SendWhileDisconnected::Fail => Err(Error::Interrupted),
            SendWhileDisconnected::Queue => {
                if state.backlog.len() >= self.settings.max_backlog {
                    return Err(Error::BacklogFull {
                        capacity: self.settings.max_backlog,
                    });
                }
                trace!(command = command.type_name(), "Queueing command while disconnected");
                state.backlog.push_back(command);
                Ok(Route::Handled(None))
            }
        }
    }
}

/// Listener installed on each member. Events from members other than the
/// current one are dropped.
struct MemberListener {
    shared: Weak<Shared>,
    generation: u64,
}

impl TransportListener for MemberListener {
    fn on_command(&self, command: Command) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_command(self.generation, command);
        }
    }

    fn on_exception(&self, error: Error) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_failure(self.generation, &error);
        }
    }
}

impl Transport for FailoverTransport {
    #[instrument(skip(self))]
    fn start(&self) -> Result<(), Error> {
        if !self.shared.lifecycle.begin_start()? {
            return Ok(());
        }
        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name("openwire-failover".into())
            .spawn(move || Shared::reconnect_loop(shared));
        match handle {
            Ok(handle) => {
                *lock(&self.reconnect_thread) = Some(handle);
                info!(uris = self.shared.uris.len(), "Failover transport started");
                Ok(())
            }
            Err(err) => {
                self.shared.lifecycle.abort_start();
                Err(err.into())
            }
        }
    }

    fn stop(&self) -> Result<(), Error> {
        self.close()
    }

    #[instrument(skip(self))]
    fn close(&self) -> Result<(), Error> {
        let shared = &self.shared;
        if !shared.lifecycle.begin_close() {
            return Ok(());
        }
        let connection = {
            let mut state = lock(&shared.state);
            state.backlog.clear();
            state.requests.clear();
            shared.changed.notify_all();
            state.connected.take()
        };
        if let Some(connection) = connection {
            if let Err(err) = connection.transport.close() {
                debug!(uri = %connection.uri, %err, "Error closing member transport");
            }
        }
        if let Some(handle) = lock(&self.reconnect_thread).take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("Reconnect thread panicked");
            }
        }
        info!("Failover transport closed");
        Ok(())
    }

    fn oneway(&self, command: Command) -> Result<(), Error> {
        let shared = &self.shared;
        let mut command = command;
        loop {
            let send_guard = lock(&shared.send_lock);
            let (transport, generation, outbound) = match shared.route(command)? {
                Route::Send(transport, generation, outbound) => (transport, generation, outbound),
                Route::Handled(reply) => {
                    drop(send_guard);
                    if let Some(reply) = reply {
                        shared.listener.on_command(reply);
                    }
                    return Ok(());
                }
            };

            let queue = shared.settings.send_policy == SendWhileDisconnected::Queue;
            let tracked = outbound.is_response_required();
            let command_id = outbound.command_id();
            let state_command =
                ConnectionStateTracker::is_state_command(&outbound).then(|| outbound.clone());
            let retry = (!tracked && state_command.is_none() && queue).then(|| outbound.clone());
            let result = transport.oneway(outbound);

            // State counts once sent, or once it will be restored on the
            // next connection.
            let replayable = match &result {
                Ok(()) => true,
                Err(err) => queue && err.is_connection_failure(),
            };
            if let Some(command) = state_command.filter(|_| replayable) {
                lock(&shared.state).tracker.track(&command);
            }
            drop(send_guard);
            let Err(err) = result else {
                return Ok(());
            };

            if !err.is_connection_failure() {
                debug!(command_id, %err, "Member rejected command");
                if tracked {
                    lock(&shared.state).requests.remove(&command_id);
                }
                return Err(err);
            }
            shared.handle_failure(generation, &err);
            match (shared.settings.send_policy, retry) {
                (SendWhileDisconnected::Fail, _) => {
                    if tracked {
                        lock(&shared.state).requests.remove(&command_id);
                    }
                    return Err(Error::Interrupted);
                }
                // Requests and state go out again with the replay.
                (SendWhileDisconnected::Queue, None) => return Ok(()),
                (SendWhileDisconnected::Queue, Some(retry)) => command = retry,
            }
        }
    }

    fn set_transport_listener(&self, listener: Option<Arc<dyn TransportListener>>) {
        self.shared.listener.set(listener);
    }

    fn transport_listener(&self) -> Option<Arc<dyn TransportListener>> {
        self.shared.listener.get()
    }

    fn is_connected(&self) -> bool {
        lock(&self.shared.state).connected.is_some()
    }

    fn is_closed(&self) -> bool {
        self.shared.lifecycle.is_closed()
    }

    fn is_fault_tolerant(&self) -> bool {
        true
    }

    fn is_reconnect_supported(&self) -> bool {
        true
    }

    fn untrack_request(&self, command_id: i32) {
        let mut state = lock(&self.shared.state);
        let queued = state.backlog.len();
        state
            .backlog
            .retain(|command| !command.is_response_required() || command.command_id() != command_id);
        if state.requests.remove(&command_id).is_some() || state.backlog.len() != queued {
            trace!(command_id, "Stopped tracking abandoned request");
        }
    }

    fn remote_address(&self) -> Option<String> {
        let transport = lock(&self.shared.state)
            .connected
            .as_ref()
            .map(|connection| connection.transport.clone())?;
        transport.remote_address()
    }

    fn narrow(self: Arc<Self>, type_id: TypeId) -> Option<Arc<dyn Transport>> {
        if type_id == TypeId::of::<Self>() {
            return Some(self);
        }
        let transport = lock(&self.shared.state)
            .connected
            .as_ref()
            .map(|connection| connection.transport.clone())?;
        transport.narrow(type_id)
    }
}

impl Drop for FailoverTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_policy() {
        assert_eq!("queue".parse::<SendWhileDisconnected>().unwrap(), SendWhileDisconnected::Queue);
        assert_eq!("FAIL".parse::<SendWhileDisconnected>().unwrap(), SendWhileDisconnected::Fail);
        assert!("drop".parse::<SendWhileDisconnected>().is_err());
    }

    #[test]
    fn requires_composite_uri() {
        let uri = BrokerUri::parse("failover://broker:61616").unwrap();
        let result = FailoverTransport::new(&uri, &Config::default(), TransportRegistry::with_defaults());
        assert!(matches!(result, Err(Error::InvalidUri { .. })));
    }

    #[test]
    fn reads_settings_from_uri_parameters() {
        let uri = BrokerUri::parse(
            "failover:(mock://a,mock://b)?randomize=false&sendWhileDisconnected=fail&maxReconnectAttempts=2",
        )
        .unwrap();
        let failover =
            FailoverTransport::new(&uri, &Config::default(), TransportRegistry::with_defaults()).unwrap();
        assert!(!failover.uri_pool().is_randomize());
        assert_eq!(failover.uri_pool().len(), 2);
        assert_eq!(failover.send_policy(), SendWhileDisconnected::Fail);
        assert_eq!(failover.reconnect_policy().max_reconnect_attempts, Some(2));
        assert!(failover.is_fault_tolerant());
        assert!(!failover.is_connected());
    }
}
