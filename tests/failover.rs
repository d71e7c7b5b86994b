//! FailoverTransport Integration Tests
//!
//! Members are `mock://` transports built through the default registry, so
//! failures are injected with `MockTransport::fire_exception` on whichever
//! member is connected.

mod common;

use common::*;
use openwire_transport::commands::{
    ConnectionControl, ConnectionId, ConnectionInfo, KeepAliveInfo, ProducerId, ProducerInfo,
    RemoveInfo, SessionId, SessionInfo, ShutdownInfo,
};
use openwire_transport::prelude::*;
use openwire_transport::transport::TransportFactory;
use std::any::TypeId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn failover(uri: &str) -> Arc<FailoverTransport> {
    init_tracing();
    let uri = BrokerUri::parse(uri).expect("Failed to parse URI");
    let transport = FailoverTransport::new(&uri, &config::Config::default(), TransportRegistry::with_defaults())
        .expect("Failed to create failover transport");
    Arc::new(transport)
}

fn connected_member(failover: &Arc<FailoverTransport>) -> Arc<MockTransport> {
    let transport: Arc<dyn Transport> = failover.clone();
    narrow::<MockTransport>(&transport).expect("No connected member")
}

fn uri(text: &str) -> BrokerUri {
    BrokerUri::parse(text).unwrap()
}

fn drop_connection(failover: &Arc<FailoverTransport>) -> Arc<MockTransport> {
    let member = connected_member(failover);
    member.fire_exception(Error::TransportFailure("connection reset".into()));
    member
}

fn with_id(command: impl Into<Command>, id: i32, response_required: bool) -> Command {
    let mut command = command.into();
    command.set_command_id(id);
    command.set_response_required(response_required);
    command
}

// ============================================================================
// Scripted Members
// ============================================================================

/// A mock member whose misbehaviour comes from its URI parameters:
/// `dieOnFirstStart` reports a failure from inside the first `start`,
/// `rejectKeepAlive` refuses to send `KeepAliveInfo` as a local error.
struct ScriptedMember {
    inner: Arc<MockTransport>,
    die_on_start: bool,
    reject_keep_alive: bool,
}

impl Transport for ScriptedMember {
    fn start(&self) -> Result<(), Error> {
        self.inner.start()?;
        if self.die_on_start {
            self.inner
                .fire_exception(Error::TransportFailure("reset during handshake".into()));
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), Error> {
        self.inner.stop()
    }

    fn close(&self) -> Result<(), Error> {
        self.inner.close()
    }

    fn oneway(&self, command: Command) -> Result<(), Error> {
        if self.reject_keep_alive && matches!(command, Command::KeepAliveInfo(_)) {
            return Err(Error::InvalidArgument("KeepAliveInfo not accepted".into()));
        }
        self.inner.oneway(command)
    }

    fn set_transport_listener(&self, listener: Option<Arc<dyn TransportListener>>) {
        self.inner.set_transport_listener(listener);
    }

    fn transport_listener(&self) -> Option<Arc<dyn TransportListener>> {
        self.inner.transport_listener()
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn narrow(self: Arc<Self>, type_id: TypeId) -> Option<Arc<dyn Transport>> {
        if type_id == TypeId::of::<Self>() {
            return Some(self);
        }
        self.inner.clone().narrow(type_id)
    }
}

struct ScriptedFactory {
    created: Arc<AtomicUsize>,
}

impl TransportFactory for ScriptedFactory {
    fn create_composite(
        &self,
        uri: &BrokerUri,
        _config: &config::Config,
        _registry: &TransportRegistry,
    ) -> Result<Arc<dyn Transport>, Error> {
        let first = self.created.fetch_add(1, Ordering::SeqCst) == 0;
        Ok(Arc::new(ScriptedMember {
            inner: Arc::new(MockTransport::new(uri.host().unwrap_or("scripted"))),
            die_on_start: first && uri.parameter("dieOnFirstStart") == Some("true"),
            reject_keep_alive: uri.parameter("rejectKeepAlive") == Some("true"),
        }))
    }
}

fn scripted_failover(uri: &str) -> (Arc<FailoverTransport>, Arc<AtomicUsize>) {
    init_tracing();
    let created = Arc::new(AtomicUsize::new(0));
    let mut registry = TransportRegistry::with_defaults();
    registry.register(
        "scripted",
        ScriptedFactory {
            created: created.clone(),
        },
    );
    let uri = BrokerUri::parse(uri).expect("Failed to parse URI");
    let transport = FailoverTransport::new(&uri, &config::Config::default(), registry)
        .expect("Failed to create failover transport");
    (Arc::new(transport), created)
}

// ============================================================================
// Connecting and Reconnecting
// ============================================================================

#[test]
fn connects_to_the_first_uri() {
    let failover = failover("failover:(mock://a,mock://b)?randomize=false");
    failover.start().expect("Failed to start");

    assert!(failover.wait_connected(WAIT));
    assert_eq!(failover.connected_uri(), Some(uri("mock://a")));
    assert_eq!(failover.remote_address().as_deref(), Some("mock://a"));
    assert_eq!(connected_member(&failover).name(), "a");
    failover.close().unwrap();
}

#[test]
fn skips_members_that_fail_to_start() {
    let failover = failover("failover:(mock://a?failOnStart=true,mock://b)?randomize=false");
    failover.start().unwrap();

    assert!(failover.wait_connected(WAIT));
    assert_eq!(failover.connected_uri(), Some(uri("mock://b")));
    assert!(wait_until(WAIT, || failover
        .uri_pool()
        .contains(&uri("mock://a?failOnStart=true"))));
}

#[test]
fn members_that_fail_while_starting_are_not_installed() {
    let (failover, created) =
        scripted_failover("failover:(scripted://a?dieOnFirstStart=true)?initialReconnectDelay=1");
    let listener = RecordingListener::new();
    failover.set_transport_listener(Some(listener.clone()));
    failover.start().unwrap();

    assert!(failover.wait_connected(WAIT));
    assert_eq!(created.load(Ordering::SeqCst), 2);
    assert_eq!(listener.interrupted(), 0);
    assert!(listener.errors().is_empty());

    failover.oneway(KeepAliveInfo::default().into()).unwrap();
    let member = connected_member(&failover);
    assert!(member.is_connected());
    assert_eq!(member.sent_commands().len(), 1);
    failover.close().unwrap();
}

#[test]
fn reconnects_to_the_next_uri_after_failure() {
    let failover = failover("failover:(mock://a,mock://b)?randomize=false");
    let listener = RecordingListener::new();
    failover.set_transport_listener(Some(listener.clone()));
    failover.start().unwrap();
    assert!(failover.wait_connected(WAIT));

    drop_connection(&failover);
    assert!(wait_until(WAIT, || failover.connected_uri() == Some(uri("mock://b"))));
    assert!(listener.wait_for(WAIT, |events| events.interrupted == 1 && events.resumed == 1));
    assert!(listener.errors().is_empty());

    let sent = connected_member(&failover).sent_commands();
    assert!(matches!(&sent[0], Command::ConnectionControl(control) if control.fault_tolerant));
}

#[test]
fn events_from_replaced_members_are_ignored() {
    let failover = failover("failover:(mock://a,mock://b)?randomize=false");
    let listener = RecordingListener::new();
    failover.set_transport_listener(Some(listener.clone()));
    failover.start().unwrap();
    assert!(failover.wait_connected(WAIT));

    let old = drop_connection(&failover);
    assert!(wait_until(WAIT, || failover.connected_uri() == Some(uri("mock://b"))));

    old.fire_command(KeepAliveInfo::default().into());
    old.fire_exception(Error::TransportFailure("late failure".into()));
    assert_eq!(failover.connected_uri(), Some(uri("mock://b")));
    assert!(listener.commands().is_empty());
    assert_eq!(listener.interrupted(), 1);
}

// ============================================================================
// Sends While Disconnected
// ============================================================================

#[test]
fn queued_sends_are_flushed_after_reconnect() {
    let failover =
        failover("failover:(mock://a,mock://b)?randomize=false&initialReconnectDelay=500");
    failover.start().unwrap();
    assert!(failover.wait_connected(WAIT));

    drop_connection(&failover);
    for _ in 0..3 {
        failover.oneway(KeepAliveInfo::default().into()).expect("Queued send failed");
    }
    assert_eq!(failover.backlog_len(), 3);

    assert!(failover.wait_connected(WAIT));
    let member = connected_member(&failover);
    assert!(wait_until(WAIT, || member.sent_commands().len() == 4));
    assert_eq!(failover.backlog_len(), 0);
    let sent = member.sent_commands();
    assert!(matches!(sent[0], Command::ConnectionControl(_)));
    assert!(sent[1..].iter().all(|command| matches!(command, Command::KeepAliveInfo(_))));
}

#[test]
fn fail_policy_rejects_sends_while_disconnected() {
    let failover = failover(
        "failover:(mock://a,mock://b)?randomize=false&initialReconnectDelay=500&sendWhileDisconnected=fail",
    );
    failover.start().unwrap();
    assert!(failover.wait_connected(WAIT));

    drop_connection(&failover);
    assert!(matches!(
        failover.oneway(KeepAliveInfo::default().into()),
        Err(Error::Interrupted)
    ));
    assert_eq!(failover.backlog_len(), 0);

    assert!(failover.wait_connected(WAIT));
    failover.oneway(KeepAliveInfo::default().into()).unwrap();
}

#[test]
fn full_backlog_rejects_sends() {
    let failover = failover("failover:(mock://a)?maxBacklog=2");

    failover.oneway(KeepAliveInfo::default().into()).unwrap();
    failover.oneway(KeepAliveInfo::default().into()).unwrap();
    assert!(matches!(
        failover.oneway(KeepAliveInfo::default().into()),
        Err(Error::BacklogFull { capacity: 2 })
    ));
}

#[test]
fn shutdown_and_remove_info_are_handled_locally_while_disconnected() {
    let failover = failover("failover:(mock://a)");
    let listener = RecordingListener::new();
    failover.set_transport_listener(Some(listener.clone()));

    failover.oneway(ShutdownInfo::default().into()).unwrap();
    assert_eq!(failover.backlog_len(), 0);

    let mut remove: Command = RemoveInfo::default().into();
    remove.set_command_id(42);
    remove.set_response_required(true);
    failover.oneway(remove).unwrap();

    assert_eq!(failover.backlog_len(), 0);
    let commands = listener.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].as_response().map(|r| r.correlation_id), Some(42));
}

#[test]
fn rejected_commands_do_not_drop_the_connection() {
    let (failover, created) = scripted_failover("failover:(scripted://a?rejectKeepAlive=true)");
    let listener = RecordingListener::new();
    failover.set_transport_listener(Some(listener.clone()));
    failover.start().unwrap();
    assert!(failover.wait_connected(WAIT));

    assert!(matches!(
        failover.oneway(KeepAliveInfo::default().into()),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        failover.oneway(with_id(KeepAliveInfo::default(), 9, true)),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(failover.tracked_requests(), 0);
    assert_eq!(failover.backlog_len(), 0);
    assert!(failover.is_connected());
    assert_eq!(listener.interrupted(), 0);
    assert_eq!(created.load(Ordering::SeqCst), 1);

    failover.oneway(SessionInfo::default().into()).unwrap();
    assert!(matches!(
        connected_member(&failover).sent_commands()[..],
        [Command::SessionInfo(_)]
    ));
    failover.close().unwrap();
}

#[test]
fn removals_while_disconnected_are_not_restored() {
    let failover =
        failover("failover:(mock://a,mock://b)?randomize=false&initialReconnectDelay=200");
    failover.start().unwrap();
    assert!(failover.wait_connected(WAIT));

    let connection = ConnectionId::new("ID:client-1");
    let session = SessionId::new(&connection, 1);
    failover
        .oneway(with_id(
            ConnectionInfo {
                connection_id: Some(connection.clone()),
                ..Default::default()
            },
            1,
            false,
        ))
        .unwrap();
    failover
        .oneway(with_id(
            SessionInfo {
                session_id: Some(session.clone()),
                ..Default::default()
            },
            2,
            false,
        ))
        .unwrap();

    drop_connection(&failover);
    let remove = RemoveInfo {
        object_id: Some(Box::new(DataStructure::SessionId(session))),
        ..Default::default()
    };
    failover.oneway(with_id(remove, 3, false)).unwrap();
    assert_eq!(failover.backlog_len(), 0);

    assert!(wait_until(WAIT, || failover.connected_uri() == Some(uri("mock://b"))));
    let member = connected_member(&failover);
    assert!(wait_until(WAIT, || member.sent_commands().len() == 2));
    let sent = member.sent_commands();
    assert!(matches!(sent[0], Command::ConnectionControl(_)));
    assert!(matches!(&sent[1], Command::ConnectionInfo(info) if info.failover_reconnect));
}

// ============================================================================
// Request Replay
// ============================================================================

#[test]
fn unanswered_requests_are_replayed_after_reconnect() {
    let failover = failover(
        "failover:(mock://a?autoRespond=false,mock://b?autoRespond=false)?randomize=false",
    );
    let correlator = ResponseCorrelator::new(failover.clone());
    correlator.start().unwrap();
    assert!(failover.wait_connected(WAIT));

    let pending = correlator
        .async_request(SessionInfo::default().into(), None)
        .unwrap();
    assert_eq!(failover.tracked_requests(), 1);

    drop_connection(&failover);
    assert!(wait_until(WAIT, || failover.connected_uri() == Some(uri("mock://b?autoRespond=false"))));
    let member = connected_member(&failover);
    assert!(wait_until(WAIT, || member.sent_commands().len() == 2));

    let sent = member.sent_commands();
    assert!(matches!(sent[0], Command::ConnectionControl(_)));
    assert!(matches!(&sent[1], Command::SessionInfo(_) if sent[1].command_id() == 1));
    assert!(!pending.is_done());

    member.fire_command(Response::new(1).into());
    assert_eq!(pending.get_response_timeout(WAIT).unwrap().unwrap().correlation_id, 1);
    assert_eq!(failover.tracked_requests(), 0);
}

#[test]
fn timed_out_requests_are_forgotten() {
    let failover = failover(
        "failover:(mock://a?autoRespond=false,mock://b?autoRespond=false)?randomize=false",
    );
    let correlator = ResponseCorrelator::new(failover.clone());
    correlator.start().unwrap();
    assert!(failover.wait_connected(WAIT));

    for _ in 0..50 {
        assert!(matches!(
            correlator.request_timeout(SessionInfo::default().into(), Duration::from_millis(1)),
            Err(Error::Timeout(_))
        ));
    }
    assert_eq!(failover.tracked_requests(), 0);

    drop_connection(&failover);
    assert!(wait_until(WAIT, || failover.connected_uri() == Some(uri("mock://b?autoRespond=false"))));
    std::thread::sleep(Duration::from_millis(50));
    let sent = connected_member(&failover).sent_commands();
    assert!(matches!(sent[..], [Command::ConnectionControl(_)]));
}

#[test]
fn connection_state_is_restored_before_pending_requests() {
    let failover = failover(
        "failover:(mock://a?autoRespond=false,mock://b?autoRespond=false)?randomize=false",
    );
    failover.start().unwrap();
    assert!(failover.wait_connected(WAIT));

    let connection = ConnectionId::new("ID:client-1");
    let session = |value| SessionId::new(&connection, value);
    let session_info = |value| SessionInfo {
        session_id: Some(session(value)),
        ..Default::default()
    };
    let commands = [
        with_id(
            ConnectionInfo {
                connection_id: Some(connection.clone()),
                ..Default::default()
            },
            1,
            false,
        ),
        with_id(session_info(1), 2, false),
        with_id(
            ProducerInfo {
                producer_id: Some(ProducerId::new(&session(1), 1)),
                ..Default::default()
            },
            3,
            false,
        ),
        with_id(session_info(2), 4, false),
        with_id(
            RemoveInfo {
                object_id: Some(Box::new(DataStructure::SessionId(session(2)))),
                ..Default::default()
            },
            5,
            false,
        ),
        with_id(session_info(3), 6, true),
        with_id(KeepAliveInfo::default(), 7, true),
    ];
    for command in commands {
        failover.oneway(command).unwrap();
    }
    assert_eq!(failover.tracked_requests(), 2);

    drop_connection(&failover);
    assert!(wait_until(WAIT, || failover.connected_uri() == Some(uri("mock://b?autoRespond=false"))));
    let member = connected_member(&failover);
    assert!(wait_until(WAIT, || member.sent_commands().len() == 6));

    let sent = member.sent_commands();
    assert!(matches!(&sent[0], Command::ConnectionControl(control) if control.fault_tolerant));
    assert!(matches!(&sent[1], Command::ConnectionInfo(info) if info.failover_reconnect));
    assert!(matches!(&sent[2], Command::SessionInfo(info) if info.session_id == Some(session(1))));
    assert!(!sent[2].is_response_required());
    assert!(matches!(&sent[3], Command::ProducerInfo(_)));
    assert!(matches!(&sent[4], Command::SessionInfo(info) if info.session_id == Some(session(3))));
    assert!(sent[4].is_response_required());
    assert_eq!(sent[4].command_id(), 6);
    assert!(matches!(&sent[5], Command::KeepAliveInfo(_)));
    assert_eq!(sent[5].command_id(), 7);
}

// ============================================================================
// Giving Up
// ============================================================================

#[test]
fn gives_up_after_max_reconnect_attempts() {
    let failover = failover(
        "failover:(mock://a?failOnStart=true)?maxReconnectAttempts=2&initialReconnectDelay=1",
    );
    let listener = RecordingListener::new();
    failover.set_transport_listener(Some(listener.clone()));
    failover.oneway(KeepAliveInfo::default().into()).unwrap();
    failover.start().unwrap();

    assert!(listener.wait_for(WAIT, |events| events.errors.len() == 1));
    assert!(!failover.is_connected());
    assert_eq!(failover.backlog_len(), 0);
    assert!(matches!(
        failover.oneway(KeepAliveInfo::default().into()),
        Err(Error::TransportFailure(_))
    ));
}

#[test]
fn close_stops_reconnecting() {
    let failover = failover("failover:(mock://a?failOnStart=true)?initialReconnectDelay=50");
    failover.start().unwrap();
    std::thread::sleep(Duration::from_millis(20));

    failover.close().unwrap();
    assert!(failover.is_closed());
    assert!(!failover.is_connected());
    assert!(matches!(
        failover.oneway(KeepAliveInfo::default().into()),
        Err(Error::Closed)
    ));
}

// ============================================================================
// Broker-Driven Updates
// ============================================================================

#[test]
fn advertised_brokers_join_the_pool() {
    let failover = failover("failover:(mock://a)");
    let listener = RecordingListener::new();
    failover.set_transport_listener(Some(listener.clone()));
    failover.start().unwrap();
    assert!(failover.wait_connected(WAIT));

    let control = ConnectionControl {
        connected_brokers: "mock://c, mock://d,".into(),
        ..Default::default()
    };
    connected_member(&failover).fire_command(control.into());

    assert!(failover.uri_pool().contains(&uri("mock://c")));
    assert!(failover.uri_pool().contains(&uri("mock://d")));
    assert!(matches!(listener.commands()[0], Command::ConnectionControl(_)));
}

#[test]
fn advertised_brokers_are_ignored_when_updates_are_off() {
    let failover = failover("failover:(mock://a)?updateURIsSupported=false");
    failover.start().unwrap();
    assert!(failover.wait_connected(WAIT));

    let control = ConnectionControl {
        connected_brokers: "mock://c".into(),
        ..Default::default()
    };
    connected_member(&failover).fire_command(control.into());
    assert!(!failover.uri_pool().contains(&uri("mock://c")));
}

// ============================================================================
// Registry Integration
// ============================================================================

#[test]
fn registry_builds_a_correlated_failover_stack() {
    init_tracing();
    let registry = TransportRegistry::with_defaults();
    let uri = uri("failover:(mock://a,mock://b)");
    let transport = registry
        .create(&uri, &config::Config::default())
        .expect("Failed to create stack");
    transport.start().unwrap();

    assert!(transport.is_fault_tolerant());
    assert!(transport.is_reconnect_supported());
    let response = transport
        .request_timeout(SessionInfo::default().into(), WAIT)
        .expect("Request failed");
    assert_eq!(response.correlation_id, 1);
    transport.close().unwrap();
}
