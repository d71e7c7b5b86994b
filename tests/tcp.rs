//! TCP Stack Integration Tests
//!
//! A loopback "broker" built from `std::net::TcpListener` and
//! `OpenWireFormat` performs the WireFormatInfo handshake and answers
//! requests, so the whole TCP -> negotiator -> correlator stack runs over a
//! real socket.

mod common;

use common::*;
use openwire_transport::commands::{KeepAliveInfo, SessionInfo};
use openwire_transport::prelude::*;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

// ============================================================================
// Broker Double
// ============================================================================

struct BrokerConnection {
    stream: TcpStream,
    wire_format: OpenWireFormat,
}

impl BrokerConnection {
    /// Accepts one client and completes the handshake, advertising `version`.
    fn accept(listener: &TcpListener, version: i32) -> Self {
        let version = version.to_string();
        Self::accept_with(listener, &[("wireFormat.version", &version)])
    }

    fn accept_with(listener: &TcpListener, settings: &[(&str, &str)]) -> Self {
        let (stream, _) = listener.accept().expect("Failed to accept");
        let wire_format =
            OpenWireFormat::new(&config(settings)).expect("Failed to create wire format");
        let mut connection = Self {
            stream,
            wire_format,
        };

        let info = connection.wire_format.preferred_wire_format_info().clone();
        connection.send(info.into());
        match connection.receive() {
            Some(Command::WireFormatInfo(peer)) => connection
                .wire_format
                .renegotiate(&peer)
                .expect("Failed to renegotiate"),
            other => panic!("expected WireFormatInfo, got {other:?}"),
        }
        connection
    }

    fn send(&mut self, command: Command) {
        self.wire_format
            .marshal(Some(&DataStructure::Command(command)), &mut self.stream)
            .expect("Failed to send");
    }

    fn receive(&mut self) -> Option<Command> {
        self.wire_format.unmarshal_command(&mut self.stream).ok()
    }

    /// Answers every command that requires a response until the client leaves.
    fn serve(mut self) -> Vec<Command> {
        let mut received = Vec::new();
        while let Some(command) = self.receive() {
            if command.is_response_required() {
                self.send(Response::new(command.command_id()).into());
            }
            received.push(command);
        }
        received
    }
}

fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

fn spawn_broker<T: Send + 'static>(
    version: i32,
    session: impl FnOnce(BrokerConnection) -> T + Send + 'static,
) -> (SocketAddr, JoinHandle<T>) {
    let (listener, addr) = bind();
    let handle = thread::spawn(move || session(BrokerConnection::accept(&listener, version)));
    (addr, handle)
}

fn connect(uri: &str) -> Arc<dyn Transport> {
    init_tracing();
    let uri = BrokerUri::parse(uri).expect("Failed to parse URI");
    TransportRegistry::with_defaults()
        .create(&uri, &config::Config::default())
        .expect("Failed to create stack")
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn request_round_trip_over_loopback() {
    let (addr, broker) = spawn_broker(6, BrokerConnection::serve);
    let transport = connect(&format!("tcp://{addr}"));
    transport.start().expect("Failed to connect");
    assert!(transport.is_connected());

    let response = transport
        .request_timeout(SessionInfo::default().into(), WAIT)
        .expect("Request failed");
    assert_eq!(response.correlation_id, 1);

    let negotiator = narrow::<WireFormatNegotiator>(&transport).unwrap();
    assert!(negotiator.is_negotiated());
    assert_eq!(negotiator.wire_format().version(), 6);
    let tcp = narrow::<TcpTransport>(&transport).unwrap();
    assert_eq!(tcp.local_address().map(|a| a.ip()), Some(addr.ip()));

    transport.oneway(KeepAliveInfo::default().into()).unwrap();
    transport.close().unwrap();
    let received = broker.join().unwrap();
    assert!(matches!(received[0], Command::SessionInfo(_)));
    assert!(matches!(received[1], Command::KeepAliveInfo(_)));
    assert_eq!(received[1].command_id(), 2);
}

#[test]
fn wire_tracing_does_not_change_the_stream() {
    let (addr, broker) = spawn_broker(9, BrokerConnection::serve);
    let transport = connect(&format!("tcp://{addr}?transport.tcpTracingEnabled=true"));
    assert!(narrow::<TcpTransport>(&transport).unwrap().is_tracing_enabled());
    transport.start().unwrap();

    let response = transport
        .request_timeout(SessionInfo::default().into(), WAIT)
        .expect("Request failed");
    assert_eq!(response.correlation_id, 1);
    transport.close().unwrap();
    broker.join().unwrap();
}

#[test]
fn broker_disconnect_fails_pending_requests() {
    let (addr, broker) = spawn_broker(9, |mut connection| {
        let first = connection.receive();
        drop(connection);
        first
    });
    let transport = connect(&format!("tcp://{addr}"));
    let listener = RecordingListener::new();
    transport.set_transport_listener(Some(listener.clone()));
    transport.start().unwrap();

    let err = transport
        .request_timeout(SessionInfo::default().into(), WAIT)
        .unwrap_err();
    assert!(matches!(err, Error::NoResponse { .. }), "unexpected error: {err}");
    assert!(listener.wait_for(WAIT, |events| events.errors.len() == 1));
    assert!(transport.oneway(KeepAliveInfo::default().into()).is_err());
    assert!(matches!(broker.join().unwrap(), Some(Command::SessionInfo(_))));
}

#[test]
fn silent_broker_is_detected_by_the_inactivity_monitor() {
    let (listener, addr) = bind();
    let broker = thread::spawn(move || {
        BrokerConnection::accept_with(
            &listener,
            &[
                ("wireFormat.maxInactivityDuration", "90"),
                ("wireFormat.maxInactivityDurationInitalDelay", "0"),
            ],
        )
        .serve()
    });
    let transport = connect(&format!(
        "tcp://{addr}?wireFormat.maxInactivityDuration=90&wireFormat.maxInactivityDurationInitalDelay=0"
    ));
    let listener = RecordingListener::new();
    transport.set_transport_listener(Some(listener.clone()));
    transport.start().unwrap();

    assert!(listener.wait_for(WAIT, |events| events.errors.len() == 1));
    assert!(listener.errors()[0].contains("inactive for too long"));
    assert!(!narrow::<InactivityMonitor>(&transport).unwrap().is_monitoring());

    transport.close().unwrap();
    let received = broker.join().unwrap();
    assert!(received
        .iter()
        .any(|command| matches!(command, Command::KeepAliveInfo(_))));
}

#[test]
fn connect_failure_is_reported_by_start() {
    let (listener, addr) = bind();
    drop(listener);

    let transport = connect(&format!("tcp://{addr}?connectTimeout=1000"));
    let err = transport.start().unwrap_err();
    assert!(err.is_io());
    assert!(!transport.is_connected());
}

#[test]
fn failover_replays_requests_on_the_next_broker() {
    let (first_addr, first) = spawn_broker(9, |mut connection| {
        let first = connection.receive();
        drop(connection);
        first
    });
    let (second_addr, second) = spawn_broker(9, BrokerConnection::serve);

    let transport = connect(&format!(
        "failover:(tcp://{first_addr},tcp://{second_addr})?randomize=false"
    ));
    let listener = RecordingListener::new();
    transport.set_transport_listener(Some(listener.clone()));
    transport.start().unwrap();

    let response = transport
        .request_timeout(SessionInfo::default().into(), WAIT)
        .expect("Request was not replayed");
    assert_eq!(response.correlation_id, 1);
    assert!(listener.wait_for(WAIT, |events| events.interrupted == 1 && events.resumed == 1));
    assert_eq!(
        transport.remote_address(),
        Some(format!("tcp://{}:{}", second_addr.ip(), second_addr.port()))
    );

    transport.close().unwrap();
    assert!(matches!(first.join().unwrap(), Some(Command::SessionInfo(_))));
    let replayed = second.join().unwrap();
    assert!(matches!(&replayed[0], Command::ConnectionControl(control) if control.fault_tolerant));
    assert!(matches!(&replayed[1], Command::SessionInfo(_) if replayed[1].command_id() == 1));
}
