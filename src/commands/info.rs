//! Connection lifecycle and control commands.
//!
//! Fields marked with a version only travel on connections that negotiated
//! at least that OpenWire version.

use super::{
    ActiveMQDestination, BaseCommand, BrokerError, BrokerId, ConnectionId, DataStructure,
    ProducerId, SessionId,
};

/// Describes the broker at the other end of a connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrokerInfo {
    pub base: BaseCommand,
    pub broker_id: Option<BrokerId>,
    pub broker_url: String,
    pub peer_broker_infos: Vec<BrokerInfo>,
    pub broker_name: String,
    pub slave_broker: bool,
    pub master_broker: bool,
    pub fault_tolerant_configuration: bool,
    /// Version 2.
    pub duplex_connection: bool,
    /// Version 2.
    pub network_connection: bool,
    /// Version 2.
    pub connection_id: i64,
    /// Version 3.
    pub broker_upload_url: String,
    /// Version 3.
    pub network_properties: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionInfo {
    pub base: BaseCommand,
    pub connection_id: Option<ConnectionId>,
    pub client_id: String,
    pub password: String,
    pub user_name: String,
    pub broker_path: Vec<BrokerId>,
    pub broker_master_connector: bool,
    pub manageable: bool,
    /// Version 2.
    pub client_master: bool,
    /// Version 6.
    pub fault_tolerant: bool,
    /// Version 6.
    pub failover_reconnect: bool,
    /// Version 8.
    pub client_ip: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionInfo {
    pub base: BaseCommand,
    pub session_id: Option<SessionId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProducerInfo {
    pub base: BaseCommand,
    pub producer_id: Option<ProducerId>,
    pub destination: Option<ActiveMQDestination>,
    pub broker_path: Vec<BrokerId>,
    /// Version 2.
    pub dispatch_async: bool,
    /// Version 3.
    pub window_size: i32,
}

/// Removes the connection, session, producer or consumer named by `object_id`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoveInfo {
    pub base: BaseCommand,
    pub object_id: Option<Box<DataStructure>>,
    /// Version 5.
    pub last_delivered_sequence_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShutdownInfo {
    pub base: BaseCommand,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeepAliveInfo {
    pub base: BaseCommand,
}

/// Broker-initiated connection management: suspend, resume, rebalance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionControl {
    pub base: BaseCommand,
    pub close: bool,
    pub exit: bool,
    pub fault_tolerant: bool,
    pub resume: bool,
    pub suspend: bool,
    /// Version 6. Comma separated broker URIs the client may fail over to.
    pub connected_brokers: String,
    /// Version 6.
    pub reconnect_to: String,
    /// Version 6.
    pub rebalance_connection: bool,
    /// Version 8.
    pub token: Vec<u8>,
}

/// Sent by the broker when a connection-level operation fails.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionError {
    pub base: BaseCommand,
    pub exception: Option<BrokerError>,
    pub connection_id: Option<ConnectionId>,
}
