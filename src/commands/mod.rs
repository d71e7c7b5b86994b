//! OpenWire command and data structure model.
//!
//! Every marshallable entity is a [`DataStructure`]. Commands, the units
//! exchanged over a transport, form the closed [`Command`] sum type. Each
//! concrete type implements [`BaseDataStructure`], which supplies its type tag
//! and conversions to and from the enums.

mod destination;
mod ids;
mod info;
mod primitive_map;
mod response;
mod visitor;
mod wire_format_info;

pub use destination::{ActiveMQDestination, DestinationType};
pub use ids::{BrokerId, ConnectionId, ConsumerId, MessageId, ProducerId, SessionId};
pub use info::{
    BrokerInfo, ConnectionControl, ConnectionError, ConnectionInfo, KeepAliveInfo, ProducerInfo,
    RemoveInfo, SessionInfo, ShutdownInfo,
};
pub use primitive_map::{PrimitiveMap, PrimitiveValue};
pub use response::{BrokerError, Response, ResponseKind, StackTraceElement};
pub use visitor::CommandVisitor;
pub use wire_format_info::WireFormatInfo;

use crate::error::Error;
use std::fmt;

// ============================================================================
// Type Codes
// ============================================================================

/// Numeric type tags written in front of every marshalled structure.
pub mod type_codes {
    pub const NULL: u8 = 0;

    pub const WIREFORMAT_INFO: u8 = 1;
    pub const BROKER_INFO: u8 = 2;
    pub const CONNECTION_INFO: u8 = 3;
    pub const SESSION_INFO: u8 = 4;
    pub const PRODUCER_INFO: u8 = 6;
    pub const KEEP_ALIVE_INFO: u8 = 10;
    pub const SHUTDOWN_INFO: u8 = 11;
    pub const REMOVE_INFO: u8 = 12;
    pub const CONNECTION_ERROR: u8 = 16;
    pub const CONNECTION_CONTROL: u8 = 18;

    pub const RESPONSE: u8 = 30;
    pub const EXCEPTION_RESPONSE: u8 = 31;
    pub const DATA_RESPONSE: u8 = 32;
    pub const INTEGER_RESPONSE: u8 = 34;

    pub const ACTIVEMQ_QUEUE: u8 = 100;
    pub const ACTIVEMQ_TOPIC: u8 = 101;
    pub const ACTIVEMQ_TEMP_QUEUE: u8 = 102;
    pub const ACTIVEMQ_TEMP_TOPIC: u8 = 103;

    pub const MESSAGE_ID: u8 = 110;
    pub const CONNECTION_ID: u8 = 120;
    pub const SESSION_ID: u8 = 121;
    pub const CONSUMER_ID: u8 = 122;
    pub const PRODUCER_ID: u8 = 123;
    pub const BROKER_ID: u8 = 124;
}

// ============================================================================
// BaseDataStructure Trait
// ============================================================================

/// Behaviour shared by every concrete data structure.
///
/// Equality is the derived structural `PartialEq`; cloning is `Clone`. The
/// trait adds the type tag and the typed views into [`DataStructure`].
pub trait BaseDataStructure:
    fmt::Debug + Clone + PartialEq + Into<DataStructure> + Send + Sync + 'static
{
    /// The fixed type tag used as the marshaller-table key.
    fn data_structure_type(&self) -> u8;

    /// Borrows `data` as `Self` when it holds this concrete type.
    fn from_data_structure(data: &DataStructure) -> Option<&Self>;

    /// Converts `data` into `Self`, handing it back unchanged on a type mismatch.
    fn try_from_data_structure(data: DataStructure) -> Result<Self, DataStructure>;

    /// Returns a deep copy wrapped as a [`DataStructure`].
    fn clone_data_structure(&self) -> DataStructure {
        self.clone().into()
    }

    /// Replaces every field of `self` with a deep copy of `src`.
    ///
    /// Fails with [`Error::InvalidArgument`] when `src` is a different type.
    fn copy_data_structure(&mut self, src: &DataStructure) -> Result<(), Error> {
        let src = Self::from_data_structure(src).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "cannot copy a structure of type {} into type {}",
                src.data_structure_type(),
                self.data_structure_type()
            ))
        })?;
        self.clone_from(src);
        Ok(())
    }
}

// Implements the enum conversions for a command type. The optional closure
// form computes the tag from the value for types sharing one struct across
// several tags.
macro_rules! command_structure {
    ($ty:ident, |$this:ident| $code:expr) => {
        impl From<$ty> for Command {
            fn from(value: $ty) -> Self {
                Command::$ty(value)
            }
        }

        impl From<$ty> for DataStructure {
            fn from(value: $ty) -> Self {
                DataStructure::Command(Command::$ty(value))
            }
        }

        impl $crate::commands::BaseDataStructure for $ty {
            fn data_structure_type(&self) -> u8 {
                let $this = self;
                $code
            }

            fn from_data_structure(data: &DataStructure) -> Option<&Self> {
                match data {
                    DataStructure::Command(Command::$ty(value)) => Some(value),
                    _ => None,
                }
            }

            fn try_from_data_structure(data: DataStructure) -> Result<Self, DataStructure> {
                match data {
                    DataStructure::Command(Command::$ty(value)) => Ok(value),
                    other => Err(other),
                }
            }
        }
    };
    ($ty:ident, $code:expr) => {
        command_structure!($ty, |_this| $code);
    };
}

macro_rules! value_structure {
    ($ty:ident, $variant:ident, |$this:ident| $code:expr) => {
        impl From<$ty> for DataStructure {
            fn from(value: $ty) -> Self {
                DataStructure::$variant(value)
            }
        }

        impl $crate::commands::BaseDataStructure for $ty {
            fn data_structure_type(&self) -> u8 {
                let $this = self;
                $code
            }

            fn from_data_structure(data: &DataStructure) -> Option<&Self> {
                match data {
                    DataStructure::$variant(value) => Some(value),
                    _ => None,
                }
            }

            fn try_from_data_structure(data: DataStructure) -> Result<Self, DataStructure> {
                match data {
                    DataStructure::$variant(value) => Ok(value),
                    other => Err(other),
                }
            }
        }
    };
    ($ty:ident, $variant:ident, $code:expr) => {
        value_structure!($ty, $variant, |_this| $code);
    };
}

use type_codes::*;

command_structure!(WireFormatInfo, WIREFORMAT_INFO);
command_structure!(BrokerInfo, BROKER_INFO);
command_structure!(ConnectionInfo, CONNECTION_INFO);
command_structure!(SessionInfo, SESSION_INFO);
command_structure!(ProducerInfo, PRODUCER_INFO);
command_structure!(KeepAliveInfo, KEEP_ALIVE_INFO);
command_structure!(ShutdownInfo, SHUTDOWN_INFO);
command_structure!(RemoveInfo, REMOVE_INFO);
command_structure!(ConnectionError, CONNECTION_ERROR);
command_structure!(ConnectionControl, CONNECTION_CONTROL);
command_structure!(Response, |this| this.kind.data_structure_type());

value_structure!(ConnectionId, ConnectionId, CONNECTION_ID);
value_structure!(SessionId, SessionId, SESSION_ID);
value_structure!(ProducerId, ProducerId, PRODUCER_ID);
value_structure!(ConsumerId, ConsumerId, CONSUMER_ID);
value_structure!(BrokerId, BrokerId, BROKER_ID);
value_structure!(MessageId, MessageId, MESSAGE_ID);
value_structure!(ActiveMQDestination, Destination, |this| this
    .destination_type()
    .data_structure_type());

// ============================================================================
// BaseCommand
// ============================================================================

/// Header fields shared by every command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BaseCommand {
    /// Sequence number assigned by the sender, unique per connection.
    pub command_id: i32,
    pub response_required: bool,
}

// ============================================================================
// Command
// ============================================================================

/// A unit of protocol exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    WireFormatInfo(WireFormatInfo),
    BrokerInfo(BrokerInfo),
    ConnectionInfo(ConnectionInfo),
    SessionInfo(SessionInfo),
    ProducerInfo(ProducerInfo),
    KeepAliveInfo(KeepAliveInfo),
    ShutdownInfo(ShutdownInfo),
    RemoveInfo(RemoveInfo),
    ConnectionError(ConnectionError),
    ConnectionControl(ConnectionControl),
    Response(Response),
}

macro_rules! dispatch {
    ($command:expr, $inner:ident => $body:expr) => {
        match $command {
            Command::WireFormatInfo($inner) => $body,
            Command::BrokerInfo($inner) => $body,
            Command::ConnectionInfo($inner) => $body,
            Command::SessionInfo($inner) => $body,
            Command::ProducerInfo($inner) => $body,
            Command::KeepAliveInfo($inner) => $body,
            Command::ShutdownInfo($inner) => $body,
            Command::RemoveInfo($inner) => $body,
            Command::ConnectionError($inner) => $body,
            Command::ConnectionControl($inner) => $body,
            Command::Response($inner) => $body,
        }
    };
}

impl Command {
    pub fn base(&self) -> &BaseCommand {
        dispatch!(self, c => &c.base)
    }

    pub fn base_mut(&mut self) -> &mut BaseCommand {
        dispatch!(self, c => &mut c.base)
    }

    pub fn command_id(&self) -> i32 {
        self.base().command_id
    }

    pub fn set_command_id(&mut self, id: i32) {
        self.base_mut().command_id = id;
    }

    pub fn is_response_required(&self) -> bool {
        self.base().response_required
    }

    pub fn set_response_required(&mut self, required: bool) {
        self.base_mut().response_required = required;
    }

    pub fn data_structure_type(&self) -> u8 {
        dispatch!(self, c => c.data_structure_type())
    }

    /// Name of the concrete command type, for logs and diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Command::WireFormatInfo(_) => "WireFormatInfo",
            Command::BrokerInfo(_) => "BrokerInfo",
            Command::ConnectionInfo(_) => "ConnectionInfo",
            Command::SessionInfo(_) => "SessionInfo",
            Command::ProducerInfo(_) => "ProducerInfo",
            Command::KeepAliveInfo(_) => "KeepAliveInfo",
            Command::ShutdownInfo(_) => "ShutdownInfo",
            Command::RemoveInfo(_) => "RemoveInfo",
            Command::ConnectionError(_) => "ConnectionError",
            Command::ConnectionControl(_) => "ConnectionControl",
            Command::Response(r) => r.kind.type_name(),
        }
    }

    pub fn as_response(&self) -> Option<&Response> {
        match self {
            Command::Response(response) => Some(response),
            _ => None,
        }
    }

    pub fn is_response(&self) -> bool {
        matches!(self, Command::Response(_))
    }

    /// Calls the visitor method matching this command's concrete type.
    pub fn visit(&self, visitor: &mut dyn CommandVisitor) -> Result<Option<Command>, Error> {
        match self {
            Command::WireFormatInfo(c) => visitor.process_wire_format_info(c),
            Command::BrokerInfo(c) => visitor.process_broker_info(c),
            Command::ConnectionInfo(c) => visitor.process_connection_info(c),
            Command::SessionInfo(c) => visitor.process_session_info(c),
            Command::ProducerInfo(c) => visitor.process_producer_info(c),
            Command::KeepAliveInfo(c) => visitor.process_keep_alive_info(c),
            Command::ShutdownInfo(c) => visitor.process_shutdown_info(c),
            Command::RemoveInfo(c) => visitor.process_remove_info(c),
            Command::ConnectionError(c) => visitor.process_connection_error(c),
            Command::ConnectionControl(c) => visitor.process_connection_control(c),
            Command::Response(c) => visitor.process_response(c),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        dispatch!(self, c => write!(f, "{c:?}"))
    }
}

// ============================================================================
// DataStructure
// ============================================================================

/// Any marshallable entity: a command or one of the value types nested in
/// commands.
#[derive(Debug, Clone, PartialEq)]
pub enum DataStructure {
    Command(Command),
    ConnectionId(ConnectionId),
    SessionId(SessionId),
    ProducerId(ProducerId),
    ConsumerId(ConsumerId),
    BrokerId(BrokerId),
    MessageId(MessageId),
    Destination(ActiveMQDestination),
}

impl DataStructure {
    pub fn data_structure_type(&self) -> u8 {
        match self {
            DataStructure::Command(c) => c.data_structure_type(),
            DataStructure::ConnectionId(v) => v.data_structure_type(),
            DataStructure::SessionId(v) => v.data_structure_type(),
            DataStructure::ProducerId(v) => v.data_structure_type(),
            DataStructure::ConsumerId(v) => v.data_structure_type(),
            DataStructure::BrokerId(v) => v.data_structure_type(),
            DataStructure::MessageId(v) => v.data_structure_type(),
            DataStructure::Destination(v) => v.data_structure_type(),
        }
    }

    /// Replaces `self` with a deep copy of `src`.
    ///
    /// Both sides must carry the same type tag.
    pub fn copy_data_structure(&mut self, src: &DataStructure) -> Result<(), Error> {
        if self.data_structure_type() != src.data_structure_type() {
            return Err(Error::InvalidArgument(format!(
                "cannot copy a structure of type {} into type {}",
                src.data_structure_type(),
                self.data_structure_type()
            )));
        }
        self.clone_from(src);
        Ok(())
    }

    pub fn as_command(&self) -> Option<&Command> {
        match self {
            DataStructure::Command(command) => Some(command),
            _ => None,
        }
    }

    pub fn into_command(self) -> Option<Command> {
        match self {
            DataStructure::Command(command) => Some(command),
            _ => None,
        }
    }
}

impl From<Command> for DataStructure {
    fn from(command: Command) -> Self {
        DataStructure::Command(command)
    }
}

impl fmt::Display for DataStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataStructure::Command(c) => fmt::Display::fmt(c, f),
            DataStructure::ConnectionId(v) => fmt::Display::fmt(v, f),
            DataStructure::SessionId(v) => fmt::Display::fmt(v, f),
            DataStructure::ProducerId(v) => fmt::Display::fmt(v, f),
            DataStructure::ConsumerId(v) => fmt::Display::fmt(v, f),
            DataStructure::BrokerId(v) => fmt::Display::fmt(v, f),
            DataStructure::MessageId(v) => fmt::Display::fmt(v, f),
            DataStructure::Destination(v) => fmt::Display::fmt(v, f),
        }
    }
}
