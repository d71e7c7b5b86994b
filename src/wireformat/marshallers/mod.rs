//! Loose-encoding marshallers for the built-in structures.

mod commands;
mod values;

use super::marshaller::TypedMarshaller;
use super::registry::MarshallerRegistry;
use crate::commands::type_codes::*;
use crate::commands::{
    ActiveMQDestination, BrokerId, BrokerInfo, ConnectionControl, ConnectionError, ConnectionId,
    ConnectionInfo, ConsumerId, KeepAliveInfo, MessageId, ProducerId, ProducerInfo, RemoveInfo,
    Response, SessionId, SessionInfo, ShutdownInfo, WireFormatInfo,
};

macro_rules! register {
    ($registry:expr, $($ty:ty => [$($code:expr),+ $(,)?]),+ $(,)?) => {
        $($(
            $registry.add_marshaller(TypedMarshaller::<$ty>::new($code));
        )+)+
    };
}

pub(crate) fn register_defaults(registry: &mut MarshallerRegistry) {
    register!(registry,
        WireFormatInfo => [WIREFORMAT_INFO],
        BrokerInfo => [BROKER_INFO],
        ConnectionInfo => [CONNECTION_INFO],
        SessionInfo => [SESSION_INFO],
        ProducerInfo => [PRODUCER_INFO],
        KeepAliveInfo => [KEEP_ALIVE_INFO],
        ShutdownInfo => [SHUTDOWN_INFO],
        RemoveInfo => [REMOVE_INFO],
        ConnectionError => [CONNECTION_ERROR],
        ConnectionControl => [CONNECTION_CONTROL],
        Response => [RESPONSE, EXCEPTION_RESPONSE, DATA_RESPONSE, INTEGER_RESPONSE],
        ActiveMQDestination => [
            ACTIVEMQ_QUEUE,
            ACTIVEMQ_TOPIC,
            ACTIVEMQ_TEMP_QUEUE,
            ACTIVEMQ_TEMP_TOPIC,
        ],
        MessageId => [MESSAGE_ID],
        ConnectionId => [CONNECTION_ID],
        SessionId => [SESSION_ID],
        ConsumerId => [CONSUMER_ID],
        ProducerId => [PRODUCER_ID],
        BrokerId => [BROKER_ID],
    );
}
