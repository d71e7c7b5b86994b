//! Identifier value types.
//!
//! Composite ids render as colon separated keys. `ProducerId` and
//! `MessageId` also parse that form back, splitting from the right so
//! connection ids that contain colons survive the round trip.

use crate::error::Error;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    pub value: String,
}

impl ConnectionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SessionId {
    pub connection_id: String,
    pub value: i64,
}

impl SessionId {
    pub fn new(connection_id: &ConnectionId, value: i64) -> Self {
        Self {
            connection_id: connection_id.value.clone(),
            value,
        }
    }

    pub fn parent_id(&self) -> ConnectionId {
        ConnectionId::new(self.connection_id.clone())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.connection_id, self.value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProducerId {
    pub connection_id: String,
    pub value: i64,
    pub session_id: i64,
}

impl ProducerId {
    pub fn new(session_id: &SessionId, value: i64) -> Self {
        Self {
            connection_id: session_id.connection_id.clone(),
            value,
            session_id: session_id.value,
        }
    }

    pub fn parent_id(&self) -> SessionId {
        SessionId {
            connection_id: self.connection_id.clone(),
            value: self.session_id,
        }
    }
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.connection_id, self.session_id, self.value)
    }
}

impl FromStr for ProducerId {
    type Err = Error;

    /// Parses `connectionId:sessionId:value`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rest, value) = split_sequence(s)?;
        let (connection_id, session_id) = split_sequence(rest)?;
        Ok(Self {
            connection_id: connection_id.to_string(),
            value,
            session_id,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ConsumerId {
    pub connection_id: String,
    pub session_id: i64,
    pub value: i64,
}

impl ConsumerId {
    pub fn new(session_id: &SessionId, value: i64) -> Self {
        Self {
            connection_id: session_id.connection_id.clone(),
            session_id: session_id.value,
            value,
        }
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.connection_id, self.session_id, self.value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BrokerId {
    pub value: String,
}

impl BrokerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl fmt::Display for BrokerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

// ============================================================================
// MessageId
// ============================================================================

/// Identifies a message by producer and per-producer sequence number.
///
/// The key form is `<producerId>:<producerSequenceId>`. It is computed on
/// first use and cached until a producer field changes.
#[derive(Debug, Clone, Default)]
pub struct MessageId {
    producer_id: Option<ProducerId>,
    producer_sequence_id: i64,
    broker_sequence_id: i64,
    key: OnceLock<String>,
}

impl MessageId {
    pub fn new(producer_id: ProducerId, producer_sequence_id: i64) -> Self {
        Self {
            producer_id: Some(producer_id),
            producer_sequence_id,
            ..Default::default()
        }
    }

    /// Builds a message id from its key form.
    pub fn from_value(key: &str) -> Result<Self, Error> {
        let mut id = Self::default();
        id.set_value(key)?;
        Ok(id)
    }

    /// Replaces the producer id and sequence number with those parsed from
    /// `key`. On error the id is left unchanged.
    pub fn set_value(&mut self, key: &str) -> Result<(), Error> {
        let (producer, sequence) = split_sequence(key)?;
        let producer_id = producer.parse::<ProducerId>()?;
        self.producer_id = Some(producer_id);
        self.producer_sequence_id = sequence;
        self.key = OnceLock::new();
        Ok(())
    }

    pub fn producer_id(&self) -> Option<&ProducerId> {
        self.producer_id.as_ref()
    }

    pub fn set_producer_id(&mut self, producer_id: Option<ProducerId>) {
        self.producer_id = producer_id;
        self.key = OnceLock::new();
    }

    pub fn producer_sequence_id(&self) -> i64 {
        self.producer_sequence_id
    }

    pub fn set_producer_sequence_id(&mut self, sequence: i64) {
        self.producer_sequence_id = sequence;
        self.key = OnceLock::new();
    }

    pub fn broker_sequence_id(&self) -> i64 {
        self.broker_sequence_id
    }

    pub fn set_broker_sequence_id(&mut self, sequence: i64) {
        self.broker_sequence_id = sequence;
    }

    /// The cached `<producerId>:<producerSequenceId>` key.
    pub fn key(&self) -> &str {
        self.key.get_or_init(|| {
            let producer = self
                .producer_id
                .as_ref()
                .map(ProducerId::to_string)
                .unwrap_or_default();
            format!("{producer}:{}", self.producer_sequence_id)
        })
    }
}

impl PartialEq for MessageId {
    fn eq(&self, other: &Self) -> bool {
        self.producer_id == other.producer_id
            && self.producer_sequence_id == other.producer_sequence_id
            && self.broker_sequence_id == other.broker_sequence_id
    }
}

impl Eq for MessageId {}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for MessageId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageId::from_value(s)
    }
}

// Splits `prefix:number` at the last colon.
fn split_sequence(s: &str) -> Result<(&str, i64), Error> {
    let (prefix, number) = s
        .rsplit_once(':')
        .ok_or_else(|| Error::malformed(format!("'{s}' has no ':' separated sequence")))?;
    let number = number
        .parse::<i64>()
        .map_err(|_| Error::malformed(format!("'{number}' in '{s}' is not a 64-bit integer")))?;
    Ok((prefix, number))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_key_round_trips() {
        for key in [
            "ID:host-1234-5678-0:1:1:1",
            "conn:0:0:0",
            "c:-1:2:9223372036854775807",
            "c:1:2:-9223372036854775808",
        ] {
            let id = MessageId::from_value(key).unwrap();
            assert_eq!(id.to_string(), key);
        }
    }

    #[test]
    fn message_id_parts_are_split_from_the_right() {
        let id = MessageId::from_value("ID:broker:42:7:3:99").unwrap();
        let producer = id.producer_id().unwrap();
        assert_eq!(producer.connection_id, "ID:broker:42");
        assert_eq!(producer.session_id, 7);
        assert_eq!(producer.value, 3);
        assert_eq!(id.producer_sequence_id(), 99);
    }

    #[test]
    fn cached_key_is_invalidated_by_field_changes() {
        let mut id = MessageId::from_value("c:1:2:3").unwrap();
        assert_eq!(id.key(), "c:1:2:3");
        id.set_producer_sequence_id(4);
        assert_eq!(id.key(), "c:1:2:4");
        id.set_producer_id(Some("d:5:6".parse().unwrap()));
        assert_eq!(id.key(), "d:5:6:4");
        id.set_broker_sequence_id(100);
        assert_eq!(id.key(), "d:5:6:4");
    }

    #[test]
    fn malformed_keys_are_rejected_without_mutation() {
        let mut id = MessageId::from_value("c:1:2:3").unwrap();
        assert!(id.set_value("no-separator").is_err());
        assert!(id.set_value("c:1:2:not-a-number").is_err());
        assert!(id.set_value("c:1:99999999999999999999").is_err());
        assert_eq!(id.to_string(), "c:1:2:3");
    }

    #[test]
    fn equality_ignores_cached_key() {
        let a = MessageId::from_value("c:1:2:3").unwrap();
        let _ = a.key();
        let b = MessageId::new("c:1:2".parse().unwrap(), 3);
        assert_eq!(a, b);
    }

    #[test]
    fn ids_render_parent_chains() {
        let connection = ConnectionId::new("ID:c");
        let session = SessionId::new(&connection, 2);
        let producer = ProducerId::new(&session, 5);
        let consumer = ConsumerId::new(&session, 6);
        assert_eq!(session.to_string(), "ID:c:2");
        assert_eq!(producer.to_string(), "ID:c:2:5");
        assert_eq!(consumer.to_string(), "ID:c:2:6");
        assert_eq!(producer.parent_id(), session);
        assert_eq!(session.parent_id(), connection);
    }
}
