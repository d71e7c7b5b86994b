use super::type_codes;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DestinationType {
    #[default]
    Queue,
    Topic,
    TempQueue,
    TempTopic,
}

impl DestinationType {
    pub fn data_structure_type(self) -> u8 {
        match self {
            DestinationType::Queue => type_codes::ACTIVEMQ_QUEUE,
            DestinationType::Topic => type_codes::ACTIVEMQ_TOPIC,
            DestinationType::TempQueue => type_codes::ACTIVEMQ_TEMP_QUEUE,
            DestinationType::TempTopic => type_codes::ACTIVEMQ_TEMP_TOPIC,
        }
    }

    pub fn from_data_structure_type(code: u8) -> Option<Self> {
        match code {
            type_codes::ACTIVEMQ_QUEUE => Some(DestinationType::Queue),
            type_codes::ACTIVEMQ_TOPIC => Some(DestinationType::Topic),
            type_codes::ACTIVEMQ_TEMP_QUEUE => Some(DestinationType::TempQueue),
            type_codes::ACTIVEMQ_TEMP_TOPIC => Some(DestinationType::TempTopic),
            _ => None,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            DestinationType::Queue => "queue://",
            DestinationType::Topic => "topic://",
            DestinationType::TempQueue => "temp-queue://",
            DestinationType::TempTopic => "temp-topic://",
        }
    }
}

/// A queue or topic addressed by its physical name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ActiveMQDestination {
    destination_type: DestinationType,
    pub physical_name: String,
}

impl ActiveMQDestination {
    pub fn new(destination_type: DestinationType, physical_name: impl Into<String>) -> Self {
        Self {
            destination_type,
            physical_name: physical_name.into(),
        }
    }

    pub fn queue(physical_name: impl Into<String>) -> Self {
        Self::new(DestinationType::Queue, physical_name)
    }

    pub fn topic(physical_name: impl Into<String>) -> Self {
        Self::new(DestinationType::Topic, physical_name)
    }

    pub fn destination_type(&self) -> DestinationType {
        self.destination_type
    }

    pub fn is_topic(&self) -> bool {
        matches!(
            self.destination_type,
            DestinationType::Topic | DestinationType::TempTopic
        )
    }

    pub fn is_temporary(&self) -> bool {
        matches!(
            self.destination_type,
            DestinationType::TempQueue | DestinationType::TempTopic
        )
    }
}

impl fmt::Display for ActiveMQDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.destination_type.prefix(), self.physical_name)
    }
}
