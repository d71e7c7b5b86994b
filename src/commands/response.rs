use super::{type_codes, BaseCommand, DataStructure};
use crate::error::Error;
use std::fmt;

/// A command answering an earlier request.
///
/// `correlation_id` holds the `command_id` of the request. The kind decides
/// which wire type the response travels as.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub base: BaseCommand,
    pub correlation_id: i32,
    pub kind: ResponseKind,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum ResponseKind {
    #[default]
    Plain,
    Exception(Option<BrokerError>),
    Data(Option<Box<DataStructure>>),
    Integer(i32),
}

impl ResponseKind {
    pub fn data_structure_type(&self) -> u8 {
        match self {
            ResponseKind::Plain => type_codes::RESPONSE,
            ResponseKind::Exception(_) => type_codes::EXCEPTION_RESPONSE,
            ResponseKind::Data(_) => type_codes::DATA_RESPONSE,
            ResponseKind::Integer(_) => type_codes::INTEGER_RESPONSE,
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            ResponseKind::Plain => "Response",
            ResponseKind::Exception(_) => "ExceptionResponse",
            ResponseKind::Data(_) => "DataResponse",
            ResponseKind::Integer(_) => "IntegerResponse",
        }
    }
}

impl Response {
    pub fn new(correlation_id: i32) -> Self {
        Self {
            correlation_id,
            ..Default::default()
        }
    }

    pub fn with_kind(correlation_id: i32, kind: ResponseKind) -> Self {
        Self {
            correlation_id,
            kind,
            ..Default::default()
        }
    }

    pub fn is_exception(&self) -> bool {
        matches!(self.kind, ResponseKind::Exception(_))
    }

    /// Turns an exception response into [`Error::Broker`].
    pub fn into_result(self) -> Result<Response, Error> {
        match &self.kind {
            ResponseKind::Exception(Some(error)) => Err(Error::Broker {
                class: error.exception_class.clone(),
                message: error.message.clone(),
            }),
            ResponseKind::Exception(None) => Err(Error::Broker {
                class: String::new(),
                message: format!("exception response to command {}", self.correlation_id),
            }),
            _ => Ok(self),
        }
    }
}

// ============================================================================
// BrokerError
// ============================================================================

/// A server-side exception carried inside exception responses and
/// connection errors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrokerError {
    pub exception_class: String,
    pub message: String,
    pub stack_trace: Vec<StackTraceElement>,
    pub cause: Option<Box<BrokerError>>,
}

impl BrokerError {
    pub fn new(exception_class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            exception_class: exception_class.into(),
            message: message.into(),
            ..Default::default()
        }
    }
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.exception_class, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " (caused by {cause})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackTraceElement {
    pub class_name: String,
    pub method_name: String,
    pub file_name: String,
    pub line_number: i32,
}
