use std::time::Duration;
use thiserror::Error;

/// The error type for openwire-transport operations.
///
/// Variants fall into four families: configuration errors raised while a
/// transport stack is being built, I/O errors from sockets and closed
/// transports, protocol errors raised by the wire format, and timeouts.
/// Protocol errors are reported through the same paths as I/O errors, so
/// [`Error::is_io`] is true for both. Timeouts are kept apart so callers can
/// tell "no answer yet" from "connection broken".
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================

    /// Configuration lookup or conversion failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    /// A broker URI could not be parsed.
    #[error("Invalid URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    /// A required setting was neither part of the URI nor of the configuration.
    #[error("Missing required parameter '{0}'")]
    MissingParameter(String),

    /// A setting was present but its value is not acceptable.
    #[error("Invalid value '{value}' for parameter '{key}'")]
    InvalidParameter { key: String, value: String },

    /// No transport factory is registered for the URI scheme.
    #[error("No transport factory registered for scheme '{0}'")]
    UnknownScheme(String),

    // ============================================================================
    // I/O and Transport Errors
    // ============================================================================

    /// Low-level I/O error from a socket or stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport has been closed.
    #[error("Transport is closed")]
    Closed,

    /// The transport failed earlier and every later call reports that failure.
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// The failover transport is reconnecting and configured to reject sends.
    #[error("Transport interrupted, reconnect in progress")]
    Interrupted,

    /// The failover transport cannot hold more commands while reconnecting.
    #[error("Reconnect backlog is full ({capacity} commands)")]
    BacklogFull { capacity: usize },

    /// A request was released without a response, usually because the
    /// transport failed or was closed while the caller was waiting.
    #[error("No valid response received for command {command_type} (id {command_id}){}", .cause.as_ref().map(|c| format!(": {c}")).unwrap_or_default())]
    NoResponse {
        command_type: &'static str,
        command_id: i32,
        cause: Option<String>,
    },

    // ============================================================================
    // Protocol Errors
    // ============================================================================

    /// No marshaller is registered for a type tag read from the wire.
    #[error("Unknown data type: {0}")]
    UnknownDataType(u8),

    /// Wire data is truncated or does not match the expected layout.
    #[error("Malformed data: {0}")]
    MalformedData(String),

    /// A WireFormatInfo did not start with the OpenWire magic.
    #[error("Invalid WireFormatInfo magic")]
    InvalidMagic,

    /// A wire version above what the marshallers understand was requested.
    #[error("Unsupported wire format version {requested} (max {max})")]
    UnsupportedVersion { requested: i32, max: i32 },

    /// A frame declared a size above the configured limit.
    #[error("Frame size of {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    /// A value was handed to an operation expecting a different type.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ============================================================================
    // Timeouts and Broker Errors
    // ============================================================================

    /// A deadline passed before the awaited event happened.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The broker answered a request with an exception response.
    #[error("Broker error {class}: {message}")]
    Broker { class: String, message: String },

    /// The operation is not supported by this transport.
    #[error("Operation not supported: {0}")]
    UnsupportedOperation(&'static str),
}

impl Error {
    /// Returns true for errors caused by a deadline passing.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    /// Returns true for I/O-class errors: broken connections, closed
    /// transports and protocol violations.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::Closed
                | Error::TransportFailure(_)
                | Error::Interrupted
                | Error::BacklogFull { .. }
                | Error::NoResponse { .. }
                | Error::UnknownDataType(_)
                | Error::MalformedData(_)
                | Error::InvalidMagic
                | Error::UnsupportedVersion { .. }
                | Error::FrameTooLarge { .. }
        )
    }

    /// Returns true when the error means the connection itself is unusable,
    /// as opposed to a command that could not be encoded or was rejected
    /// locally.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::Closed
                | Error::TransportFailure(_)
                | Error::Interrupted
                | Error::Timeout(_)
                | Error::NoResponse { .. }
        )
    }

    pub(crate) fn malformed(what: impl Into<String>) -> Self {
        Error::MalformedData(what.into())
    }
}
