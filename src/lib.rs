//! openwire-transport - the transport layer of an OpenWire messaging client
//!
//! Commands are modelled as plain Rust values ([`commands`]), encoded with the
//! OpenWire binary format ([`wireformat`]) and moved over a chain of layered
//! transports ([`transport`]): TCP at the bottom, filters for wire format
//! negotiation and request/response correlation on top, and an optional
//! failover layer that reconnects through a pool of broker URIs.
//!
//! Stacks are usually built from a broker URI:
//!
//! ```no_run
//! use openwire_transport::prelude::*;
//! use config::Config;
//!
//! # fn main() -> Result<(), Error> {
//! let registry = TransportRegistry::with_defaults();
//! let uri = BrokerUri::parse("failover:(tcp://a:61616,tcp://b:61616)?randomize=false")?;
//! let transport = registry.create(&uri, &Config::default())?;
//! transport.start()?;
//! # Ok(())
//! # }
//! ```
//!
//! Every tunable is read from a `config::Config`; query parameters on a URI
//! override the values it holds.

// Internal-only modules
pub(crate) mod config;
pub(crate) mod error;

pub mod commands;
pub mod transport;
pub mod uri;
pub mod wireformat;

// These are the intended public API
pub use commands::{Command, DataStructure, Response};
pub use error::Error;
pub use transport::{
    FailoverTransport, MockTransport, ResponseCorrelator, TcpTransport, Transport,
    TransportListener, TransportRegistry,
};
pub use uri::BrokerUri;
pub use wireformat::{OpenWireFormat, WireFormatNegotiator};

/// Convenient re-exports of commonly used types.
pub mod prelude {
    pub use crate::commands::{BaseDataStructure, Command, DataStructure, Response, ResponseKind};
    pub use crate::error::Error;
    pub use crate::transport::{
        narrow, FailoverTransport, FutureResponse, InactivityMonitor, MockTransport,
        ResponseCorrelator, TcpTransport, Transport, TransportListener, TransportRegistry,
        UriPool,
    };
    pub use crate::uri::BrokerUri;
    pub use crate::wireformat::{OpenWireFormat, WireFormatNegotiator};
}
