use super::{
    FailoverTransport, InactivityMonitor, MockTransport, ResponseCorrelator, TcpTransport,
    Transport,
};
use crate::config::{get_namespaced_bool_or, with_parameters};
use crate::error::Error;
use crate::uri::BrokerUri;
use crate::wireformat::{OpenWireFormat, WireFormatNegotiator};
use ::config::Config;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Builds the transport stack for one URI scheme.
pub trait TransportFactory: Send + Sync {
    /// Creates the stack for `uri` without a [`ResponseCorrelator`] on top.
    ///
    /// `config` already carries the URI's query parameters. `registry` is
    /// the registry the call came through, for factories that build member
    /// transports of their own.
    fn create_composite(
        &self,
        uri: &BrokerUri,
        config: &Config,
        registry: &TransportRegistry,
    ) -> Result<Arc<dyn Transport>, Error>;
}

/// `tcp://host:port`: [`TcpTransport`] under an [`InactivityMonitor`] under a
/// [`WireFormatNegotiator`]. `transport.useInactivityMonitor=false` leaves
/// the monitor out.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransportFactory;

impl TransportFactory for TcpTransportFactory {
    fn create_composite(
        &self,
        uri: &BrokerUri,
        config: &Config,
        _registry: &TransportRegistry,
    ) -> Result<Arc<dyn Transport>, Error> {
        let wire_format = Arc::new(OpenWireFormat::new(config)?);
        let tcp: Arc<dyn Transport> =
            Arc::new(TcpTransport::new(Some(uri), config, wire_format.clone())?);
        let link: Arc<dyn Transport> = if get_namespaced_bool_or(config, "transport", "useInactivityMonitor", true)? {
            InactivityMonitor::new(tcp, config)?
        } else {
            tcp
        };
        Ok(WireFormatNegotiator::new(link, wire_format))
    }
}

/// `mock://name`: a [`MockTransport`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MockTransportFactory;

impl TransportFactory for MockTransportFactory {
    fn create_composite(
        &self,
        uri: &BrokerUri,
        config: &Config,
        _registry: &TransportRegistry,
    ) -> Result<Arc<dyn Transport>, Error> {
        Ok(Arc::new(MockTransport::from_uri(uri, config)?))
    }
}

/// `failover:(uri,...)`: a [`FailoverTransport`] whose members come from the
/// same registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailoverTransportFactory;

impl TransportFactory for FailoverTransportFactory {
    fn create_composite(
        &self,
        uri: &BrokerUri,
        config: &Config,
        registry: &TransportRegistry,
    ) -> Result<Arc<dyn Transport>, Error> {
        Ok(Arc::new(FailoverTransport::new(uri, config, registry.clone())?))
    }
}

/// Maps URI schemes to transport factories.
///
/// ```
/// use openwire_transport::transport::{Transport, TransportRegistry};
/// use openwire_transport::uri::BrokerUri;
/// use config::Config;
///
/// let registry = TransportRegistry::with_defaults();
/// let uri = BrokerUri::parse("mock://broker").unwrap();
/// let transport = registry.create(&uri, &Config::default()).unwrap();
/// transport.start().unwrap();
/// assert!(transport.is_connected());
/// ```
#[derive(Clone, Default)]
pub struct TransportRegistry {
    factories: HashMap<String, Arc<dyn TransportFactory>>,
}

impl TransportRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Creates a registry with the `tcp`, `mock` and `failover` schemes.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register("tcp", TcpTransportFactory)
            .register("mock", MockTransportFactory)
            .register("failover", FailoverTransportFactory);
        registry
    }

    /// Registers `factory` for `scheme`, replacing any earlier one.
    pub fn register(&mut self, scheme: &str, factory: impl TransportFactory + 'static) -> &mut Self {
        debug!(scheme, "Registering transport factory");
        self.factories
            .insert(scheme.to_ascii_lowercase(), Arc::new(factory));
        self
    }

    pub fn is_registered(&self, scheme: &str) -> bool {
        self.factories.contains_key(&scheme.to_ascii_lowercase())
    }

    /// Creates the full stack for `uri`, topped by a [`ResponseCorrelator`].
    #[instrument(skip(self, config), fields(uri = %uri))]
    pub fn create(&self, uri: &BrokerUri, config: &Config) -> Result<Arc<dyn Transport>, Error> {
        let transport = self.create_composite(uri, config)?;
        Ok(ResponseCorrelator::new(transport))
    }

    /// Creates the stack for `uri` without a correlator.
    pub fn create_composite(
        &self,
        uri: &BrokerUri,
        config: &Config,
    ) -> Result<Arc<dyn Transport>, Error> {
        let factory = self
            .factories
            .get(&uri.scheme().to_ascii_lowercase())
            .ok_or_else(|| Error::UnknownScheme(uri.scheme().to_string()))?;
        // Composite URIs hand their parameters to the outer layer only.
        let config = if uri.is_composite() {
            config.clone()
        } else {
            with_parameters(config, uri.parameters())?
        };
        debug!(uri = %uri, "Creating transport");
        factory.create_composite(uri, &config, self)
    }
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut schemes: Vec<_> = self.factories.keys().collect();
        schemes.sort();
        f.debug_struct("TransportRegistry")
            .field("schemes", &schemes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::narrow;

    #[test]
    fn unknown_scheme_is_rejected() {
        let registry = TransportRegistry::with_defaults();
        let uri = BrokerUri::parse("udp://host:1").unwrap();
        assert!(matches!(
            registry.create(&uri, &Config::default()),
            Err(Error::UnknownScheme(scheme)) if scheme == "udp"
        ));
    }

    #[test]
    fn create_tops_the_stack_with_a_correlator() {
        let registry = TransportRegistry::with_defaults();
        let uri = BrokerUri::parse("mock://m1").unwrap();

        let full = registry.create(&uri, &Config::default()).unwrap();
        assert!(narrow::<ResponseCorrelator>(&full).is_some());
        assert_eq!(narrow::<MockTransport>(&full).unwrap().name(), "m1");

        let bare = registry.create_composite(&uri, &Config::default()).unwrap();
        assert!(narrow::<ResponseCorrelator>(&bare).is_none());
    }

    #[test]
    fn tcp_stack_reads_uri_parameters() {
        let registry = TransportRegistry::with_defaults();
        let uri =
            BrokerUri::parse("tcp://localhost:61617?wireFormat.version=5&tcpNoDelay=false").unwrap();
        let stack = registry.create(&uri, &Config::default()).unwrap();

        let negotiator = narrow::<WireFormatNegotiator>(&stack).unwrap();
        assert_eq!(negotiator.wire_format().preferred_wire_format_info().version, 5);
        let tcp = narrow::<TcpTransport>(&stack).unwrap();
        assert_eq!(tcp.port(), 61617);
        assert!(!tcp.socket_options().tcp_no_delay);
        assert!(narrow::<InactivityMonitor>(&stack).is_some());
    }

    #[test]
    fn inactivity_monitor_can_be_left_out() {
        let registry = TransportRegistry::with_defaults();
        let uri = BrokerUri::parse(
            "tcp://localhost:61617?transport.useInactivityMonitor=false&keepAliveResponseRequired=true",
        )
        .unwrap();
        let stack = registry.create(&uri, &Config::default()).unwrap();
        assert!(narrow::<InactivityMonitor>(&stack).is_none());
        assert!(narrow::<TcpTransport>(&stack).is_some());

        let uri = BrokerUri::parse("tcp://localhost:61617?keepAliveResponseRequired=true").unwrap();
        let stack = registry.create(&uri, &Config::default()).unwrap();
        assert!(narrow::<InactivityMonitor>(&stack)
            .unwrap()
            .is_keep_alive_response_required());
    }

    #[test]
    fn custom_factories_can_be_registered() {
        struct Fixed;

        impl TransportFactory for Fixed {
            fn create_composite(
                &self,
                _uri: &BrokerUri,
                _config: &Config,
                _registry: &TransportRegistry,
            ) -> Result<Arc<dyn Transport>, Error> {
                Ok(Arc::new(MockTransport::new("fixed")))
            }
        }

        let mut registry = TransportRegistry::new();
        registry.register("Custom", Fixed);
        assert!(registry.is_registered("custom"));
        let uri = BrokerUri::parse("custom://anything").unwrap();
        let stack = registry.create_composite(&uri, &Config::default()).unwrap();
        assert_eq!(narrow::<MockTransport>(&stack).unwrap().name(), "fixed");
    }
}
