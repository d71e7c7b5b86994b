//! TCP transport.
//!
//! Connects a blocking [`TcpStream`] on `start` and binds its two halves to an
//! [`IoTransport`], optionally buffered and traced.

use super::{lock, IoTransport, Transport, TransportListener};
use crate::commands::Command;
use crate::config::{
    get_namespaced_bool_or, get_namespaced_string, get_namespaced_usize_or, with_parameters,
};
use crate::error::Error;
use crate::uri::BrokerUri;
use crate::wireformat::OpenWireFormat;
use ::config::Config;
use std::any::TypeId;
use std::fmt;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, instrument, trace, warn};

const CONFIG_NAMESPACE: &str = "transport";
const DEFAULT_PORT: u16 = 61616;
const DEFAULT_BUFFER_SIZE: usize = 8192;

// ============================================================================
// Socket Factory
// ============================================================================

/// Socket settings read from the `transport` configuration namespace.
#[derive(Debug, Clone)]
pub struct SocketOptions {
    pub tcp_no_delay: bool,
    /// `None` leaves the connect timeout to the operating system.
    pub connect_timeout: Option<Duration>,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            tcp_no_delay: true,
            connect_timeout: None,
        }
    }
}

/// Creates connected sockets for [`TcpTransport`].
pub trait SocketFactory: Send + Sync {
    fn create_socket(&self, host: &str, port: u16, options: &SocketOptions)
        -> Result<TcpStream, Error>;
}

/// Resolves the host and connects to the first address that accepts.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSocketFactory;

impl SocketFactory for DefaultSocketFactory {
    fn create_socket(
        &self,
        host: &str,
        port: u16,
        options: &SocketOptions,
    ) -> Result<TcpStream, Error> {
        let mut last_error = None;
        for addr in (host, port).to_socket_addrs()? {
            let attempt = match options.connect_timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    stream.set_nodelay(options.tcp_no_delay)?;
                    return Ok(stream);
                }
                Err(err) => {
                    debug!(%addr, %err, "Connect attempt failed");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no addresses found for {host}:{port}"),
                )
            })
            .into())
    }
}

// ============================================================================
// TcpTransport
// ============================================================================

/// Transport over one TCP connection to a broker.
///
/// # Configuration Keys
///
/// Looked up as `transport.{key}` and then `{key}`; URI query parameters
/// override both.
///
/// - `uri`: broker address, used when the transport is built without a URI
/// - `tcpNoDelay`: disable Nagle's algorithm (default true)
/// - `connectTimeout`: connect timeout in ms, 0 for the OS default
/// - `inputBufferSize`, `outputBufferSize`: stream buffers (default 8192)
/// - `tcpTracingEnabled`: log every chunk read or written at trace level
pub struct TcpTransport {
    io: Arc<IoTransport>,
    host: String,
    port: u16,
    options: SocketOptions,
    input_buffer_size: usize,
    output_buffer_size: usize,
    tracing_enabled: bool,
    socket_factory: Arc<dyn SocketFactory>,
    socket: Mutex<Option<TcpStream>>,
    // Serializes `start` without blocking `close` during a connect.
    connecting: Mutex<()>,
}

impl TcpTransport {
    /// Creates an unconnected transport for `uri`, or for the configured
    /// `transport.uri` when `uri` is `None`.
    pub fn new(
        uri: Option<&BrokerUri>,
        config: &Config,
        wire_format: Arc<OpenWireFormat>,
    ) -> Result<Self, Error> {
        Self::with_socket_factory(uri, config, wire_format, Arc::new(DefaultSocketFactory))
    }

    pub fn with_socket_factory(
        uri: Option<&BrokerUri>,
        config: &Config,
        wire_format: Arc<OpenWireFormat>,
        socket_factory: Arc<dyn SocketFactory>,
    ) -> Result<Self, Error> {
        let ns = CONFIG_NAMESPACE;
        let configured;
        let uri = match uri {
            Some(uri) => uri,
            None => {
                let text = get_namespaced_string(config, ns, "uri")?
                    .ok_or_else(|| Error::MissingParameter(format!("{ns}.uri")))?;
                configured = BrokerUri::parse(&text)?;
                &configured
            }
        };
        let host = uri
            .host()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| Error::InvalidUri {
                uri: uri.to_string(),
                reason: "missing host".into(),
            })?
            .to_string();
        let port = uri.port().unwrap_or(DEFAULT_PORT);
        let overlaid = with_parameters(config, uri.parameters())?;
        let config = &overlaid;

        let connect_timeout = get_namespaced_usize_or(config, ns, "connectTimeout", 0)?;
        let options = SocketOptions {
            tcp_no_delay: get_namespaced_bool_or(config, ns, "tcpNoDelay", true)?,
            connect_timeout: (connect_timeout > 0)
                .then(|| Duration::from_millis(connect_timeout as u64)),
        };

        Ok(Self {
            io: Arc::new(IoTransport::new(wire_format)),
            host,
            port,
            options,
            input_buffer_size: get_namespaced_usize_or(
                config,
                ns,
                "inputBufferSize",
                DEFAULT_BUFFER_SIZE,
            )?,
            output_buffer_size: get_namespaced_usize_or(
                config,
                ns,
                "outputBufferSize",
                DEFAULT_BUFFER_SIZE,
            )?,
            tracing_enabled: get_namespaced_bool_or(config, ns, "tcpTracingEnabled", false)?,
            socket_factory,
            socket: Mutex::new(None),
            connecting: Mutex::new(()),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn socket_options(&self) -> &SocketOptions {
        &self.options
    }

    pub fn is_tracing_enabled(&self) -> bool {
        self.tracing_enabled
    }

    pub fn local_address(&self) -> Option<SocketAddr> {
        lock(&self.socket).as_ref()?.local_addr().ok()
    }

    fn bind_streams(&self, stream: &TcpStream) -> Result<(), Error> {
        let reader = BufReader::with_capacity(self.input_buffer_size, stream.try_clone()?);
        let writer = BufWriter::with_capacity(self.output_buffer_size, stream.try_clone()?);
        if self.tracing_enabled {
            self.io.set_input_stream(TracingStream::new(reader, "read"));
            self.io.set_output_stream(TracingStream::new(writer, "write"));
        } else {
            self.io.set_input_stream(reader);
            self.io.set_output_stream(writer);
        }
        Ok(())
    }
}

impl Transport for TcpTransport {
    #[instrument(skip(self), fields(host = %self.host, port = self.port))]
    fn start(&self) -> Result<(), Error> {
        let _connecting = lock(&self.connecting);
        if self.io.is_closed() {
            return Err(Error::Closed);
        }
        if lock(&self.socket).is_some() {
            return Ok(());
        }

        let stream = self
            .socket_factory
            .create_socket(&self.host, self.port, &self.options)?;
        let local_addr = stream.local_addr()?;
        let peer_addr = stream.peer_addr()?;
        self.bind_streams(&stream)?;
        {
            let mut socket = lock(&self.socket);
            if self.io.is_closed() {
                let _ = stream.shutdown(Shutdown::Both);
                return Err(Error::Closed);
            }
            *socket = Some(stream);
        }

        if let Err(err) = self.io.start() {
            if let Some(stream) = lock(&self.socket).take() {
                let _ = stream.shutdown(Shutdown::Both);
            }
            return Err(err);
        }
        info!(%local_addr, %peer_addr, "Connected to broker");
        Ok(())
    }

    fn stop(&self) -> Result<(), Error> {
        self.close()
    }

    // The socket is shut down before the I/O transport closes so that the
    // reader thread's blocking read returns.
    #[instrument(skip(self), fields(host = %self.host, port = self.port))]
    fn close(&self) -> Result<(), Error> {
        if let Some(stream) = lock(&self.socket).take() {
            match stream.shutdown(Shutdown::Both) {
                Ok(()) => info!("Closed connection"),
                Err(err) => warn!(%err, "Error shutting down connection"),
            }
        }
        self.io.close()
    }

    fn oneway(&self, command: Command) -> Result<(), Error> {
        self.io.oneway(command)
    }

    fn set_transport_listener(&self, listener: Option<Arc<dyn TransportListener>>) {
        self.io.set_transport_listener(listener);
    }

    fn transport_listener(&self) -> Option<Arc<dyn TransportListener>> {
        self.io.transport_listener()
    }

    fn is_connected(&self) -> bool {
        lock(&self.socket).is_some() && self.io.is_connected()
    }

    fn is_closed(&self) -> bool {
        self.io.is_closed()
    }

    fn remote_address(&self) -> Option<String> {
        Some(format!("tcp://{}:{}", self.host, self.port))
    }

    fn narrow(self: Arc<Self>, type_id: TypeId) -> Option<Arc<dyn Transport>> {
        if type_id == TypeId::of::<Self>() {
            return Some(self);
        }
        self.io.clone().narrow(type_id)
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpTransport")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("options", &self.options)
            .field("tracing_enabled", &self.tracing_enabled)
            .finish()
    }
}

// ============================================================================
// Wire Tracing
// ============================================================================

/// Logs every chunk passing through the wrapped stream.
struct TracingStream<S> {
    inner: S,
    direction: &'static str,
}

impl<S> TracingStream<S> {
    fn new(inner: S, direction: &'static str) -> Self {
        Self { inner, direction }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" ")
}

impl<S: Read> Read for TracingStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        trace!(direction = self.direction, len = n, bytes = %hex(&buf[..n]), "tcp");
        Ok(n)
    }
}

impl<S: Write> Write for TracingStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        trace!(direction = self.direction, len = n, bytes = %hex(&buf[..n]), "tcp");
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire_format() -> Arc<OpenWireFormat> {
        Arc::new(OpenWireFormat::new(&Config::default()).unwrap())
    }

    fn config(pairs: &[(&str, &str)]) -> Config {
        pairs
            .iter()
            .fold(Config::builder(), |builder, (key, value)| {
                builder.set_override(*key, *value).unwrap()
            })
            .build()
            .unwrap()
    }

    #[test]
    fn address_comes_from_uri() {
        let uri = BrokerUri::parse("tcp://broker.example:61617").unwrap();
        let transport = TcpTransport::new(Some(&uri), &Config::default(), wire_format()).unwrap();
        assert_eq!(transport.host(), "broker.example");
        assert_eq!(transport.port(), 61617);
        assert!(transport.socket_options().tcp_no_delay);
        assert!(!transport.is_connected());
    }

    #[test]
    fn address_falls_back_to_configured_uri() {
        let config = config(&[("transport.uri", "tcp://configured:1234")]);
        let transport = TcpTransport::new(None, &config, wire_format()).unwrap();
        assert_eq!(transport.host(), "configured");
        assert_eq!(transport.port(), 1234);
    }

    #[test]
    fn missing_address_is_a_configuration_error() {
        let err = TcpTransport::new(None, &Config::default(), wire_format()).unwrap_err();
        assert!(matches!(err, Error::MissingParameter(_)));
    }

    #[test]
    fn settings_are_read_from_config() {
        let config = config(&[
            ("transport.tcpNoDelay", "false"),
            ("connectTimeout", "250"),
            ("tcpTracingEnabled", "true"),
        ]);
        let uri = BrokerUri::parse("tcp://localhost").unwrap();
        let transport = TcpTransport::new(Some(&uri), &config, wire_format()).unwrap();
        assert_eq!(transport.port(), DEFAULT_PORT);
        assert!(!transport.socket_options().tcp_no_delay);
        assert_eq!(
            transport.socket_options().connect_timeout,
            Some(Duration::from_millis(250))
        );
        assert!(transport.is_tracing_enabled());
    }

    // Blocks every connect until the test lets it fail.
    struct StalledFactory {
        release: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl SocketFactory for StalledFactory {
        fn create_socket(
            &self,
            _host: &str,
            _port: u16,
            _options: &SocketOptions,
        ) -> Result<TcpStream, Error> {
            let _ = lock(&self.release).recv();
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused").into())
        }
    }

    #[test]
    fn close_does_not_wait_for_a_pending_connect() {
        let (release, stalled) = std::sync::mpsc::channel();
        let factory = Arc::new(StalledFactory {
            release: Mutex::new(stalled),
        });
        let uri = BrokerUri::parse("tcp://localhost:1").unwrap();
        let transport = Arc::new(
            TcpTransport::with_socket_factory(
                Some(&uri),
                &Config::default(),
                wire_format(),
                factory,
            )
            .unwrap(),
        );

        let starter = {
            let transport = transport.clone();
            std::thread::spawn(move || transport.start())
        };
        std::thread::sleep(Duration::from_millis(50));

        let (closed_tx, closed_rx) = std::sync::mpsc::channel();
        {
            let transport = transport.clone();
            std::thread::spawn(move || closed_tx.send(transport.close()).unwrap());
        }
        let closed = closed_rx.recv_timeout(Duration::from_secs(2));
        release.send(()).unwrap();
        assert!(matches!(closed, Ok(Ok(()))), "close blocked behind connect");

        assert!(starter.join().unwrap().is_err());
        assert!(transport.is_closed());
        assert!(transport.local_address().is_none());
        assert!(matches!(transport.start(), Err(Error::Closed)));
    }

    #[test]
    fn tracing_stream_passes_bytes_through() {
        let mut out = TracingStream::new(Vec::new(), "write");
        out.write_all(&[1, 2, 3]).unwrap();
        assert_eq!(out.inner, vec![1, 2, 3]);
        assert_eq!(hex(&[0x0a, 0xff]), "0a ff");
    }
}
