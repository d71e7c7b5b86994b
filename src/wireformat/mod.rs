//! The OpenWire wire format.
//!
//! [`OpenWireFormat`] frames data structures onto a byte stream using the
//! loose encoding: an `i32` size prefix, the type tag and the payload written
//! by the marshaller registered for that tag. It also holds the state agreed
//! in the `WireFormatInfo` handshake, which [`WireFormatNegotiator`] drives.

mod data_stream;
mod marshaller;
mod marshallers;
mod negotiator;
mod primitive_types;
mod registry;

pub use data_stream::{DataInput, DataOutput, MAX_NESTING_DEPTH};
pub use marshaller::Marshaller;
pub use negotiator::WireFormatNegotiator;
pub use primitive_types::{marshal_map, unmarshal_map};
pub use registry::MarshallerRegistry;

use crate::commands::{type_codes, Command, DataStructure, WireFormatInfo};
use crate::config::{get_namespaced_bool_or, get_namespaced_i64_or, get_namespaced_usize_or};
use crate::error::Error;
use ::config::Config;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Version used until the handshake completes.
pub const DEFAULT_VERSION: i32 = 1;

/// Highest version the built-in marshallers understand.
pub const MAX_SUPPORTED_VERSION: i32 = 9;

const CONFIG_NAMESPACE: &str = "wireFormat";
const SIZE_PREFIX_LEN: usize = 4;

/// Frame encoder/decoder and negotiated protocol state for one connection.
///
/// Shared between the reader thread and senders; the negotiated values are
/// atomics so renegotiation can happen while frames are in flight.
///
/// # Configuration Keys
///
/// All keys are looked up as `wireFormat.{key}` and then `{key}`.
///
/// - `version`: preferred version (default 9)
/// - `stackTraceEnabled`, `tcpNoDelayEnabled`: advertised features (default true)
/// - `cacheSize`, `maxInactivityDuration`, `maxInactivityDurationInitalDelay`:
///   advertised limits
/// - `maxFrameSize`: largest accepted inbound frame (default 100 MiB)
/// - `negotiateTimeout`: ms a send waits for the handshake (default 15000)
#[derive(Debug)]
pub struct OpenWireFormat {
    registry: MarshallerRegistry,
    preferred: WireFormatInfo,
    max_frame_size: usize,
    negotiate_timeout: Duration,
    version: AtomicI32,
    stack_trace_enabled: AtomicBool,
    tcp_no_delay_enabled: AtomicBool,
    cache_size: AtomicI32,
    max_inactivity_duration: AtomicI64,
    max_inactivity_duration_initial_delay: AtomicI64,
}

impl OpenWireFormat {
    /// Creates a wire format with every built-in marshaller.
    pub fn new(config: &Config) -> Result<Self, Error> {
        Self::with_registry(config, MarshallerRegistry::with_defaults())
    }

    pub fn with_registry(config: &Config, registry: MarshallerRegistry) -> Result<Self, Error> {
        let ns = CONFIG_NAMESPACE;
        let version = get_namespaced_i64_or(config, ns, "version", MAX_SUPPORTED_VERSION.into())?;
        let version = i32::try_from(version)
            .ok()
            .filter(|v| (DEFAULT_VERSION..=MAX_SUPPORTED_VERSION).contains(v))
            .ok_or_else(|| Error::InvalidParameter {
                key: "version".into(),
                value: version.to_string(),
            })?;

        for key in ["cacheEnabled", "tightEncodingEnabled", "sizePrefixDisabled"] {
            if get_namespaced_bool_or(config, ns, key, false)? {
                warn!(key, "Wire format feature not supported, advertising false");
            }
        }

        let mut preferred = WireFormatInfo::new(version);
        preferred.set_stack_trace_enabled(get_namespaced_bool_or(
            config,
            ns,
            "stackTraceEnabled",
            true,
        )?);
        preferred.set_tcp_no_delay_enabled(get_namespaced_bool_or(
            config,
            ns,
            "tcpNoDelayEnabled",
            true,
        )?);
        preferred.set_cache_enabled(false);
        preferred.set_cache_size(int_parameter(config, "cacheSize", 1024)?);
        preferred.set_tight_encoding_enabled(false);
        preferred.set_size_prefix_disabled(false);
        preferred.set_max_inactivity_duration(get_namespaced_i64_or(
            config,
            ns,
            "maxInactivityDuration",
            30_000,
        )?);
        preferred.set_max_inactivity_duration_initial_delay(get_namespaced_i64_or(
            config,
            ns,
            "maxInactivityDurationInitalDelay",
            10_000,
        )?);

        let max_frame_size = get_namespaced_usize_or(config, ns, "maxFrameSize", 100 * 1024 * 1024)?;
        let negotiate_timeout = get_namespaced_usize_or(config, ns, "negotiateTimeout", 15_000)?;

        Ok(Self {
            registry,
            max_frame_size,
            negotiate_timeout: Duration::from_millis(negotiate_timeout as u64),
            version: AtomicI32::new(DEFAULT_VERSION),
            stack_trace_enabled: AtomicBool::new(preferred.is_stack_trace_enabled()),
            tcp_no_delay_enabled: AtomicBool::new(preferred.is_tcp_no_delay_enabled()),
            cache_size: AtomicI32::new(preferred.cache_size()),
            max_inactivity_duration: AtomicI64::new(preferred.max_inactivity_duration()),
            max_inactivity_duration_initial_delay: AtomicI64::new(
                preferred.max_inactivity_duration_initial_delay(),
            ),
            preferred,
        })
    }

    // ============================================================================
    // Negotiated State
    // ============================================================================

    pub fn version(&self) -> i32 {
        self.version.load(Ordering::Acquire)
    }

    /// Switches the field layout used by the marshallers.
    pub fn set_version(&self, version: i32) -> Result<(), Error> {
        if !(DEFAULT_VERSION..=MAX_SUPPORTED_VERSION).contains(&version) {
            return Err(Error::UnsupportedVersion {
                requested: version,
                max: MAX_SUPPORTED_VERSION,
            });
        }
        self.version.store(version, Ordering::Release);
        Ok(())
    }

    pub fn is_stack_trace_enabled(&self) -> bool {
        self.stack_trace_enabled.load(Ordering::Acquire)
    }

    pub fn set_stack_trace_enabled(&self, enabled: bool) {
        self.stack_trace_enabled.store(enabled, Ordering::Release);
    }

    pub fn is_tcp_no_delay_enabled(&self) -> bool {
        self.tcp_no_delay_enabled.load(Ordering::Acquire)
    }

    pub fn cache_size(&self) -> i32 {
        self.cache_size.load(Ordering::Acquire)
    }

    pub fn max_inactivity_duration(&self) -> i64 {
        self.max_inactivity_duration.load(Ordering::Acquire)
    }

    pub fn max_inactivity_duration_initial_delay(&self) -> i64 {
        self.max_inactivity_duration_initial_delay
            .load(Ordering::Acquire)
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// How long a send waits for the handshake before failing.
    pub fn negotiate_timeout(&self) -> Duration {
        self.negotiate_timeout
    }

    /// The handshake this side sends on connect.
    pub fn preferred_wire_format_info(&self) -> &WireFormatInfo {
        &self.preferred
    }

    pub fn registry(&self) -> &MarshallerRegistry {
        &self.registry
    }

    /// Applies the peer's handshake: the lower version wins, features are
    /// enabled only when both sides enable them, limits take the minimum.
    pub fn renegotiate(&self, remote: &WireFormatInfo) -> Result<(), Error> {
        if !remote.is_valid() {
            return Err(Error::InvalidMagic);
        }
        let local = &self.preferred;
        let version = local.version.min(remote.version);
        self.set_version(version)?;
        self.set_stack_trace_enabled(
            local.is_stack_trace_enabled() && remote.is_stack_trace_enabled(),
        );
        self.tcp_no_delay_enabled.store(
            local.is_tcp_no_delay_enabled() && remote.is_tcp_no_delay_enabled(),
            Ordering::Release,
        );
        self.cache_size
            .store(local.cache_size().min(remote.cache_size()), Ordering::Release);
        self.max_inactivity_duration.store(
            local
                .max_inactivity_duration()
                .min(remote.max_inactivity_duration()),
            Ordering::Release,
        );
        self.max_inactivity_duration_initial_delay.store(
            local
                .max_inactivity_duration_initial_delay()
                .min(remote.max_inactivity_duration_initial_delay()),
            Ordering::Release,
        );
        debug!(
            version,
            stack_trace = self.is_stack_trace_enabled(),
            "Wire format negotiated"
        );
        Ok(())
    }

    // ============================================================================
    // Framing
    // ============================================================================

    /// Writes one frame. `None` writes the null frame.
    pub fn marshal<W: Write + ?Sized>(
        &self,
        data: Option<&DataStructure>,
        writer: &mut W,
    ) -> Result<(), Error> {
        let mut out = DataOutput::with_capacity(256);
        out.write_i32(0);
        match data {
            Some(data) => self.marshal_by_type(data, &mut out)?,
            None => out.write_u8(type_codes::NULL),
        }
        let size = i32::try_from(out.len() - SIZE_PREFIX_LEN).map_err(|_| Error::FrameTooLarge {
            size: out.len() - SIZE_PREFIX_LEN,
            max: i32::MAX as usize,
        })?;
        out.patch_i32(0, size);
        writer.write_all(out.as_slice())?;
        Ok(())
    }

    /// Reads one frame. Returns `None` for the null frame.
    ///
    /// The whole frame is read before decoding; bytes the marshaller leaves
    /// unread, such as fields from a newer peer, are discarded with it.
    pub fn unmarshal<R: Read + ?Sized>(&self, reader: &mut R) -> Result<Option<DataStructure>, Error> {
        let mut size_buf = [0u8; SIZE_PREFIX_LEN];
        reader.read_exact(&mut size_buf)?;
        let size = i32::from_be_bytes(size_buf);
        let size = usize::try_from(size)
            .ok()
            .filter(|s| *s > 0)
            .ok_or_else(|| Error::malformed(format!("invalid frame size {size}")))?;
        if size > self.max_frame_size {
            return Err(Error::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }

        let mut frame = vec![0u8; size];
        reader.read_exact(&mut frame)?;
        let mut input = DataInput::new(&frame);
        let type_code = input.read_u8()?;
        if type_code == type_codes::NULL {
            return Ok(None);
        }
        let data = self.unmarshal_by_type(type_code, &mut input)?;
        if input.remaining() > 0 {
            debug!(
                type_code,
                skipped = input.remaining(),
                "Skipping unread frame bytes"
            );
        }
        Ok(Some(data))
    }

    /// Reads one frame that must hold a command.
    pub fn unmarshal_command<R: Read + ?Sized>(&self, reader: &mut R) -> Result<Command, Error> {
        match self.unmarshal(reader)? {
            Some(data) => data.into_command().ok_or_else(|| {
                Error::malformed("unmarshalled a structure that is not a command")
            }),
            None => Err(Error::malformed("failed to unmarshal an object")),
        }
    }

    pub(crate) fn marshal_by_type(&self, data: &DataStructure, out: &mut DataOutput) -> Result<(), Error> {
        let type_code = data.data_structure_type();
        let marshaller = self
            .registry
            .get(type_code)
            .ok_or(Error::UnknownDataType(type_code))?;
        out.write_u8(type_code);
        marshaller.loose_marshal(self, data, out)
    }

    pub(crate) fn unmarshal_by_type(
        &self,
        type_code: u8,
        input: &mut DataInput<'_>,
    ) -> Result<DataStructure, Error> {
        let marshaller = self
            .registry
            .get(type_code)
            .ok_or(Error::UnknownDataType(type_code))?;
        marshaller.loose_unmarshal(self, input)
    }
}

fn int_parameter(config: &Config, key: &str, default: i32) -> Result<i32, Error> {
    let value = get_namespaced_i64_or(config, CONFIG_NAMESPACE, key, default.into())?;
    i32::try_from(value).map_err(|_| Error::InvalidParameter {
        key: key.to_string(),
        value: value.to_string(),
    })
}
