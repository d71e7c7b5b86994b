use super::{BaseCommand, PrimitiveMap};

/// The OpenWire handshake command.
///
/// Each side sends one before anything else. Feature flags and limits travel
/// in a [`PrimitiveMap`]; the accessors below read and write the well-known
/// keys, treating a missing key as false or zero.
#[derive(Debug, Clone, PartialEq)]
pub struct WireFormatInfo {
    pub base: BaseCommand,
    pub magic: [u8; 8],
    pub version: i32,
    pub properties: PrimitiveMap,
}

impl Default for WireFormatInfo {
    fn default() -> Self {
        Self {
            base: BaseCommand::default(),
            magic: Self::MAGIC,
            version: 1,
            properties: PrimitiveMap::new(),
        }
    }
}

const STACK_TRACE_ENABLED: &str = "StackTraceEnabled";
const TCP_NO_DELAY_ENABLED: &str = "TcpNoDelayEnabled";
const CACHE_ENABLED: &str = "CacheEnabled";
const CACHE_SIZE: &str = "CacheSize";
const TIGHT_ENCODING_ENABLED: &str = "TightEncodingEnabled";
const SIZE_PREFIX_DISABLED: &str = "SizePrefixDisabled";
const MAX_INACTIVITY_DURATION: &str = "MaxInactivityDuration";
const MAX_INACTIVITY_DURATION_INITIAL_DELAY: &str = "MaxInactivityDurationInitalDelay";

impl WireFormatInfo {
    pub const MAGIC: [u8; 8] = *b"ActiveMQ";
    pub const MAGIC_SIZE: usize = 8;

    pub fn new(version: i32) -> Self {
        Self {
            version,
            ..Default::default()
        }
    }

    /// True when the magic bytes identify an OpenWire peer.
    pub fn is_valid(&self) -> bool {
        self.magic == Self::MAGIC
    }

    pub fn is_stack_trace_enabled(&self) -> bool {
        self.properties.get_bool(STACK_TRACE_ENABLED).unwrap_or(false)
    }

    pub fn set_stack_trace_enabled(&mut self, enabled: bool) {
        self.properties.set_bool(STACK_TRACE_ENABLED, enabled);
    }

    pub fn is_tcp_no_delay_enabled(&self) -> bool {
        self.properties.get_bool(TCP_NO_DELAY_ENABLED).unwrap_or(false)
    }

    pub fn set_tcp_no_delay_enabled(&mut self, enabled: bool) {
        self.properties.set_bool(TCP_NO_DELAY_ENABLED, enabled);
    }

    pub fn is_cache_enabled(&self) -> bool {
        self.properties.get_bool(CACHE_ENABLED).unwrap_or(false)
    }

    pub fn set_cache_enabled(&mut self, enabled: bool) {
        self.properties.set_bool(CACHE_ENABLED, enabled);
    }

    pub fn cache_size(&self) -> i32 {
        self.int_property(CACHE_SIZE)
    }

    pub fn set_cache_size(&mut self, size: i32) {
        self.properties.set_int(CACHE_SIZE, size);
    }

    pub fn is_tight_encoding_enabled(&self) -> bool {
        self.properties.get_bool(TIGHT_ENCODING_ENABLED).unwrap_or(false)
    }

    pub fn set_tight_encoding_enabled(&mut self, enabled: bool) {
        self.properties.set_bool(TIGHT_ENCODING_ENABLED, enabled);
    }

    pub fn is_size_prefix_disabled(&self) -> bool {
        self.properties.get_bool(SIZE_PREFIX_DISABLED).unwrap_or(false)
    }

    pub fn set_size_prefix_disabled(&mut self, disabled: bool) {
        self.properties.set_bool(SIZE_PREFIX_DISABLED, disabled);
    }

    /// Milliseconds; zero disables inactivity monitoring.
    pub fn max_inactivity_duration(&self) -> i64 {
        self.properties.get_i64(MAX_INACTIVITY_DURATION).unwrap_or(0)
    }

    pub fn set_max_inactivity_duration(&mut self, millis: i64) {
        self.properties.set_long(MAX_INACTIVITY_DURATION, millis);
    }

    pub fn max_inactivity_duration_initial_delay(&self) -> i64 {
        self.properties
            .get_i64(MAX_INACTIVITY_DURATION_INITIAL_DELAY)
            .unwrap_or(0)
    }

    pub fn set_max_inactivity_duration_initial_delay(&mut self, millis: i64) {
        self.properties
            .set_long(MAX_INACTIVITY_DURATION_INITIAL_DELAY, millis);
    }

    fn int_property(&self, key: &str) -> i32 {
        self.properties
            .get_i64(key)
            .and_then(|v| i32::try_from(v).ok())
            .unwrap_or(0)
    }
}
