use super::marshaller::Marshaller;
use super::marshallers;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

const TABLE_SIZE: usize = u8::MAX as usize + 1;

/// Table of marshallers indexed by type tag.
///
/// Built once before the wire format is created and read-only afterwards, so
/// lookups need no locking. Cloning shares the marshallers.
///
/// # Usage
///
/// ```
/// use openwire_transport::wireformat::MarshallerRegistry;
///
/// let registry = MarshallerRegistry::with_defaults();
/// assert!(registry.get(1).is_some()); // WireFormatInfo
/// assert!(registry.get(250).is_none());
/// ```
#[derive(Clone)]
pub struct MarshallerRegistry {
    marshallers: Vec<Option<Arc<dyn Marshaller>>>,
}

impl Default for MarshallerRegistry {
    fn default() -> Self {
        Self {
            marshallers: vec![None; TABLE_SIZE],
        }
    }
}

impl MarshallerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in marshaller.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        marshallers::register_defaults(&mut registry);
        registry
    }

    /// Registers a marshaller under its declared type tag. A later
    /// registration for the same tag replaces the earlier one.
    pub fn add_marshaller<M: Marshaller + 'static>(&mut self, marshaller: M) -> &mut Self {
        let type_code = marshaller.data_structure_type();
        debug!(type_code, "Registering marshaller");
        self.marshallers[usize::from(type_code)] = Some(Arc::new(marshaller));
        self
    }

    pub fn get(&self, type_code: u8) -> Option<&dyn Marshaller> {
        self.marshallers[usize::from(type_code)].as_deref()
    }

    /// Number of registered type tags.
    pub fn len(&self) -> usize {
        self.marshallers.iter().filter(|m| m.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for MarshallerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<usize> = self
            .marshallers
            .iter()
            .enumerate()
            .filter_map(|(code, m)| m.as_ref().map(|_| code))
            .collect();
        f.debug_struct("MarshallerRegistry")
            .field("type_codes", &codes)
            .finish()
    }
}
