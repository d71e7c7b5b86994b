use std::collections::btree_map;
use std::collections::BTreeMap;

/// A loosely typed value stored in a [`PrimitiveMap`].
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveValue {
    Null,
    Boolean(bool),
    Byte(i8),
    /// A UTF-16 code unit.
    Char(u16),
    Short(i16),
    Integer(i32),
    Long(i64),
    Double(f64),
    Float(f32),
    String(String),
    ByteArray(Vec<u8>),
    Map(PrimitiveMap),
    List(Vec<PrimitiveValue>),
}

impl PrimitiveValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PrimitiveValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Widens any integral value to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PrimitiveValue::Byte(v) => Some(i64::from(*v)),
            PrimitiveValue::Short(v) => Some(i64::from(*v)),
            PrimitiveValue::Integer(v) => Some(i64::from(*v)),
            PrimitiveValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PrimitiveValue::String(v) => Some(v),
            _ => None,
        }
    }
}

/// String-keyed map of primitive values, kept in key order so two maps with
/// the same entries always marshal to the same bytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrimitiveMap {
    entries: BTreeMap<String, PrimitiveValue>,
}

impl PrimitiveMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&PrimitiveValue> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: PrimitiveValue) -> Option<PrimitiveValue> {
        self.entries.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<PrimitiveValue> {
        self.entries.remove(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(PrimitiveValue::as_bool)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(PrimitiveValue::as_i64)
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.insert(key, PrimitiveValue::Boolean(value));
    }

    pub fn set_int(&mut self, key: &str, value: i32) {
        self.insert(key, PrimitiveValue::Integer(value));
    }

    pub fn set_long(&mut self, key: &str, value: i64) {
        self.insert(key, PrimitiveValue::Long(value));
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, PrimitiveValue> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a PrimitiveMap {
    type Item = (&'a String, &'a PrimitiveValue);
    type IntoIter = btree_map::Iter<'a, String, PrimitiveValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<(String, PrimitiveValue)> for PrimitiveMap {
    fn from_iter<I: IntoIterator<Item = (String, PrimitiveValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
