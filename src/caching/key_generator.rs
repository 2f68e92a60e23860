//! # Cache Key Generator
//!
//! Derives cache keys of the form `<namespace>:<operation>:<sha256-hex>`.
//!
//! Request parameters are first lowered into a [`CanonicalValue`] tree:
//! mappings are ordered by key at every level, sequences keep their order,
//! and every scalar keeps its type. The tree is then written into the
//! hasher as a tagged, length-prefixed byte stream, so `1`, `1.0`, `"1"`
//! and `true` never hash alike and no two distinct trees share an encoding.

use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Default namespace placed in front of every key
pub const DEFAULT_KEY_NAMESPACE: &str = "mongodb_api";

/// Type-preserving normal form of a request parameter tree
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalValue {
    Null,
    Bool(bool),
    Int(i64),
    /// Unsigned integers that do not fit in `i64`
    UInt(u64),
    Float(f64),
    String(String),
    Sequence(Vec<CanonicalValue>),
    Mapping(BTreeMap<String, CanonicalValue>),
}

impl CanonicalValue {
    /// Feed the tagged encoding of this value into a hasher
    fn write_to(&self, hasher: &mut Sha256) {
        match self {
            Self::Null => hasher.update(b"n"),
            Self::Bool(true) => hasher.update(b"t"),
            Self::Bool(false) => hasher.update(b"f"),
            Self::Int(value) => {
                hasher.update(b"i");
                hasher.update(value.to_be_bytes());
            }
            Self::UInt(value) => {
                hasher.update(b"u");
                hasher.update(value.to_be_bytes());
            }
            Self::Float(value) => {
                hasher.update(b"d");
                hasher.update(value.to_bits().to_be_bytes());
            }
            Self::String(value) => write_str(hasher, value),
            Self::Sequence(items) => {
                hasher.update(b"[");
                hasher.update((items.len() as u64).to_be_bytes());
                for item in items {
                    item.write_to(hasher);
                }
            }
            Self::Mapping(entries) => {
                hasher.update(b"{");
                hasher.update((entries.len() as u64).to_be_bytes());
                for (key, value) in entries {
                    write_str(hasher, key);
                    value.write_to(hasher);
                }
            }
        }
    }
}

fn write_str(hasher: &mut Sha256, value: &str) {
    hasher.update(b"s");
    hasher.update((value.len() as u64).to_be_bytes());
    hasher.update(value.as_bytes());
}

impl From<&Value> for CanonicalValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Self::UInt(u)
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => Self::Sequence(items.iter().map(Self::from).collect()),
            Value::Object(map) => Self::Mapping(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for CanonicalValue {
    fn from(value: Value) -> Self {
        Self::from(&value)
    }
}

/// Cache key generator trait
pub trait KeyGenerator: Send + Sync {
    /// Derive the key for an operation over a parameter tree
    fn derive(&self, operation: &str, params: &CanonicalValue) -> String;
}

/// SHA-256 key generator over canonical parameter trees
#[derive(Debug, Clone)]
pub struct CanonicalKeyGenerator {
    namespace: String,
}

impl Default for CanonicalKeyGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_NAMESPACE)
    }
}

impl CanonicalKeyGenerator {
    pub fn new<S: Into<String>>(namespace: S) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Convenience wrapper for JSON parameter trees
    pub fn derive_json(&self, operation: &str, params: &Value) -> String {
        self.derive(operation, &CanonicalValue::from(params))
    }
}

impl KeyGenerator for CanonicalKeyGenerator {
    fn derive(&self, operation: &str, params: &CanonicalValue) -> String {
        let mut hasher = Sha256::new();
        write_str(&mut hasher, operation);
        params.write_to(&mut hasher);
        let hash = hasher.finalize();
        format!("{}:{}:{:x}", self.namespace, operation, hash)
    }
}
