//! Identifiers assigned by the backend.
//!
//! Component and callback ids are integers. Model and computed ids are opaque keys: the
//! backend may send them as strings or integers, and integers are stringified on decode
//! so that `1` and `"1"` address the same model.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Stable identifier of a registered descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(u64);

impl ComponentId {
    /// Creates a new [`ComponentId`] from the raw backend value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw backend value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a backend callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackId(u64);

impl CallbackId {
    /// Creates a new [`CallbackId`].
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw backend value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! key_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new key.
            #[must_use]
            pub fn new(key: impl Into<String>) -> Self {
                Self(key.into())
            }

            /// Returns the key as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Decodes a key from a JSON string or integer.
            #[must_use]
            pub fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::String(key) => Some(Self(key.clone())),
                    Value::Number(number) => Some(Self(number.to_string())),
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(key: &str) -> Self {
                Self::new(key)
            }
        }

        impl From<String> for $name {
            fn from(key: String) -> Self {
                Self(key)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let value = Value::deserialize(deserializer)?;
                Self::from_value(&value).ok_or_else(|| {
                    serde::de::Error::custom(concat!(
                        stringify!($name),
                        " must be a string or an integer"
                    ))
                })
            }
        }
    };
}

key_id!(
    /// Key of a backend-synchronized model value.
    ModelId
);

key_id!(
    /// Key of a backend-computed value family.
    ComputedId
);

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ComponentId, ModelId};

    #[test]
    fn numeric_model_ids_are_stringified() {
        let id: ModelId = serde_json::from_value(json!(7)).unwrap();
        assert_eq!(id, ModelId::new("7"));

        let id: ModelId = serde_json::from_value(json!("m1")).unwrap();
        assert_eq!(id.as_str(), "m1");
    }

    #[test]
    fn model_ids_reject_other_shapes() {
        assert!(serde_json::from_value::<ModelId>(json!(true)).is_err());
    }

    #[test]
    fn component_ids_are_transparent() {
        let id: ComponentId = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(id.get(), 42);
        assert_eq!(serde_json::to_value(id).unwrap(), json!(42));
    }
}
