//! Keyboard shortcuts registered by the backend.

use core::fmt;
use core::str::FromStr;
use std::collections::HashMap;

use aqueduct_core::CallbackId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

const MODIFIERS: [&str; 4] = ["alt", "ctrl", "meta", "shift"];

/// A normalised key combination such as `ctrl+shift+k`.
///
/// Parsing lower-cases every part, maps common aliases (`control`, `cmd`, `option`, ...)
/// to their canonical modifier, and orders modifiers `alt`, `ctrl`, `meta`, `shift`
/// before the key, so `Shift+Ctrl+K` and `ctrl+shift+k` are the same combo.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyCombo(String);

impl KeyCombo {
    /// Returns the normalised text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A key combination that names no key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("key combination `{0}` has no key")]
pub struct InvalidCombo(String);

impl FromStr for KeyCombo {
    type Err = InvalidCombo;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut modifiers = [false; MODIFIERS.len()];
        let mut key = None;
        for part in raw.split('+').map(str::trim).filter(|part| !part.is_empty()) {
            let part = part.to_lowercase();
            let canonical = match part.as_str() {
                "alt" | "option" | "opt" => Some(0),
                "ctrl" | "control" => Some(1),
                "meta" | "cmd" | "command" | "super" | "win" => Some(2),
                "shift" => Some(3),
                _ => None,
            };
            match canonical {
                Some(index) => modifiers[index] = true,
                None => key = Some(part),
            }
        }
        let key = key.ok_or_else(|| InvalidCombo(raw.to_owned()))?;

        let mut parts: Vec<&str> = MODIFIERS
            .iter()
            .zip(modifiers)
            .filter_map(|(name, set)| set.then_some(*name))
            .collect();
        parts.push(&key);
        Ok(Self(parts.join("+")))
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for KeyCombo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for KeyCombo {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Registered shortcuts.
#[derive(Debug, Default)]
pub struct Shortcuts {
    bindings: HashMap<KeyCombo, CallbackId>,
}

impl Shortcuts {
    /// Binds `combo` to `callback`, replacing any previous binding.
    pub fn register(&mut self, combo: KeyCombo, callback: CallbackId) {
        debug!(%combo, %callback, "shortcut registered");
        if let Some(previous) = self.bindings.insert(combo, callback) {
            debug!(%previous, "replaced previous shortcut binding");
        }
    }

    /// Returns the callback bound to `combo`.
    #[must_use]
    pub fn get(&self, combo: &KeyCombo) -> Option<CallbackId> {
        self.bindings.get(combo).copied()
    }

    /// Number of bound combos.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns `true` when nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
