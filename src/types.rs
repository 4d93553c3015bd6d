//! Core types for the state store.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Snapshot of the shared record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    /// Set once the initial delay has elapsed; dependent visuals may activate.
    pub ready: bool,
    /// Index into the host's flavor catalog.
    pub current_flavor: i64,
}

impl State {
    /// Get the value of a single field.
    pub fn get(&self, field: Field) -> FieldValue {
        match field {
            Field::Ready => FieldValue::Ready(self.ready),
            Field::CurrentFlavor => FieldValue::CurrentFlavor(self.current_flavor),
        }
    }

    /// Parse a snapshot from JSON.
    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    /// Encode as JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Observable fields of [`State`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Ready,
    CurrentFlavor,
}

impl Field {
    pub const ALL: [Field; 2] = [Field::Ready, Field::CurrentFlavor];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Ready => "ready",
            Field::CurrentFlavor => "currentFlavor",
        }
    }

    pub(crate) fn slot(self) -> usize {
        match self {
            Field::Ready => 0,
            Field::CurrentFlavor => 1,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ready" => Ok(Field::Ready),
            "currentFlavor" | "current_flavor" => Ok(Field::CurrentFlavor),
            other => Err(StoreError::UnknownField(other.to_string())),
        }
    }
}

/// New value of a field, as passed to subscribers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum FieldValue {
    Ready(bool),
    CurrentFlavor(i64),
}

impl FieldValue {
    pub fn field(&self) -> Field {
        match self {
            FieldValue::Ready(_) => Field::Ready,
            FieldValue::CurrentFlavor(_) => Field::CurrentFlavor,
        }
    }

    pub fn as_ready(&self) -> Option<bool> {
        match *self {
            FieldValue::Ready(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_current_flavor(&self) -> Option<i64> {
        match *self {
            FieldValue::CurrentFlavor(v) => Some(v),
            _ => None,
        }
    }
}

/// Partial update applied atomically by `Store::apply`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    pub ready: Option<bool>,
    pub current_flavor: Option<i64>,
}

impl StateUpdate {
    pub fn ready(value: bool) -> Self {
        Self {
            ready: Some(value),
            ..Default::default()
        }
    }

    pub fn current_flavor(value: i64) -> Self {
        Self {
            current_flavor: Some(value),
            ..Default::default()
        }
    }

    pub fn with_ready(mut self, value: bool) -> Self {
        self.ready = Some(value);
        self
    }

    pub fn with_current_flavor(mut self, value: i64) -> Self {
        self.current_flavor = Some(value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ready.is_none() && self.current_flavor.is_none()
    }
}

/// Catalog size as a signed bound for flavor arithmetic.
pub(crate) fn catalog_len(count: usize) -> Result<i64> {
    i64::try_from(count).map_err(|_| {
        StoreError::InvalidConfig(format!("flavor_count {} exceeds i64::MAX", count))
    })
}

/// What to do with a flavor index outside `0..flavor_count`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlavorPolicy {
    /// Store any integer as-is.
    #[default]
    Unchecked,
    /// Clamp into `0..=flavor_count - 1`.
    Clamp,
    /// Wrap around with euclidean remainder, like the carousel does.
    Wrap,
    /// Refuse the write with `StoreError::FlavorOutOfRange`.
    Reject,
}

impl FlavorPolicy {
    /// Map a requested flavor onto the value to store.
    ///
    /// Without a catalog size every policy behaves like `Unchecked`.
    pub fn resolve(self, value: i64, flavor_count: Option<usize>) -> Result<i64> {
        let count = match (self, flavor_count) {
            (FlavorPolicy::Unchecked, _) | (_, None) => return Ok(value),
            (_, Some(0)) => return Err(StoreError::NoFlavorCatalog),
            (_, Some(count)) => count,
        };
        let max = catalog_len(count)?;

        match self {
            FlavorPolicy::Unchecked => Ok(value),
            FlavorPolicy::Clamp => Ok(value.clamp(0, max - 1)),
            FlavorPolicy::Wrap => Ok(value.rem_euclid(max)),
            FlavorPolicy::Reject => {
                if (0..max).contains(&value) {
                    Ok(value)
                } else {
                    Err(StoreError::FlavorOutOfRange { value, count })
                }
            }
        }
    }
}
