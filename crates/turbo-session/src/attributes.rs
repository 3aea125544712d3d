//! Named attribute bag carried by a session.

use crate::{Session, SessionError};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;

/// Typed access to loosely-structured per-session values.
///
/// Each attribute is stored as JSON under a string key, so independent
/// features can keep their own state in one session without sharing a type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, serde_json::Value>);

impl Attributes {
    /// Create an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an attribute, `None` if it is absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SessionError> {
        self.0
            .get(key)
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(SessionError::from)
    }

    /// Write an attribute, replacing any previous value.
    pub fn insert<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), SessionError> {
        self.0.insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Remove an attribute. Returns whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.0.remove(key).is_some()
    }

    /// Check if an attribute is present.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
}

/// Session store holding an attribute bag per visit.
pub type SessionStore = Session<Attributes>;
