//! Core value types shared by the store, subscriptions and bindings.

use crate::error::{BindError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Field map of a stored document.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_micros() as i64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Counter that tags every subscription a binding opens.
///
/// Bumped on each reference identity change; deliveries carrying an older
/// generation are discarded.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(pub u64);

impl Generation {
    /// Get the next generation.
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gen({})", self.0)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored document together with its store-assigned identifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub fields: Fields,
}

impl Record {
    /// Create a record from an id and its fields.
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Look up a top-level field.
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.fields.get(field)
    }

    /// Decode the fields into a typed value, keeping the identifier.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<WithId<T>> {
        let value = serde_json::Value::Object(self.fields.clone());
        let data = serde_json::from_value(value)
            .map_err(|e| BindError::MalformedRecord(format!("{}: {}", self.id, e)))?;
        Ok(WithId {
            id: self.id.clone(),
            data,
        })
    }
}

/// Typed document data paired with its identifier.
#[derive(Clone, Debug, PartialEq)]
pub struct WithId<T> {
    pub id: String,
    pub data: T,
}

/// Serialize a value into a field map. Fails unless it encodes as an object.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(BindError::Serialization(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Post {
        title: String,
    }

    #[test]
    fn test_decode_keeps_id() {
        let fields = to_fields(&json!({"title": "Hello"})).unwrap();
        let record = Record::new("p1", fields);
        let decoded: WithId<Post> = record.decode().unwrap();
        assert_eq!(decoded.id, "p1");
        assert_eq!(decoded.data.title, "Hello");
    }

    #[test]
    fn test_decode_wrong_shape() {
        let fields = to_fields(&json!({"title": 42})).unwrap();
        let record = Record::new("p1", fields);
        let result = record.decode::<Post>();
        assert!(matches!(result, Err(BindError::MalformedRecord(_))));
    }

    #[test]
    fn test_to_fields_rejects_scalars() {
        assert!(to_fields(&7u32).is_err());
    }

    #[test]
    fn test_generation_next() {
        assert_eq!(Generation(3).next(), Generation(4));
        assert!(Timestamp::now().0 > 0);
    }
}
