use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request ID
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Id {
    /// Numeric ID.
    Number(i64),
    /// String ID.
    String(String),
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Id::Number(id) => Display::fmt(id, f),
            Id::String(id) => fmt::Debug::fmt(id, f),
        }
    }
}

impl From<i64> for Id {
    fn from(id: i64) -> Self {
        Id::Number(id)
    }
}

impl From<i32> for Id {
    fn from(id: i32) -> Self {
        Id::Number(id.into())
    }
}

impl From<String> for Id {
    fn from(id: String) -> Self {
        Id::String(id)
    }
}

impl From<&str> for Id {
    fn from(id: &str) -> Self {
        Id::String(id.to_owned())
    }
}

/// Parameters for Request and Notification.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Params {
    Array(Vec<Value>),
    Object(serde_json::Map<String, Value>),
}

impl Params {
    /// Converts serialized parameters into `Params`.
    ///
    /// `null` means the parameters are omitted. Returns `Err` with the value for
    /// anything that is not a structured value.
    pub fn from_value(value: Value) -> Result<Option<Self>, Value> {
        match value {
            Value::Null => Ok(None),
            Value::Array(values) => Ok(Some(Params::Array(values))),
            Value::Object(map) => Ok(Some(Params::Object(map))),
            other => Err(other),
        }
    }
}

impl From<Params> for Value {
    fn from(params: Params) -> Self {
        match params {
            Params::Array(values) => Value::Array(values),
            Params::Object(map) => Value::Object(map),
        }
    }
}
