use serde::Serialize;
use serde_json::Value;

use super::types::Params;

/// A [notification message].
///
/// [notification message]: https://microsoft.github.io/language-server-protocol/specifications/specification-current/#notificationMessage
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Notification {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Option<Params>) -> Self {
        Notification {
            method: method.into(),
            params: params.map(Value::from),
        }
    }
}
