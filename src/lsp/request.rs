use serde::Serialize;
use serde_json::Value;

use super::types::{Id, Params};

/// [Request message]. Includes both from the Client and from the Server.
///
/// [Request message]: https://microsoft.github.io/language-server-protocol/specifications/specification-current/#requestMessage
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Request {
    pub id: Id,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: Id, method: impl Into<String>, params: Option<Params>) -> Self {
        Request {
            id,
            method: method.into(),
            params: params.map(Value::from),
        }
    }
}
