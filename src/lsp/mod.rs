pub mod error;
pub mod framed;
mod notification;
mod request;
mod response;
pub mod types;

use std::convert::TryFrom;

use serde::ser::Serializer;
use serde::Serialize;
use serde_json::{Map, Value};

pub use error::{ErrorCode, ResponseError};
pub use notification::Notification;
pub use request::Request;
pub use response::Response;
use types::Id;

/// A decoded JSON-RPC message.
///
/// The kind is decided by the fields present, in this order:
/// `id` with `result` or `error` is a response, `method` with `id` is a request,
/// `method` alone is a notification.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Request(Request),

    Notification(Notification),

    Response(Response),
}

/// JSON that is not a request, notification or response.
#[derive(Debug, thiserror::Error)]
#[error("{reason}: {value}")]
pub struct InvalidMessage {
    pub reason: &'static str,
    pub value: Value,
    /// Id of a malformed response, when it has a usable one.
    pub id: Option<Id>,
}

impl InvalidMessage {
    fn new(reason: &'static str, value: Map<String, Value>) -> Self {
        InvalidMessage {
            reason,
            value: Value::Object(value),
            id: None,
        }
    }

    fn response(reason: &'static str, id: Option<Id>, value: Map<String, Value>) -> Self {
        InvalidMessage {
            id,
            ..InvalidMessage::new(reason, value)
        }
    }
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Self::Request(request)
    }
}

impl From<Notification> for Message {
    fn from(notification: Notification) -> Self {
        Self::Notification(notification)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

impl TryFrom<Value> for Message {
    type Error = InvalidMessage;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let mut obj = match value {
            Value::Object(obj) => obj,
            other => {
                return Err(InvalidMessage {
                    reason: "message is not an object",
                    value: other,
                    id: None,
                })
            }
        };

        if obj.contains_key("id") && (obj.contains_key("result") || obj.contains_key("error")) {
            let id = match obj.get("id") {
                Some(Value::Null) | None => None,
                Some(id) => match serde_json::from_value::<Id>(id.clone()) {
                    Ok(id) => Some(id),
                    Err(_) => return Err(InvalidMessage::new("invalid response id", obj)),
                },
            };

            if obj.contains_key("result") && obj.contains_key("error") {
                return Err(InvalidMessage::response(
                    "response has both `result` and `error`",
                    id,
                    obj,
                ));
            }

            if let Some(result) = obj.remove("result") {
                return match id {
                    Some(id) => Ok(Response::Success { id, result }.into()),
                    None => {
                        obj.insert("result".to_owned(), result);
                        Err(InvalidMessage::new("success response without id", obj))
                    }
                };
            }

            let error = obj.get("error").cloned().unwrap_or(Value::Null);
            return match serde_json::from_value::<ResponseError>(error) {
                Ok(error) => Ok(Response::Failure { id, error }.into()),
                Err(_) => Err(InvalidMessage::response("invalid error object", id, obj)),
            };
        }

        if obj.contains_key("method") {
            let method = match obj.get("method") {
                Some(Value::String(method)) => method.clone(),
                _ => return Err(InvalidMessage::new("method is not a string", obj)),
            };
            let params = match obj.remove("params") {
                Some(Value::Null) | None => None,
                Some(params) => Some(params),
            };

            return match obj.get("id") {
                None => Ok(Notification { method, params }.into()),
                Some(id) => match serde_json::from_value::<Id>(id.clone()) {
                    Ok(id) => Ok(Request { id, method, params }.into()),
                    Err(_) => Err(InvalidMessage::new("invalid request id", obj)),
                },
            };
        }

        Err(InvalidMessage::new(
            "neither a request, notification nor response",
            obj,
        ))
    }
}

// We assume that all messages have `jsonrpc: "2.0"`.
impl Serialize for Message {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        struct WithJsonRpc<'a, T: Serialize> {
            jsonrpc: &'static str,
            #[serde(flatten)]
            msg: &'a T,
        }

        match &self {
            Self::Request(request) => {
                let wrapped = WithJsonRpc {
                    jsonrpc: "2.0",
                    msg: &request,
                };
                wrapped.serialize(serializer)
            }

            Self::Notification(notification) => {
                let wrapped = WithJsonRpc {
                    jsonrpc: "2.0",
                    msg: &notification,
                };
                wrapped.serialize(serializer)
            }

            Self::Response(response) => {
                let wrapped = WithJsonRpc {
                    jsonrpc: "2.0",
                    msg: &response,
                };
                wrapped.serialize(serializer)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn classify(v: Value) -> Result<Message, InvalidMessage> {
        Message::try_from(v)
    }

    #[test]
    fn test_request() {
        let msg = classify(json!({"jsonrpc":"2.0","method":"workspace/configuration","params":{},"id":7}))
            .unwrap();
        assert_eq!(
            msg,
            Message::Request(Request {
                id: Id::Number(7),
                method: "workspace/configuration".to_owned(),
                params: Some(json!({})),
            })
        );
    }

    #[test]
    fn test_notification() {
        let msg = classify(json!({"jsonrpc":"2.0","method":"window/logMessage","params":{"message":"hi"}}))
            .unwrap();
        assert_eq!(
            msg,
            Message::Notification(Notification {
                method: "window/logMessage".to_owned(),
                params: Some(json!({"message":"hi"})),
            })
        );
    }

    #[test]
    fn test_success_response() {
        let msg = classify(json!({"jsonrpc":"2.0","result":null,"id":1})).unwrap();
        assert_eq!(
            msg,
            Message::Response(Response::Success {
                id: Id::Number(1),
                result: Value::Null,
            })
        );
    }

    #[test]
    fn test_failure_response() {
        let msg = classify(json!({"jsonrpc":"2.0","error":{"code":-32601,"message":"not found"},"id":"a"}))
            .unwrap();
        match msg {
            Message::Response(Response::Failure { id, error }) => {
                assert_eq!(id, Some(Id::String("a".to_owned())));
                assert_eq!(error.code, ErrorCode::MethodNotFound);
                assert_eq!(error.message, "not found");
            }
            other => panic!("expected failure response, got {:?}", other),
        }

        let msg = classify(json!({"jsonrpc":"2.0","error":{"code":-32700,"message":"x"},"id":null}))
            .unwrap();
        match msg {
            Message::Response(response) => assert_eq!(response.id(), None),
            other => panic!("expected failure response, got {:?}", other),
        }
    }

    #[test]
    fn test_response_takes_precedence_over_method() {
        let msg = classify(json!({"id":1,"method":"foo","result":2})).unwrap();
        assert!(matches!(msg, Message::Response(Response::Success { .. })));
    }

    #[test]
    fn test_invalid_shapes() {
        for v in vec![
            json!({"foo":"bar"}),
            json!([1, 2, 3]),
            json!({"id":1}),
            json!({"id":1,"result":1,"error":{"code":1,"message":""}}),
            json!({"id":null,"result":1}),
            json!({"id":1,"error":"nope"}),
            json!({"method":1}),
            json!({"method":"foo","id":{"a":1}}),
        ] {
            assert!(classify(v.clone()).is_err(), "{} should be invalid", v);
        }
    }

    #[test]
    fn test_malformed_response_keeps_id() {
        let err = classify(json!({"id":3,"result":1,"error":{"code":1,"message":""}})).unwrap_err();
        assert_eq!(err.id, Some(Id::Number(3)));

        let err = classify(json!({"id":"r","error":"nope"})).unwrap_err();
        assert_eq!(err.id, Some(Id::String("r".to_owned())));

        let err = classify(json!({"foo":"bar","id":3})).unwrap_err();
        assert_eq!(err.id, None);
    }

    #[test]
    fn test_error_without_message() {
        let msg = classify(json!({"jsonrpc":"2.0","id":0,"error":{"code":-32601}})).unwrap();
        match msg {
            Message::Response(Response::Failure { error, .. }) => {
                assert_eq!(error.code, ErrorCode::MethodNotFound);
                assert_eq!(error.message, "");
            }
            other => panic!("expected failure response, got {:?}", other),
        }
    }

    #[test]
    fn test_serialize_request() {
        let msg: Message = Request::new(Id::Number(0), "shutdown", None).into();
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"jsonrpc":"2.0","id":0,"method":"shutdown"}"#
        );
    }

    #[test]
    fn test_serialize_notification() {
        let params = types::Params::from_value(json!({"message":""})).unwrap();
        let msg: Message = Notification::new("language/status", params).into();
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"jsonrpc":"2.0","method":"language/status","params":{"message":""}}"#
        );
    }

    #[test]
    fn test_serialize_response() {
        let msg: Message = Response::Success {
            id: Id::Number(7),
            result: json!([{}]),
        }
        .into();
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"jsonrpc":"2.0","id":7,"result":[{}]}"#
        );
    }
}
