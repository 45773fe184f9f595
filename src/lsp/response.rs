use serde::Serialize;
use serde_json::Value;

use super::error::ResponseError;
use super::types::Id;

/// [Response message]. Either Success or Failure response.
///
/// A failure may carry a `null` id when the peer could not determine the
/// request it is answering.
///
/// [Response message]: https://microsoft.github.io/language-server-protocol/specifications/specification-current/#responseMessage
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Success { id: Id, result: Value },

    Failure { id: Option<Id>, error: ResponseError },
}

impl Response {
    pub fn id(&self) -> Option<&Id> {
        match self {
            Response::Success { id, .. } => Some(id),
            Response::Failure { id, .. } => id.as_ref(),
        }
    }
}
