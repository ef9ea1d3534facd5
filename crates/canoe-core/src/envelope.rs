use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{error::CoreError, DepartmentId, TicketId, UpdatePayload};

/// Unit handed to a transport. `id` must be unique within one batch; `body` is serialized
/// only at the transport boundary.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub body: serde_json::Value,
}

impl Message {
    pub fn new<T: Serialize>(id: impl Into<String>, body: &T) -> Result<Self, CoreError> {
        let id = id.into();
        let body = serde_json::to_value(body).map_err(|source| CoreError::EncodeMessage {
            message_id: id.clone(),
            source,
        })?;
        Ok(Self { id, body })
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CoreError> {
        T::deserialize(&self.body).map_err(|source| CoreError::DecodeMessage {
            message_id: self.id.clone(),
            source,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DepartmentBody {
    pub department_id: DepartmentId,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TicketBody {
    pub ticket_id: TicketId,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "object", rename_all = "snake_case")]
pub enum UpdateBody {
    NewPost(UpdatePayload),
}

pub fn department_messages(ids: &[DepartmentId]) -> Result<Vec<Message>, CoreError> {
    ids.iter()
        .map(|id| Message::new(id.as_str(), &DepartmentBody { department_id: id.clone() }))
        .collect()
}

pub fn ticket_messages(ids: &[TicketId]) -> Result<Vec<Message>, CoreError> {
    ids.iter()
        .map(|id| Message::new(id.as_str(), &TicketBody { ticket_id: id.clone() }))
        .collect()
}

/// New-post messages numbered from `first_seq` in payload order.
pub fn update_messages(updates: &[UpdatePayload], first_seq: usize) -> Result<Vec<Message>, CoreError> {
    updates
        .iter()
        .enumerate()
        .map(|(i, u)| Message::new((first_seq + i).to_string(), &UpdateBody::NewPost(u.clone())))
        .collect()
}
