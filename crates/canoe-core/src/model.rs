use serde::{Deserialize, Serialize};

use crate::ids::*;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Department {
    pub id: DepartmentId,
    pub title: String,
    pub parent_id: Option<DepartmentId>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ticket {
    pub id: TicketId,
    pub display_id: String,
    pub organization: String,
    pub subject: String,
    /// Posts in the order the helpdesk returned them; not sorted.
    pub posts: Vec<Post>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    /// Unix seconds. Ordering key and diff cursor; collisions are possible.
    pub dateline: i64,
    pub full_name: String,
    pub email: String,
    pub contents: String,
}

/// One new post flattened together with the ticket fields a notification needs.
///
/// Field names on the wire follow the helpdesk vocabulary so downstream consumers
/// can read the payload without knowing about this crate.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdatePayload {
    #[serde(with = "dateline_string")]
    pub dateline: i64,
    #[serde(rename = "fullname")]
    pub full_name: String,
    pub email: String,
    pub contents: String,
    #[serde(rename = "displayid")]
    pub display_id: String,
    #[serde(rename = "userorganization")]
    pub organization: String,
    pub subject: String,
    pub ticket_id: TicketId,
}

mod dateline_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.trim().parse().map_err(|_| D::Error::custom(format!("invalid dateline {raw:?}")))
    }
}
