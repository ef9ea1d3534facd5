use serde::{Deserialize, Serialize};

use canoe_core::UpdatePayload;

/// Chat message for one new post: a plain-text fallback plus rich blocks.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub text: String,
    pub blocks: Vec<Block>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: TextObject,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextObject {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl Block {
    pub fn markdown_section(text: impl Into<String>) -> Self {
        Self {
            kind: "section".to_string(),
            text: TextObject { kind: "mrkdwn".to_string(), text: text.into() },
        }
    }
}

/// Link to the ticket in the helpdesk staff UI.
pub fn ticket_url(ticket_url_base: &str, update: &UpdatePayload) -> String {
    format!("{}?/Tickets/Ticket/View/{}", ticket_url_base.trim_end_matches('?'), update.ticket_id.as_str())
}

pub fn format_update(update: &UpdatePayload, ticket_url_base: &str) -> Notification {
    let title = format!("[{}]: {}", update.display_id, update.subject);
    let who = format!("@here {} left a comment on a ticket", update.full_name);
    Notification {
        text: format!("{title}\n{who}"),
        blocks: vec![
            Block::markdown_section(format!("<{}|{}>", ticket_url(ticket_url_base, update), title)),
            Block::markdown_section(who),
        ],
    }
}
