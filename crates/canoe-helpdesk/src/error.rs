use thiserror::Error;

#[derive(Debug, Error)]
pub enum HelpdeskError {
    #[error("helpdesk request {action} failed: {source}")]
    Request {
        action: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("helpdesk unavailable: {0}")]
    Upstream(String),

    #[error("invalid helpdesk XML: {0}")]
    Xml(String),

    #[error("malformed {entity}: `{field}` {detail}")]
    MalformedRecord {
        entity: &'static str,
        field: &'static str,
        detail: String,
    },
}

impl HelpdeskError {
    pub fn missing(entity: &'static str, field: &'static str) -> Self {
        Self::MalformedRecord { entity, field, detail: "is missing".to_string() }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedRecord { .. })
    }
}
