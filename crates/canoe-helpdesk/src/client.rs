use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use canoe_core::{Department, DepartmentId, Ticket, TicketId};

use crate::{xml, HelpdeskApi, HelpdeskError};

type HmacSha256 = Hmac<Sha256>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocking client for the helpdesk REST API.
///
/// The action path travels in the `e` query parameter and every request is signed with a
/// fresh random salt. One instance holds one connection pool; build it once per process.
pub struct KayakoClient {
    base_url: String,
    api_key: String,
    secret_key: String,
    http: reqwest::blocking::Client,
}

impl KayakoClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, secret_key: impl Into<String>) -> Result<Self, HelpdeskError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| HelpdeskError::Request { action: "build client".to_string(), source })?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            secret_key: secret_key.into(),
            http,
        })
    }

    fn get(&self, action: &str) -> Result<String, HelpdeskError> {
        let salt = rand::random::<u32>().to_string();
        let signature = sign(&self.secret_key, &salt);
        debug!(action, "helpdesk request");

        let map_err = |source| HelpdeskError::Request { action: action.to_string(), source };
        self.http
            .get(&self.base_url)
            .query(&[
                ("e", action),
                ("apikey", self.api_key.as_str()),
                ("salt", salt.as_str()),
                ("signature", signature.as_str()),
            ])
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(map_err)?
            .text()
            .map_err(map_err)
    }
}

impl HelpdeskApi for KayakoClient {
    fn list_departments(&self) -> Result<Vec<Department>, HelpdeskError> {
        xml::parse_departments(&self.get("/Base/Department")?)
    }

    fn list_open_tickets(&self, department_id: &DepartmentId) -> Result<Vec<TicketId>, HelpdeskError> {
        let action = format!("/Tickets/Ticket/ListAll/{}/1/-1/-1/-1/-1/ticketid/ASC", department_id.as_str());
        xml::parse_ticket_ids(&self.get(&action)?)
    }

    fn get_ticket(&self, ticket_id: &TicketId) -> Result<Ticket, HelpdeskError> {
        let action = format!("/Tickets/Ticket/{}", ticket_id.as_str());
        xml::parse_ticket(ticket_id, &self.get(&action)?)
    }
}

/// Request signature: base64 of HMAC-SHA256 over the salt, keyed by the secret.
pub fn sign(secret_key: &str, salt: &str) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret_key.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(salt.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}
