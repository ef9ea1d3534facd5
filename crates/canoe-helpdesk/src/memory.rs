use std::collections::HashMap;
use std::sync::Mutex;

use canoe_core::{Department, DepartmentId, Ticket, TicketId};

use crate::{HelpdeskApi, HelpdeskError};

/// In-memory helpdesk for tests and offline runs. Tickets can be edited between calls to
/// simulate new posts arriving.
#[derive(Default)]
pub struct StaticHelpdesk {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    departments: Vec<Department>,
    open_tickets: HashMap<DepartmentId, Vec<TicketId>>,
    tickets: HashMap<TicketId, Ticket>,
    failing: Vec<TicketId>,
    calls: Vec<String>,
}

impl StaticHelpdesk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_department(&self, department: Department) {
        self.inner.lock().unwrap().departments.push(department);
    }

    pub fn add_open_ticket(&self, department_id: &DepartmentId, ticket: Ticket) {
        let mut inner = self.inner.lock().unwrap();
        inner.open_tickets.entry(department_id.clone()).or_default().push(ticket.id.clone());
        inner.tickets.insert(ticket.id.clone(), ticket);
    }

    /// Replace (or add) a ticket without touching the open-ticket listings.
    pub fn put_ticket(&self, ticket: Ticket) {
        self.inner.lock().unwrap().tickets.insert(ticket.id.clone(), ticket);
    }

    /// Make every later `get_ticket(ticket_id)` fail.
    pub fn fail_ticket(&self, ticket_id: &TicketId) {
        self.inner.lock().unwrap().failing.push(ticket_id.clone());
    }

    /// Calls received so far, e.g. `"get_ticket 273"`.
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }
}

impl HelpdeskApi for StaticHelpdesk {
    fn list_departments(&self) -> Result<Vec<Department>, HelpdeskError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push("list_departments".to_string());
        Ok(inner.departments.clone())
    }

    fn list_open_tickets(&self, department_id: &DepartmentId) -> Result<Vec<TicketId>, HelpdeskError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(format!("list_open_tickets {department_id}"));
        Ok(inner.open_tickets.get(department_id).cloned().unwrap_or_default())
    }

    fn get_ticket(&self, ticket_id: &TicketId) -> Result<Ticket, HelpdeskError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(format!("get_ticket {ticket_id}"));
        if inner.failing.contains(ticket_id) {
            return Err(HelpdeskError::Upstream(format!("ticket {ticket_id} unavailable")));
        }
        let mut ticket = inner
            .tickets
            .get(ticket_id)
            .cloned()
            .ok_or_else(|| HelpdeskError::Upstream(format!("ticket {ticket_id} not found")))?;
        ticket.id = ticket_id.clone();
        Ok(ticket)
    }
}
