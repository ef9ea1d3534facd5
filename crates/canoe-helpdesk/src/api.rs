use canoe_core::{Department, DepartmentId, Ticket, TicketId};

use crate::HelpdeskError;

/// Read-only view of the helpdesk used by the pipeline stages.
pub trait HelpdeskApi: Send + Sync {
    fn list_departments(&self) -> Result<Vec<Department>, HelpdeskError>;

    /// Ids of the open tickets filed under `department_id`.
    fn list_open_tickets(&self, department_id: &DepartmentId) -> Result<Vec<TicketId>, HelpdeskError>;

    /// Full ticket including every post, in whatever order the helpdesk returns them.
    fn get_ticket(&self, ticket_id: &TicketId) -> Result<Ticket, HelpdeskError>;
}
