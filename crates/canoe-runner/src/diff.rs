use anyhow::{Context, Result};
use tracing::{debug, info};

use canoe_core::{decode_snapshot, diff_ticket, encode_snapshot, watermark, Ticket, TicketId, UpdatePayload};
use canoe_helpdesk::HelpdeskApi;
use canoe_storage::{etag_of, SnapshotStore, StoredSnapshot};

/// Result of the read-only half of a diff: what would be notified and what would be stored.
#[derive(Clone, Debug)]
pub struct DiffPlan {
    pub ticket_id: TicketId,
    pub ticket: Ticket,
    pub updates: Vec<UpdatePayload>,
    /// Snapshot the plan was computed against; `None` when there was none.
    pub observed: Option<StoredSnapshot>,
}

impl DiffPlan {
    pub fn observed_etag(&self) -> Option<&str> {
        self.observed.as_ref().map(|s| s.etag.as_str())
    }

    pub fn has_updates(&self) -> bool {
        !self.updates.is_empty()
    }
}

/// Compares a ticket against its last stored snapshot.
pub struct DiffEngine<'a> {
    helpdesk: &'a dyn HelpdeskApi,
    snapshots: &'a dyn SnapshotStore,
    conditional_writes: bool,
}

impl<'a> DiffEngine<'a> {
    pub fn new(helpdesk: &'a dyn HelpdeskApi, snapshots: &'a dyn SnapshotStore, conditional_writes: bool) -> Self {
        Self { helpdesk, snapshots, conditional_writes }
    }

    /// Loads the snapshot, fetches the ticket and computes payloads. Writes nothing.
    pub fn plan(&self, ticket_id: &TicketId) -> Result<DiffPlan> {
        let stored = self
            .snapshots
            .get(ticket_id)
            .with_context(|| format!("load snapshot for ticket {ticket_id}"))?;
        let snapshot = match &stored {
            Some(s) => Some(decode_snapshot(ticket_id, &s.bytes)?),
            None => None,
        };
        let ticket = self
            .helpdesk
            .get_ticket(ticket_id)
            .with_context(|| format!("fetch ticket {ticket_id}"))?;

        let updates = diff_ticket(ticket_id, &ticket, snapshot.as_ref());
        debug!(
            ticket_id = %ticket_id,
            watermark = watermark(snapshot.as_ref()),
            posts = ticket.posts.len(),
            new_posts = updates.len(),
            "planned diff"
        );
        Ok(DiffPlan {
            ticket_id: ticket_id.clone(),
            ticket,
            updates,
            observed: stored,
        })
    }

    /// Stores the plan's ticket as the new snapshot when it produced payloads.
    /// Returns whether a snapshot was written.
    pub fn commit(&self, plan: &DiffPlan) -> Result<bool> {
        if !plan.has_updates() {
            return Ok(false);
        }
        let bytes = encode_snapshot(&plan.ticket)?;
        if self.conditional_writes {
            self.snapshots
                .compare_and_put(&plan.ticket_id, plan.observed_etag(), &bytes)
                .with_context(|| format!("store snapshot for ticket {}", plan.ticket_id))?;
        } else {
            self.snapshots
                .put(&plan.ticket_id, &bytes)
                .with_context(|| format!("store snapshot for ticket {}", plan.ticket_id))?;
        }
        info!(ticket_id = %plan.ticket_id, new_posts = plan.updates.len(), "snapshot advanced");
        Ok(true)
    }

    /// Undoes a successful `commit`: restores the observed snapshot, or removes the written
    /// one when there was none. Fails with a conflict if another writer moved on since.
    pub fn release(&self, plan: &DiffPlan) -> Result<()> {
        let committed = etag_of(&encode_snapshot(&plan.ticket)?);
        match &plan.observed {
            Some(prev) => self.snapshots.compare_and_put(&plan.ticket_id, Some(&committed), &prev.bytes),
            None => self.snapshots.compare_and_delete(&plan.ticket_id, &committed),
        }
        .with_context(|| format!("restore snapshot for ticket {}", plan.ticket_id))?;
        info!(ticket_id = %plan.ticket_id, "snapshot restored");
        Ok(())
    }

    /// Plan and commit in one step.
    pub fn diff(&self, ticket_id: &TicketId) -> Result<Vec<UpdatePayload>> {
        let plan = self.plan(ticket_id)?;
        self.commit(&plan)?;
        Ok(plan.updates)
    }
}
