use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use canoe_core::{
    department_messages, resolve, ticket_messages, update_messages, DepartmentBody, HierarchyMode, Message,
    TicketBody, TicketId, UpdateBody, UpdatePayload,
};
use canoe_helpdesk::HelpdeskApi;
use canoe_notify::{format_update, Notifier};
use canoe_queue::{BatchDispatcher, QueueSource, Transport};
use canoe_storage::SnapshotStore;

use crate::{Config, DiffEngine, DiffPlan};

/// The four steps of one polling round. Every step but `Seed` consumes a queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Seed,
    Expand,
    Check,
    Notify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Seed => "seed",
            Stage::Expand => "expand",
            Stage::Check => "check",
            Stage::Notify => "notify",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueNames {
    pub departments: String,
    pub tickets: String,
    pub updates: String,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub root_department: String,
    pub hierarchy: HierarchyMode,
    pub batch_size: usize,
    pub suppress_notifications: bool,
    pub conditional_writes: bool,
    pub ticket_url_base: String,
    pub queues: QueueNames,
}

impl Settings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            root_department: cfg.pipeline.root_department.clone(),
            hierarchy: cfg.pipeline.hierarchy,
            batch_size: cfg.pipeline.batch_size,
            suppress_notifications: cfg.pipeline.suppress_notifications,
            conditional_writes: cfg.pipeline.conditional_writes,
            ticket_url_base: cfg.notify.ticket_url_base.clone(),
            queues: QueueNames {
                departments: cfg.queues.departments.clone(),
                tickets: cfg.queues.tickets.clone(),
                updates: cfg.queues.updates.clone(),
            },
        }
    }

    /// Queue a stage reads from; `None` for the seed stage.
    pub fn input_queue(&self, stage: Stage) -> Option<&str> {
        match stage {
            Stage::Seed => None,
            Stage::Expand => Some(&self.queues.departments),
            Stage::Check => Some(&self.queues.tickets),
            Stage::Notify => Some(&self.queues.updates),
        }
    }
}

/// What one stage invocation did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StageReport {
    pub inputs: usize,
    pub outputs: usize,
    pub sends: usize,
    pub snapshots_written: usize,
}

impl StageReport {
    fn absorb(&mut self, other: &StageReport) {
        self.inputs += other.inputs;
        self.outputs += other.outputs;
        self.sends += other.sends;
        self.snapshots_written += other.snapshots_written;
    }
}

/// Collaborators shared by every stage. Built once and reused across invocations.
pub struct Pipeline {
    pub helpdesk: Arc<dyn HelpdeskApi>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub transport: Arc<dyn Transport>,
    pub notifier: Arc<dyn Notifier>,
    pub settings: Settings,
}

impl Pipeline {
    pub fn diff_engine(&self) -> DiffEngine<'_> {
        DiffEngine::new(&*self.helpdesk, &*self.snapshots, self.settings.conditional_writes)
    }

    fn dispatcher(&self) -> Result<BatchDispatcher<'_>> {
        BatchDispatcher::new(&*self.transport, self.settings.batch_size).context("configure dispatcher")
    }

    pub fn run_stage(&self, stage: Stage, messages: &[Message]) -> Result<StageReport> {
        match stage {
            Stage::Seed => self.seed(),
            Stage::Expand => self.expand(messages),
            Stage::Check => self.check(messages),
            Stage::Notify => self.notify(messages),
        }
    }

    /// Resolves the departments under the configured root and queues one message per department.
    pub fn seed(&self) -> Result<StageReport> {
        let departments = self.helpdesk.list_departments().context("list departments")?;
        let ids = resolve(&departments, &self.settings.root_department, self.settings.hierarchy);
        info!(
            root = %self.settings.root_department,
            departments = departments.len(),
            selected = ids.len(),
            "resolved departments"
        );
        if ids.is_empty() {
            warn!(root = %self.settings.root_department, "no messages to send");
            return Ok(StageReport::default());
        }

        let messages = department_messages(&ids)?;
        let sends = self.dispatcher()?.dispatch(&self.settings.queues.departments, &messages)?;
        Ok(StageReport { inputs: 0, outputs: messages.len(), sends, snapshots_written: 0 })
    }

    /// Lists the open tickets of every department message and queues one message per ticket.
    pub fn expand(&self, messages: &[Message]) -> Result<StageReport> {
        let mut seen = HashSet::new();
        let mut ids: Vec<TicketId> = Vec::new();
        for message in messages {
            let body: DepartmentBody = message.decode()?;
            let open = self
                .helpdesk
                .list_open_tickets(&body.department_id)
                .with_context(|| format!("list open tickets of department {}", body.department_id))?;
            debug!(department_id = %body.department_id, open = open.len(), "listed open tickets");
            for id in open {
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
        }

        let out = ticket_messages(&ids)?;
        let sends = self.dispatcher()?.dispatch(&self.settings.queues.tickets, &out)?;
        info!(departments = messages.len(), tickets = out.len(), sends, "expanded departments");
        Ok(StageReport { inputs: messages.len(), outputs: out.len(), sends, snapshots_written: 0 })
    }

    /// Diffs every ticket message, queues the new posts and advances the snapshots.
    ///
    /// Every ticket is planned before anything is written, so a failed fetch commits nothing.
    /// With conditional writes each ticket's snapshot is claimed before its posts are sent: a
    /// concurrent invocation that got there first makes the claim fail with a conflict and
    /// nothing is sent for that ticket. A failed send restores the claimed snapshot, so the
    /// redelivered input produces the same posts again. Without conditional writes all posts
    /// are sent first and the snapshots stored afterwards. Any error aborts the invocation.
    pub fn check(&self, messages: &[Message]) -> Result<StageReport> {
        let engine = self.diff_engine();
        let mut seen = HashSet::new();
        let mut plans = Vec::new();
        for message in messages {
            let body: TicketBody = message.decode()?;
            if !seen.insert(body.ticket_id.clone()) {
                debug!(ticket_id = %body.ticket_id, "duplicate ticket in batch");
                continue;
            }
            plans.push(engine.plan(&body.ticket_id)?);
        }

        let updates: Vec<UpdatePayload> = plans.iter().flat_map(|p| p.updates.iter().cloned()).collect();
        let (sends, written) = if self.settings.suppress_notifications {
            info!(updates = updates.len(), "notifications suppressed");
            (0, self.commit_all(&engine, &plans)?)
        } else if self.settings.conditional_writes {
            self.claim_then_send(&engine, &plans)?
        } else {
            let out = update_messages(&updates, 0)?;
            let sends = self.dispatcher()?.dispatch(&self.settings.queues.updates, &out)?;
            (sends, self.commit_all(&engine, &plans)?)
        };
        info!(tickets = plans.len(), updates = updates.len(), sends, snapshots = written, "checked tickets");
        Ok(StageReport { inputs: messages.len(), outputs: updates.len(), sends, snapshots_written: written })
    }

    fn commit_all(&self, engine: &DiffEngine<'_>, plans: &[DiffPlan]) -> Result<usize> {
        let mut written = 0;
        for plan in plans {
            if engine.commit(plan)? {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Returns `(sends, snapshots_written)`.
    fn claim_then_send(&self, engine: &DiffEngine<'_>, plans: &[DiffPlan]) -> Result<(usize, usize)> {
        let dispatcher = self.dispatcher()?;
        let (mut sends, mut written, mut seq) = (0, 0, 0);
        for plan in plans {
            if !engine.commit(plan)? {
                continue;
            }
            written += 1;
            let out = update_messages(&plan.updates, seq)?;
            seq += out.len();
            match dispatcher.dispatch(&self.settings.queues.updates, &out) {
                Ok(n) => sends += n,
                Err(e) => {
                    if let Err(undo) = engine.release(plan) {
                        warn!(ticket_id = %plan.ticket_id, error = %undo, "snapshot left advanced after failed send");
                    }
                    return Err(anyhow::Error::from(e).context(format!("send updates for ticket {}", plan.ticket_id)));
                }
            }
        }
        Ok((sends, written))
    }

    /// Formats each update message and hands it to the notifier, in order.
    pub fn notify(&self, messages: &[Message]) -> Result<StageReport> {
        for message in messages {
            let body: UpdateBody = message.decode()?;
            let UpdateBody::NewPost(update) = body;
            let notification = format_update(&update, &self.settings.ticket_url_base);
            self.notifier
                .notify(&notification)
                .with_context(|| format!("notify ticket {} post {}", update.ticket_id, update.dateline))?;
        }
        info!(notified = messages.len(), "sent notifications");
        Ok(StageReport { inputs: messages.len(), outputs: messages.len(), sends: 0, snapshots_written: 0 })
    }

    /// Receives from the stage's input queue until it is empty, acknowledging each batch only
    /// after the stage handled it. On error the current batch stays unacknowledged.
    pub fn drain(&self, stage: Stage, source: &dyn QueueSource) -> Result<StageReport> {
        let Some(queue) = self.settings.input_queue(stage) else {
            return self.seed();
        };
        let mut total = StageReport::default();
        loop {
            let deliveries = source.receive(queue, self.settings.batch_size).with_context(|| format!("receive from {queue}"))?;
            if deliveries.is_empty() {
                break;
            }
            let messages: Vec<Message> = deliveries.iter().map(|d| d.message.clone()).collect();
            let report = self.run_stage(stage, &messages).with_context(|| format!("{stage} stage"))?;
            let receipts: Vec<String> = deliveries.into_iter().map(|d| d.receipt).collect();
            source.ack(queue, &receipts).with_context(|| format!("ack {} messages on {queue}", receipts.len()))?;
            total.absorb(&report);
        }
        debug!(%stage, inputs = total.inputs, "drained");
        Ok(total)
    }
}
