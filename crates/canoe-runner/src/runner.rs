use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::info;

use canoe_core::{ticket_messages, TicketId};
use canoe_helpdesk::{HelpdeskApi, KayakoClient};
use canoe_notify::{LogNotifier, Notifier, SlackNotifier};
use canoe_queue::{QueueSource, Transport};
use canoe_storage::{FsSnapshotStore, SnapshotStore};
use canoe_storage_sqlite::{SqliteQueue, SqliteSnapshotStore};

use crate::{doctor::doctor, Config, NotifyBackend, Pipeline, Settings, Stage, StageReport, StorageBackend};

/// Queue depths and stored snapshot count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    pub queues: Vec<(String, usize)>,
    pub snapshots: usize,
}

/// One process worth of collaborators, wired from configuration.
pub struct Runner {
    pub base_dir: PathBuf,
    pub cfg: Config,
    pub pipeline: Pipeline,
    pub queue: Arc<SqliteQueue>,
}

impl Runner {
    /// Loads the configuration (writing defaults if the file is missing), applies environment
    /// overrides and opens every backend once.
    pub fn open(base_dir: PathBuf, config_path: Option<&Path>) -> Result<Self> {
        let cfg_path = config_path.map(Path::to_path_buf).unwrap_or_else(|| Config::config_path(&base_dir));
        let mut cfg = if cfg_path.exists() {
            Config::load_from(&cfg_path)?
        } else {
            let cfg = Config::default_for_dir();
            cfg.save_to(&cfg_path)?;
            cfg
        };
        cfg.apply_env()?;
        Self::from_config(base_dir, cfg)
    }

    pub fn from_config(base_dir: PathBuf, cfg: Config) -> Result<Self> {
        doctor(&cfg)?;

        let helpdesk: Arc<dyn HelpdeskApi> = Arc::new(KayakoClient::new(
            cfg.helpdesk.api_url.clone(),
            cfg.helpdesk.api_key.clone(),
            cfg.helpdesk.secret_key.clone(),
        )?);

        let snapshots: Arc<dyn SnapshotStore> = match cfg.storage.backend {
            StorageBackend::Sqlite => Arc::new(SqliteSnapshotStore::open(&cfg.storage_path(&base_dir))?),
            StorageBackend::Fs => Arc::new(FsSnapshotStore::open(&cfg.storage_path(&base_dir))?),
        };

        let queue = Arc::new(SqliteQueue::open(&cfg.queues_path(&base_dir), cfg.queues.visibility_timeout_secs)?);
        let transport: Arc<dyn Transport> = queue.clone();

        let notifier: Arc<dyn Notifier> = match cfg.notify.backend {
            NotifyBackend::Slack => {
                let token = cfg.notify.slack_token.clone().ok_or_else(|| anyhow!("notify.slack_token missing"))?;
                let channel = cfg.notify.channel_id.clone().ok_or_else(|| anyhow!("notify.channel_id missing"))?;
                Arc::new(SlackNotifier::new(token, channel)?)
            }
            NotifyBackend::Log => Arc::new(LogNotifier),
        };

        info!(
            storage = ?cfg.storage.backend,
            notify = ?cfg.notify.backend,
            root = %cfg.pipeline.root_department,
            "runner ready"
        );
        let pipeline = Pipeline { helpdesk, snapshots, transport, notifier, settings: Settings::from_config(&cfg) };
        Ok(Self { base_dir, cfg, pipeline, queue })
    }

    pub fn init_dir(base_dir: &Path, config_path: Option<&Path>) -> Result<PathBuf> {
        let cfg_path = config_path.map(Path::to_path_buf).unwrap_or_else(|| Config::config_path(base_dir));
        if !cfg_path.exists() {
            Config::default_for_dir().save_to(&cfg_path)?;
        }
        // create queue db
        let cfg = Config::load_from(&cfg_path)?;
        let _ = SqliteQueue::open(&cfg.queues_path(base_dir), cfg.queues.visibility_timeout_secs)?;
        Ok(cfg_path)
    }

    pub fn seed(&self) -> Result<StageReport> {
        self.pipeline.seed()
    }

    pub fn drain(&self, stage: Stage) -> Result<StageReport> {
        self.pipeline.drain(stage, self.source())
    }

    /// Seeds one polling round and drains every stage in order.
    pub fn run(&self) -> Result<Vec<(Stage, StageReport)>> {
        let mut reports = vec![(Stage::Seed, self.seed()?)];
        for stage in [Stage::Expand, Stage::Check, Stage::Notify] {
            reports.push((stage, self.drain(stage)?));
        }
        Ok(reports)
    }

    /// Runs the check stage for a single ticket outside the queues' normal flow.
    pub fn check_ticket(&self, ticket_id: &str) -> Result<StageReport> {
        let messages = ticket_messages(&[TicketId::from_str(ticket_id)])?;
        self.pipeline.check(&messages)
    }

    pub fn status(&self) -> Result<Status> {
        let source = self.source();
        let queues = &self.pipeline.settings.queues;
        let mut depths = Vec::new();
        for name in [&queues.departments, &queues.tickets, &queues.updates] {
            let depth = source.depth(name).with_context(|| format!("depth of {name}"))?;
            depths.push((name.clone(), depth));
        }
        let snapshots = self.pipeline.snapshots.count().context("count snapshots")?;
        Ok(Status { queues: depths, snapshots })
    }

    fn source(&self) -> &dyn QueueSource {
        &*self.queue
    }
}
