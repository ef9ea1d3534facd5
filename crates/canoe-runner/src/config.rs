use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use canoe_core::HierarchyMode;
use canoe_queue::DEFAULT_BATCH_SIZE;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub helpdesk: HelpdeskConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
    pub queues: QueuesConfig,
    pub notify: NotifyConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HelpdeskConfig {
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub secret_key: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub root_department: String,
    #[serde(default)]
    pub hierarchy: HierarchyMode,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub suppress_notifications: bool,
    #[serde(default = "default_true")]
    pub conditional_writes: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Sqlite,
    Fs,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueuesConfig {
    pub path: String,
    pub departments: String,
    pub tickets: String,
    pub updates: String,
    #[serde(default = "default_visibility")]
    pub visibility_timeout_secs: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyBackend {
    Slack,
    Log,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub backend: NotifyBackend,
    #[serde(default)]
    pub slack_token: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    pub ticket_url_base: String,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_true() -> bool {
    true
}

fn default_visibility() -> i64 {
    300
}

impl Config {
    pub fn default_for_dir() -> Self {
        Self {
            helpdesk: HelpdeskConfig {
                api_url: "https://helpdesk.example.com/api/index.php".to_string(),
                api_key: String::new(),
                secret_key: String::new(),
            },
            pipeline: PipelineConfig {
                root_department: "Support".to_string(),
                hierarchy: HierarchyMode::Children,
                batch_size: DEFAULT_BATCH_SIZE,
                suppress_notifications: false,
                conditional_writes: true,
            },
            storage: StorageConfig {
                backend: StorageBackend::Sqlite,
                path: ".canoe/canoe.db".to_string(),
            },
            queues: QueuesConfig {
                path: ".canoe/queues.db".to_string(),
                departments: "departments".to_string(),
                tickets: "tickets".to_string(),
                updates: "updates".to_string(),
                visibility_timeout_secs: default_visibility(),
            },
            notify: NotifyConfig {
                backend: NotifyBackend::Log,
                slack_token: None,
                channel_id: None,
                ticket_url_base: "https://helpdesk.example.com/staff/index.php".to_string(),
            },
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| "parse canoe.toml")?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    /// Applies `CANOE_*` variables from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`; values found there win over the file.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("CANOE_KAYAKO_API_URL") {
            self.helpdesk.api_url = v;
        }
        if let Some(v) = lookup("CANOE_KAYAKO_API_KEY") {
            self.helpdesk.api_key = v;
        }
        if let Some(v) = lookup("CANOE_KAYAKO_SECRET_KEY") {
            self.helpdesk.secret_key = v;
        }
        if let Some(v) = lookup("CANOE_ROOT_PROJECT_NAME") {
            self.pipeline.root_department = v;
        }
        if let Some(v) = lookup("CANOE_SLACK_API_TOKEN") {
            self.notify.slack_token = Some(v);
        }
        if let Some(v) = lookup("CANOE_SLACK_CHANNEL_ID") {
            self.notify.channel_id = Some(v);
        }
        if let Some(v) = lookup("CANOE_SUPPRESS_NOTIFICATIONS") {
            self.pipeline.suppress_notifications = parse_flag(&v)
                .ok_or_else(|| anyhow!("CANOE_SUPPRESS_NOTIFICATIONS: expected a boolean, got {v:?}"))?;
        }
        Ok(())
    }

    pub fn storage_path(&self, base: &Path) -> PathBuf {
        resolve_path(base, &self.storage.path)
    }

    pub fn queues_path(&self, base: &Path) -> PathBuf {
        resolve_path(base, &self.queues.path)
    }

    pub fn config_path(base: &Path) -> PathBuf {
        base.join(".canoe").join("canoe.toml")
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Expands `~` and anchors relative paths at `base`.
pub fn resolve_path(base: &Path, raw: &str) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(raw).to_string());
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}
