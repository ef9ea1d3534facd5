use anyhow::{anyhow, Result};

use crate::{Config, NotifyBackend};

/// Checks that a configuration can drive every stage. Returns all problems at once.
pub fn doctor(cfg: &Config) -> Result<()> {
    let mut problems = Vec::new();

    if cfg.helpdesk.api_url.trim().is_empty() {
        problems.push("helpdesk.api_url is empty (CANOE_KAYAKO_API_URL)");
    }
    if cfg.helpdesk.api_key.is_empty() {
        problems.push("helpdesk.api_key is empty (CANOE_KAYAKO_API_KEY)");
    }
    if cfg.helpdesk.secret_key.is_empty() {
        problems.push("helpdesk.secret_key is empty (CANOE_KAYAKO_SECRET_KEY)");
    }
    if cfg.pipeline.root_department.trim().is_empty() {
        problems.push("pipeline.root_department is empty (CANOE_ROOT_PROJECT_NAME)");
    }
    if cfg.pipeline.batch_size == 0 {
        problems.push("pipeline.batch_size must be at least 1");
    }
    if cfg.queues.visibility_timeout_secs <= 0 {
        problems.push("queues.visibility_timeout_secs must be positive");
    }
    if cfg.notify.backend == NotifyBackend::Slack {
        if cfg.notify.slack_token.as_deref().map_or(true, str::is_empty) {
            problems.push("notify.slack_token is required for the slack backend (CANOE_SLACK_API_TOKEN)");
        }
        if cfg.notify.channel_id.as_deref().map_or(true, str::is_empty) {
            problems.push("notify.channel_id is required for the slack backend (CANOE_SLACK_CHANNEL_ID)");
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("invalid configuration:\n  {}", problems.join("\n  ")))
    }
}
