//! Outbound action notifications. The delivery client is pluggable; the
//! disabled client just logs the body so dry runs still show what would
//! have been posted.

use {
    crate::domain::{Action, Decision},
    alloy::primitives::B256,
    serde::{Deserialize, Serialize},
    std::sync::Arc,
    url::Url,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnnouncementKind {
    Deployed,
    Rotated,
    EmergencyExit,
}

/// Audit row persisted alongside decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TweetRecord {
    pub timestamp: i64,
    pub kind: AnnouncementKind,
    pub text: String,
    pub remote_id: Option<String>,
    pub tx_hash: String,
}

#[async_trait::async_trait]
pub trait SocialClient: Send + Sync {
    /// Delivers the text, returning the remote id when the backend assigns
    /// one.
    async fn post(&self, text: &str) -> anyhow::Result<Option<String>>;
}

/// Logs instead of posting. Used whenever no webhook is configured.
pub struct DisabledClient;

#[async_trait::async_trait]
impl SocialClient for DisabledClient {
    async fn post(&self, text: &str) -> anyhow::Result<Option<String>> {
        tracing::info!(%text, "announcements disabled, logging body");
        Ok(None)
    }
}

#[derive(Debug, Deserialize)]
struct WebhookResponse {
    #[serde(default)]
    id: Option<String>,
}

/// Posts `{"text": …}` to a configured webhook.
pub struct WebhookClient {
    client: reqwest::Client,
    url: Url,
}

impl WebhookClient {
    pub fn new(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait::async_trait]
impl SocialClient for WebhookClient {
    async fn post(&self, text: &str) -> anyhow::Result<Option<String>> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?
            .error_for_status()?;
        let body: WebhookResponse = response.json().await.unwrap_or(WebhookResponse { id: None });
        Ok(body.id)
    }
}

pub struct Announcer {
    client: Arc<dyn SocialClient>,
    explorer_tx_base_url: String,
}

impl Announcer {
    pub fn new(client: Arc<dyn SocialClient>, explorer_tx_base_url: String) -> Self {
        Self {
            client,
            explorer_tx_base_url,
        }
    }

    /// Formats and delivers the notification for an executed action.
    /// Returns `None` for actions that are not announced (HOLD).
    pub async fn announce(
        &self,
        decision: &Decision,
        tx_hash: B256,
        now_ts: i64,
    ) -> Option<TweetRecord> {
        let kind = match decision.action {
            Action::Hold => return None,
            Action::Enter => AnnouncementKind::Deployed,
            Action::Rotate => AnnouncementKind::Rotated,
            Action::ExitToPark => AnnouncementKind::EmergencyExit,
        };
        let text = self.format(kind, decision, tx_hash);
        let remote_id = match self.client.post(&text).await {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(?err, "announcement delivery failed");
                None
            }
        };
        Some(TweetRecord {
            timestamp: now_ts,
            kind,
            text,
            remote_id,
            tx_hash: format!("{tx_hash:#x}"),
        })
    }

    fn format(&self, kind: AnnouncementKind, decision: &Decision, tx_hash: B256) -> String {
        let explorer = format!("{}{tx_hash:#x}", self.explorer_tx_base_url);
        match kind {
            AnnouncementKind::Deployed => format!(
                "Deployed treasury into {} at {:.2}% net APY. {explorer}",
                decision.chosen_pool_id.as_deref().unwrap_or("?"),
                percent(decision.new_net_apy_bps),
            ),
            AnnouncementKind::Rotated => format!(
                "Rotated {} -> {}: {:.2}% -> {:.2}% net APY. {explorer}",
                decision.from_pool_id.as_deref().unwrap_or("?"),
                decision.chosen_pool_id.as_deref().unwrap_or("?"),
                percent(decision.old_net_apy_bps),
                percent(decision.new_net_apy_bps),
            ),
            AnnouncementKind::EmergencyExit => format!(
                "Emergency exit from {} (was {:.2}% net APY): {}. {explorer}",
                decision.from_pool_id.as_deref().unwrap_or("?"),
                percent(decision.old_net_apy_bps),
                decision.reason,
            ),
        }
    }
}

fn percent(bps: i64) -> f64 {
    bps as f64 / 100.0
}
