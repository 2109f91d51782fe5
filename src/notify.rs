use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;

use crate::config::NotifySettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterNotice {
    pub ordinal: usize,
    pub title: String,
    pub link: String,
    pub content: String,
}

/// Outbound progress channel. Failures are reported but never stop a walk.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn chapter(&self, notice: &ChapterNotice) -> anyhow::Result<()>;
    async fn error(&self, ordinal: usize, url: &str, reason: &str) -> anyhow::Result<()>;
}

/// Used when no webhook is configured.
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn chapter(&self, notice: &ChapterNotice) -> anyhow::Result<()> {
        tracing::debug!(episode = notice.ordinal, "no webhook configured; chapter notice dropped");
        Ok(())
    }

    async fn error(&self, ordinal: usize, url: &str, reason: &str) -> anyhow::Result<()> {
        tracing::debug!(episode = ordinal, url, reason, "no webhook configured; error notice dropped");
        Ok(())
    }
}

/// Posts `{"content": ...}` messages to a Discord-compatible webhook.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    settings: NotifySettings,
}

impl WebhookNotifier {
    pub fn new(url: &str, settings: NotifySettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("build webhook http client")?;
        Ok(Self {
            client,
            url: url.to_owned(),
            settings,
        })
    }

    async fn post(&self, content: &str) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await
            .context("POST webhook")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("webhook error ({status}): {body}");
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn chapter(&self, notice: &ChapterNotice) -> anyhow::Result<()> {
        self.post(&chapter_header(notice))
            .await
            .context("send chapter header")?;

        for part in chunk_message(&notice.content, self.settings.chunk_chars) {
            self.post(&part).await.context("send chapter part")?;
            tokio::time::sleep(self.settings.chunk_delay).await;
        }

        self.post(&chapter_footer(notice.ordinal))
            .await
            .context("send chapter footer")
    }

    async fn error(&self, ordinal: usize, url: &str, reason: &str) -> anyhow::Result<()> {
        self.post(&error_message(ordinal, url, reason))
            .await
            .context("send error notice")
    }
}

pub fn chapter_header(notice: &ChapterNotice) -> String {
    format!(
        "📚 **[Episode {}] {}**\n🔗 {}\n*(translating...)*",
        notice.ordinal, notice.title, notice.link
    )
}

pub fn chapter_footer(ordinal: usize) -> String {
    format!("✅ **End of episode {ordinal}**")
}

pub fn error_message(ordinal: usize, url: &str, reason: &str) -> String {
    format!("⚠️ **[Skipped episode {ordinal}]** {reason}\n🔗 {url}")
}

/// Splits `content` into pieces of at most `max_chars` characters. Multi-part
/// messages get a `(i/N)` prefix line.
pub fn chunk_message(content: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let chars = content.chars().collect::<Vec<_>>();
    let chunks = chars
        .chunks(max_chars)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>();

    let total = chunks.len();
    if total <= 1 {
        return chunks;
    }
    chunks
        .into_iter()
        .enumerate()
        .map(|(idx, chunk)| format!("**({}/{total})**\n{chunk}", idx + 1))
        .collect()
}
