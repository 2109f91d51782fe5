use crate::config::WalkSettings;
use crate::fetch::EpisodeSource;
use crate::formats::{ChapterRecord, Episode};
use crate::notify::{ChapterNotice, Notifier};
use crate::store::{ChapterStore, History};
use crate::translate::{Orchestrator, Resolution, Tier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkOutcome {
    /// The chain ended (no successor) or the episode limit was reached.
    Done,
    /// Entry point missing or an episode could not be fetched.
    Failed {
        ordinal: usize,
        url: Option<String>,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkReport {
    pub outcome: WalkOutcome,
    pub visited: usize,
    pub translated: usize,
    pub skipped: usize,
    pub untranslated: usize,
}

impl WalkReport {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, WalkOutcome::Failed { .. })
    }
}

enum State {
    LocateFirst,
    Fetch(String),
    Translate(Episode),
    Persist {
        episode: Episode,
        title: String,
        content: String,
    },
    Advance(Option<String>),
}

/// Drives one work from its entry point along the successor chain.
pub struct Walker<'a> {
    pub source: &'a dyn EpisodeSource,
    pub orchestrator: &'a Orchestrator,
    pub notifier: &'a dyn Notifier,
    pub store: &'a mut ChapterStore,
    pub history: &'a mut History,
    pub settings: WalkSettings,
}

impl Walker<'_> {
    /// Disk errors while persisting abort the walk with `Err`; everything else ends
    /// in a [`WalkReport`].
    pub async fn walk(&mut self, work_url: &str) -> anyhow::Result<WalkReport> {
        let mut report = WalkReport {
            outcome: WalkOutcome::Done,
            visited: 0,
            translated: 0,
            skipped: 0,
            untranslated: 0,
        };
        let mut work_title: Option<String> = None;
        let mut ordinal = 1usize;
        let mut state = State::LocateFirst;

        loop {
            state = match state {
                State::LocateFirst => match self.source.entry_point(work_url).await {
                    Ok(Some(entry)) => {
                        tracing::info!(url = %entry.first_episode_url, "found first episode");
                        work_title = entry.work_title;
                        State::Fetch(entry.first_episode_url)
                    }
                    Ok(None) => {
                        tracing::error!(url = work_url, "first episode not found");
                        report.outcome = WalkOutcome::Failed {
                            ordinal: 0,
                            url: None,
                            reason: "first episode not found".to_owned(),
                        };
                        return Ok(report);
                    }
                    Err(err) => {
                        tracing::error!(url = work_url, error = %format!("{err:#}"), "locate first episode failed");
                        report.outcome = WalkOutcome::Failed {
                            ordinal: 0,
                            url: None,
                            reason: format!("{err:#}"),
                        };
                        return Ok(report);
                    }
                },

                State::Fetch(url) => {
                    tracing::info!(episode = ordinal, url = %url, "processing");
                    report.visited += 1;
                    match self.source.fetch_episode(&url).await {
                        Ok(episode) if self.history.contains(&url) => {
                            tracing::info!(episode = ordinal, url = %url, "already in history; skipping");
                            report.skipped += 1;
                            State::Advance(episode.next_url)
                        }
                        Ok(episode) => {
                            match episode.next_url.as_deref() {
                                Some(next) => tracing::info!(episode = ordinal, next, "found next episode"),
                                None => tracing::info!(episode = ordinal, "no next episode link"),
                            }
                            State::Translate(episode)
                        }
                        Err(err) => {
                            let reason = format!("could not fetch episode: {err:#}");
                            tracing::error!(episode = ordinal, url = %url, %reason, "stopping walk");
                            self.notify_error(ordinal, &url, &reason).await;
                            report.outcome = WalkOutcome::Failed {
                                ordinal,
                                url: Some(url),
                                reason,
                            };
                            return Ok(report);
                        }
                    }
                }

                State::Translate(episode) => {
                    tracing::info!(episode = ordinal, title = %episode.title, "translating");
                    let title = self.orchestrator.translate_title(&episode.title).await;
                    match self.orchestrator.translate(&episode.body).await {
                        Ok(translation) => {
                            if translation.resolved_by != Resolution::Whole(Tier::Direct) {
                                tracing::info!(
                                    episode = ordinal,
                                    resolved_by = ?translation.resolved_by,
                                    attempts = translation.attempts.len(),
                                    "translation degraded"
                                );
                            }
                            State::Persist {
                                episode,
                                title,
                                content: translation.text,
                            }
                        }
                        Err(err) => {
                            let reason = format!("translation failed: {err}");
                            tracing::warn!(episode = ordinal, url = %episode.url, %reason, "skipping");
                            self.notify_error(ordinal, &episode.url, &reason).await;
                            report.untranslated += 1;
                            State::Advance(episode.next_url)
                        }
                    }
                }

                State::Persist {
                    episode,
                    title,
                    content,
                } => {
                    let record = ChapterRecord {
                        id: episode.id.clone(),
                        title: title.clone(),
                        content: content.clone(),
                        link: episode.url.clone(),
                        translated_at: Some(chrono::Utc::now().to_rfc3339()),
                    };
                    let upsert = self
                        .store
                        .upsert(work_url, work_title.as_deref(), record);
                    self.store.save()?;
                    self.history.append(&episode.url)?;
                    tracing::info!(episode = ordinal, ?upsert, "saved chapter");
                    report.translated += 1;

                    let notice = ChapterNotice {
                        ordinal,
                        title,
                        link: episode.url.clone(),
                        content,
                    };
                    if let Err(err) = self.notifier.chapter(&notice).await {
                        tracing::warn!(episode = ordinal, error = %format!("{err:#}"), "chapter notification failed");
                    }
                    State::Advance(episode.next_url)
                }

                State::Advance(next) => {
                    let Some(next) = next else {
                        tracing::info!(episodes = report.visited, "no next episode; done");
                        return Ok(report);
                    };
                    if let Some(max) = self.settings.max_episodes
                        && report.visited >= max
                    {
                        tracing::info!(episodes = report.visited, "episode limit reached; done");
                        return Ok(report);
                    }
                    ordinal += 1;
                    tracing::debug!(
                        delay_ms = self.settings.episode_delay.as_millis() as u64,
                        "waiting before next episode"
                    );
                    tokio::time::sleep(self.settings.episode_delay).await;
                    State::Fetch(next)
                }
            };
        }
    }

    async fn notify_error(&self, ordinal: usize, url: &str, reason: &str) {
        if let Err(err) = self.notifier.error(ordinal, url, reason).await {
            tracing::warn!(episode = ordinal, error = %format!("{err:#}"), "error notification failed");
        }
    }
}
