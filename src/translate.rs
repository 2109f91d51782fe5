use std::fmt;
use std::sync::Arc;

use crate::config::TranslationSettings;
use crate::generate::{GenerateError, SafetyConfig, TextGenerator};

/// Prompt style for a whole-text (or half-text) generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    Direct,
    Softened,
    Summary,
}

impl Tier {
    pub fn ordinal(self) -> usize {
        match self {
            Tier::Direct => 0,
            Tier::Softened => 1,
            Tier::Summary => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tier::Direct => "direct",
            Tier::Softened => "softened",
            Tier::Summary => "summary",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Whole(Tier),
    Split,
}

/// Escalation order. `Split` must stay last: it always produces text.
pub const LADDER: [Strategy; 4] = [
    Strategy::Whole(Tier::Direct),
    Strategy::Whole(Tier::Softened),
    Strategy::Whole(Tier::Summary),
    Strategy::Split,
];

/// Tier used for each half in split mode.
pub const SPLIT_TIER: Tier = Tier::Softened;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Whole,
    FirstHalf,
    SecondHalf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Empty,
    RateLimited,
    Blocked,
    TransportError,
}

impl AttemptOutcome {
    fn of(result: &Result<String, GenerateError>) -> Self {
        match result {
            Ok(text) if text.trim().is_empty() => AttemptOutcome::Empty,
            Ok(_) => AttemptOutcome::Success,
            Err(GenerateError::Empty) => AttemptOutcome::Empty,
            Err(GenerateError::RateLimited(_)) => AttemptOutcome::RateLimited,
            Err(GenerateError::Blocked(_)) => AttemptOutcome::Blocked,
            Err(GenerateError::Api { .. } | GenerateError::Transport(_)) => {
                AttemptOutcome::TransportError
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationAttempt {
    pub tier: Tier,
    pub scope: Scope,
    pub input_chars: usize,
    pub output_chars: Option<usize>,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Whole(Tier),
    Split,
    Apology,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub text: String,
    pub resolved_by: Resolution,
    pub attempts: Vec<TranslationAttempt>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslateError {
    #[error("nothing to translate")]
    EmptyInput,

    #[error("still rate limited after {retries} retries ({tier} prompt): {message}")]
    RateLimited {
        tier: Tier,
        retries: usize,
        message: String,
    },
}

enum CallOutcome {
    Text(String),
    Failed(GenerateError),
}

pub struct Orchestrator {
    generator: Arc<dyn TextGenerator>,
    safety: SafetyConfig,
    settings: TranslationSettings,
}

impl Orchestrator {
    pub fn new(generator: Arc<dyn TextGenerator>, settings: TranslationSettings) -> Self {
        Self {
            generator,
            safety: SafetyConfig::permissive(),
            settings,
        }
    }

    /// Translates `text` (truncated to `max_chars`), escalating through [`LADDER`].
    ///
    /// Rate limiting retries the same tier after a backoff and never escalates; only an
    /// exhausted rate-limit budget is an error. Every other failure moves one rung down
    /// the ladder. Split mode never fails on a bad half: the half becomes a marker.
    pub async fn translate(&self, text: &str) -> Result<Translation, TranslateError> {
        self.translate_from(text, Tier::Direct).await
    }

    /// Like [`Orchestrator::translate`], but skips the whole-text tiers below `start`.
    pub async fn translate_from(
        &self,
        text: &str,
        start: Tier,
    ) -> Result<Translation, TranslateError> {
        let text = truncate_chars(text, self.settings.max_chars);
        if text.trim().is_empty() {
            return Err(TranslateError::EmptyInput);
        }

        let steps = LADDER.iter().copied().filter(|strategy| match strategy {
            Strategy::Whole(tier) => *tier >= start,
            Strategy::Split => self.settings.split_fallback,
        });

        let mut attempts = Vec::new();
        for (step, strategy) in steps.enumerate() {
            if step > 0 {
                tokio::time::sleep(self.settings.escalation_delay).await;
            }

            match strategy {
                Strategy::Whole(tier) => {
                    match self.call(tier, text, Scope::Whole, &mut attempts).await? {
                        CallOutcome::Text(translated) => {
                            tracing::debug!(tier = %tier, chars = translated.chars().count(), "translated");
                            return Ok(Translation {
                                text: translated,
                                resolved_by: Resolution::Whole(tier),
                                attempts,
                            });
                        }
                        CallOutcome::Failed(err) => {
                            tracing::warn!(tier = %tier, error = %err, "translation failed; escalating");
                        }
                    }
                }
                Strategy::Split => {
                    tracing::info!(chars = text.chars().count(), "splitting text in half");
                    let joined = self.translate_halves(text, &mut attempts).await?;
                    return Ok(Translation {
                        text: joined,
                        resolved_by: Resolution::Split,
                        attempts,
                    });
                }
            }
        }

        tracing::error!(
            attempts = attempts.len(),
            "every translation strategy failed; substituting apology text"
        );
        Ok(Translation {
            text: self.settings.apology.clone(),
            resolved_by: Resolution::Apology,
            attempts,
        })
    }

    /// One call, no escalation. Falls back to the source title on any failure.
    pub async fn translate_title(&self, title: &str) -> String {
        let title = title.trim();
        if title.is_empty() {
            return String::new();
        }

        let prompt = build_title_prompt(&self.settings, title);
        match self.generator.generate(&prompt, &self.safety).await {
            Ok(translated) => match translated.lines().map(str::trim).find(|l| !l.is_empty()) {
                Some(line) => line.to_owned(),
                None => title.to_owned(),
            },
            Err(err) => {
                tracing::warn!(error = %err, "title translation failed; keeping source title");
                title.to_owned()
            }
        }
    }

    async fn translate_halves(
        &self,
        text: &str,
        attempts: &mut Vec<TranslationAttempt>,
    ) -> Result<String, TranslateError> {
        let (first, second) = split_at_char_midpoint(text);

        let mut parts = Vec::with_capacity(2);
        for (scope, half) in [(Scope::FirstHalf, first), (Scope::SecondHalf, second)] {
            if half.trim().is_empty() {
                parts.push(String::new());
                continue;
            }
            match self.call(SPLIT_TIER, half, scope, attempts).await? {
                CallOutcome::Text(translated) => parts.push(translated),
                CallOutcome::Failed(err) => {
                    tracing::warn!(?scope, error = %err, "half translation failed; using marker");
                    parts.push(self.settings.untranslated_marker.clone());
                }
            }
        }

        Ok(parts.join(&self.settings.continuation_marker))
    }

    async fn call(
        &self,
        tier: Tier,
        text: &str,
        scope: Scope,
        attempts: &mut Vec<TranslationAttempt>,
    ) -> Result<CallOutcome, TranslateError> {
        let prompt = build_prompt(tier, &self.settings, text);
        let input_chars = text.chars().count();
        let mut rate_limited = 0usize;

        loop {
            let result = self.generator.generate(&prompt, &self.safety).await;
            let outcome = AttemptOutcome::of(&result);
            attempts.push(TranslationAttempt {
                tier,
                scope,
                input_chars,
                output_chars: result.as_ref().ok().map(|t| t.chars().count()),
                outcome,
            });

            match result {
                Ok(translated) if translated.trim().is_empty() => {
                    return Ok(CallOutcome::Failed(GenerateError::Empty));
                }
                Ok(translated) => return Ok(CallOutcome::Text(translated)),
                Err(GenerateError::RateLimited(message)) => {
                    if rate_limited >= self.settings.rate_limit_retries {
                        return Err(TranslateError::RateLimited {
                            tier,
                            retries: rate_limited,
                            message,
                        });
                    }
                    rate_limited += 1;
                    tracing::warn!(
                        tier = %tier,
                        retry = rate_limited,
                        backoff_ms = self.settings.rate_limit_backoff.as_millis() as u64,
                        "rate limited; retrying same tier"
                    );
                    tokio::time::sleep(self.settings.rate_limit_backoff).await;
                }
                Err(err) => return Ok(CallOutcome::Failed(err)),
            }
        }
    }
}

pub fn build_prompt(tier: Tier, settings: &TranslationSettings, text: &str) -> String {
    let source = &settings.source_language;
    let target = &settings.target_language;
    let instructions = match tier {
        Tier::Direct => format!(
            "Translate the following {source} web novel chapter into {target}.\n\
- Keep the tone, voice and emotion of the original.\n\
- Translate everything to the end. Do not stop early, summarize or add commentary.\n"
        ),
        Tier::Softened => format!(
            "Translate the following {source} web novel chapter into {target}.\n\
- Where a scene is sexually explicit or graphically violent, soften the wording and use euphemisms instead of explicit description.\n\
- Translate everything to the end. Do not stop early or add commentary.\n"
        ),
        Tier::Summary => format!(
            "Summarize the following {source} web novel chapter in {target}.\n\
- Narrate only the events, in order.\n\
- Omit explicit sexual or violent detail.\n"
        ),
    };

    format!("{instructions}\nOutput ONLY the {target} text.\n\nBEGIN_TEXT\n{text}\nEND_TEXT\n")
}

fn build_title_prompt(settings: &TranslationSettings, title: &str) -> String {
    format!(
        "Translate this {source} web novel chapter title into {target}.\n\
Output ONLY the translated title on a single line.\n\
\n\
BEGIN_TITLE\n{title}\nEND_TITLE\n",
        source = &settings.source_language,
        target = &settings.target_language,
    )
}

/// Keeps the first `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Splits at the middle character, so both halves stay valid UTF-8.
pub fn split_at_char_midpoint(text: &str) -> (&str, &str) {
    let mid = text.chars().count() / 2;
    let byte_idx = text
        .char_indices()
        .nth(mid)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    text.split_at(byte_idx)
}
