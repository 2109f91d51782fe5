use std::time::Duration;

use crate::cli::{RunArgs, TranslatorArgs};

pub const DEFAULT_MAX_CHARS: usize = 15_000;
pub const UNTRANSLATED_MARKER: &str = "[this portion could not be translated]";
pub const CONTINUATION_MARKER: &str = "\n\n(continued)\n\n";
pub const APOLOGY_TEXT: &str = "Sorry, this chapter could not be translated.";

/// Knobs of the translation orchestrator.
#[derive(Debug, Clone)]
pub struct TranslationSettings {
    pub source_language: String,
    pub target_language: String,
    pub max_chars: usize,
    pub escalation_delay: Duration,
    pub rate_limit_backoff: Duration,
    pub rate_limit_retries: usize,
    pub split_fallback: bool,
    pub untranslated_marker: String,
    pub continuation_marker: String,
    pub apology: String,
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self {
            source_language: "Japanese".to_owned(),
            target_language: "Thai".to_owned(),
            max_chars: DEFAULT_MAX_CHARS,
            escalation_delay: Duration::from_secs(5),
            rate_limit_backoff: Duration::from_secs(30),
            rate_limit_retries: 5,
            split_fallback: true,
            untranslated_marker: UNTRANSLATED_MARKER.to_owned(),
            continuation_marker: CONTINUATION_MARKER.to_owned(),
            apology: APOLOGY_TEXT.to_owned(),
        }
    }
}

impl TranslationSettings {
    pub fn from_args(args: &TranslatorArgs) -> Self {
        Self {
            source_language: args.source_language.clone(),
            target_language: args.target_language.clone(),
            max_chars: args.max_chars,
            escalation_delay: Duration::from_millis(args.escalation_delay_ms),
            rate_limit_backoff: Duration::from_millis(args.rate_limit_backoff_ms),
            rate_limit_retries: args.rate_limit_retries,
            split_fallback: !args.no_split,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub attempts: usize,
    pub delay: Duration,
    pub timeout: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(3),
            timeout: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WalkSettings {
    pub episode_delay: Duration,
    pub max_episodes: Option<usize>,
}

impl Default for WalkSettings {
    fn default() -> Self {
        Self {
            episode_delay: Duration::from_secs(30),
            max_episodes: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotifySettings {
    pub chunk_chars: usize,
    pub chunk_delay: Duration,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            chunk_chars: 1_900,
            chunk_delay: Duration::from_secs(1),
        }
    }
}

/// Everything `run` needs, resolved once from the command line.
#[derive(Debug, Clone)]
pub struct Settings {
    pub translation: TranslationSettings,
    pub fetch: FetchSettings,
    pub walk: WalkSettings,
    pub notify: NotifySettings,
}

impl Settings {
    pub fn from_run_args(args: &RunArgs) -> anyhow::Result<Self> {
        if args.fetch_attempts == 0 {
            anyhow::bail!("--fetch-attempts must be > 0");
        }
        if args.chunk_chars == 0 {
            anyhow::bail!("--chunk-chars must be > 0");
        }
        validate_translator_args(&args.translator)?;

        Ok(Self {
            translation: TranslationSettings::from_args(&args.translator),
            fetch: FetchSettings {
                attempts: args.fetch_attempts,
                delay: Duration::from_millis(args.fetch_delay_ms),
                timeout: Duration::from_secs(args.fetch_timeout_secs),
            },
            walk: WalkSettings {
                episode_delay: Duration::from_millis(args.episode_delay_ms),
                max_episodes: args.max_episodes,
            },
            notify: NotifySettings {
                chunk_chars: args.chunk_chars,
                chunk_delay: Duration::from_millis(args.chunk_delay_ms),
            },
        })
    }
}

pub fn validate_translator_args(args: &TranslatorArgs) -> anyhow::Result<()> {
    if args.max_chars == 0 {
        anyhow::bail!("--max-chars must be > 0");
    }
    Ok(())
}
