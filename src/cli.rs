use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Walk a work from its first episode, translating and publishing each one.
    Run(RunArgs),
    /// Translate a local text file with the same fallback ladder as `run`.
    Translate(TranslateArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Work (table of contents) URL (must be http/https).
    #[arg(long)]
    pub work_url: String,

    /// JSON chapter store, keyed by work URL.
    #[arg(long, default_value = "novels.json")]
    pub store: String,

    /// Newline-delimited list of episode URLs already processed.
    #[arg(long, default_value = "history.txt")]
    pub history: String,

    /// Discord-compatible webhook for progress messages.
    #[arg(long, env = "NOVELCHAIN_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Stop after this many episodes (skipped ones included).
    #[arg(long)]
    pub max_episodes: Option<usize>,

    /// Delay between episodes (politeness).
    #[arg(long, default_value_t = 30_000)]
    pub episode_delay_ms: u64,

    /// Attempts per episode page before the walk gives up.
    #[arg(long, default_value_t = 3)]
    pub fetch_attempts: usize,

    /// Delay before each episode page request.
    #[arg(long, default_value_t = 3_000)]
    pub fetch_delay_ms: u64,

    /// Per-request timeout for episode pages.
    #[arg(long, default_value_t = 20)]
    pub fetch_timeout_secs: u64,

    /// Maximum characters per webhook message.
    #[arg(long, default_value_t = 1_900)]
    pub chunk_chars: usize,

    /// Pause between webhook message parts.
    #[arg(long, default_value_t = 1_000)]
    pub chunk_delay_ms: u64,

    #[command(flatten)]
    pub translator: TranslatorArgs,
}

#[derive(Debug, Args)]
pub struct TranslateArgs {
    /// Input text file.
    #[arg(long)]
    pub input: String,

    /// Output file path.
    #[arg(long)]
    pub out: String,

    /// Overwrite the output file if it exists.
    #[arg(long, default_value_t = false)]
    pub force: bool,

    #[command(flatten)]
    pub translator: TranslatorArgs,
}

#[derive(Debug, Clone, Args)]
pub struct TranslatorArgs {
    /// Gemini model name.
    #[arg(long, default_value = "gemini-1.5-flash")]
    pub model: String,

    /// Gemini REST API base URL.
    #[arg(
        long,
        env = "NOVELCHAIN_GEMINI_BASE_URL",
        default_value = "https://generativelanguage.googleapis.com/v1beta"
    )]
    pub gemini_base_url: String,

    /// HTTP timeout for a single generation call.
    #[arg(long, default_value_t = 300)]
    pub gemini_timeout_secs: u64,

    /// Language of the source text.
    #[arg(long, default_value = "Japanese")]
    pub source_language: String,

    /// Language to translate into.
    #[arg(long, default_value = "Thai")]
    pub target_language: String,

    /// Characters of the body sent for translation; the rest is dropped.
    #[arg(long, default_value_t = 15_000)]
    pub max_chars: usize,

    /// Pause before escalating to the next strategy.
    #[arg(long, default_value_t = 5_000)]
    pub escalation_delay_ms: u64,

    /// Pause before retrying a rate-limited call.
    #[arg(long, default_value_t = 30_000)]
    pub rate_limit_backoff_ms: u64,

    /// Rate-limited retries allowed per call before giving up on the text.
    #[arg(long, default_value_t = 5)]
    pub rate_limit_retries: usize,

    /// Disable the split-in-half fallback after the summary strategy fails.
    #[arg(long, default_value_t = false)]
    pub no_split: bool,
}
