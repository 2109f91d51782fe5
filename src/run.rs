use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use url::Url;

use crate::cli::{RunArgs, TranslateArgs, TranslatorArgs};
use crate::config::{Settings, TranslationSettings, validate_translator_args};
use crate::fetch::KakuyomuFetcher;
use crate::gemini::GeminiClient;
use crate::notify::{NoopNotifier, Notifier, WebhookNotifier};
use crate::store::{ChapterStore, History};
use crate::translate::Orchestrator;
use crate::walker::{WalkOutcome, WalkReport, Walker};

pub async fn run(args: RunArgs) -> anyhow::Result<WalkReport> {
    let work_url = Url::parse(&args.work_url).context("parse --work-url")?;
    if work_url.scheme() != "http" && work_url.scheme() != "https" {
        anyhow::bail!("--work-url must be http/https: {work_url}");
    }
    let work_url = work_url.to_string();

    let settings = Settings::from_run_args(&args)?;
    let orchestrator = build_orchestrator(&args.translator, settings.translation.clone())?;
    let source = KakuyomuFetcher::new(&work_url, settings.fetch.clone())?;
    let notifier: Box<dyn Notifier> = match args.webhook_url.as_deref() {
        Some(url) if !url.trim().is_empty() => {
            Box::new(WebhookNotifier::new(url, settings.notify.clone())?)
        }
        _ => {
            tracing::warn!("no webhook configured; progress messages are disabled");
            Box::new(NoopNotifier)
        }
    };

    let mut store = ChapterStore::load(&args.store).context("load chapter store")?;
    let mut history = History::load(&args.history).context("load history")?;
    tracing::info!(
        work = %work_url,
        store = %store.path().display(),
        known_episodes = history.len(),
        "starting walk"
    );

    let mut walker = Walker {
        source: &source,
        orchestrator: &orchestrator,
        notifier: notifier.as_ref(),
        store: &mut store,
        history: &mut history,
        settings: settings.walk.clone(),
    };
    let report = walker.walk(&work_url).await.context("walk episodes")?;

    match &report.outcome {
        WalkOutcome::Done => tracing::info!(
            visited = report.visited,
            translated = report.translated,
            skipped = report.skipped,
            untranslated = report.untranslated,
            "walk finished"
        ),
        WalkOutcome::Failed {
            ordinal,
            url,
            reason,
        } => tracing::error!(
            episode = ordinal,
            url = ?url,
            %reason,
            visited = report.visited,
            translated = report.translated,
            "walk failed"
        ),
    }

    Ok(report)
}

pub async fn translate_file(args: TranslateArgs) -> anyhow::Result<()> {
    let input = std::fs::read_to_string(&args.input)
        .with_context(|| format!("read input text: {}", &args.input))?;

    let settings = TranslationSettings::from_args(&args.translator);
    let orchestrator = build_orchestrator(&args.translator, settings)?;

    tracing::info!(
        model = %args.translator.model,
        to = %args.translator.target_language,
        out = %args.out,
        "translate file"
    );
    let translation = orchestrator
        .translate(&input)
        .await
        .context("translate input text")?;
    tracing::info!(
        resolved_by = ?translation.resolved_by,
        attempts = translation.attempts.len(),
        "translation finished"
    );

    write_output(&args.out, &translation.text, args.force)
}

fn build_orchestrator(
    args: &TranslatorArgs,
    settings: TranslationSettings,
) -> anyhow::Result<Orchestrator> {
    validate_translator_args(args)?;
    let client = GeminiClient::from_env(
        &args.gemini_base_url,
        &args.model,
        Duration::from_secs(args.gemini_timeout_secs),
    )?;
    Ok(Orchestrator::new(Arc::new(client), settings))
}

fn write_output(path: &str, contents: &str, force: bool) -> anyhow::Result<()> {
    let out_path = Path::new(path);
    if out_path.exists() && !force {
        anyhow::bail!("output already exists: {} (use --force)", out_path.display());
    }

    if let Some(parent) = out_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir: {}", parent.display()))?;
    }

    std::fs::write(out_path, contents)
        .with_context(|| format!("write output: {}", out_path.display()))?;
    Ok(())
}
