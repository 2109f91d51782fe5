use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    match try_main().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn try_main() -> anyhow::Result<ExitCode> {
    novelchain::logging::init().context("init logging")?;

    let cli = novelchain::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        novelchain::cli::Command::Run(args) => {
            let report = novelchain::run::run(args).await.context("run")?;
            if report.is_failed() {
                return Ok(ExitCode::FAILURE);
            }
        }
        novelchain::cli::Command::Translate(args) => {
            novelchain::run::translate_file(args)
                .await
                .context("translate")?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
