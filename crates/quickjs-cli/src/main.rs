//! `qjs` - run JavaScript through the `QuickJS` bridge
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        clippy::print_stdout,
        clippy::print_stderr,
        reason = "Allow for tests"
    )
)]

use std::io::{self, Write as _};
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::Parser as _;
use cli::Cli;
use quickjs_bridge::EvalRequest;
use session::Session;
use tokio::fs as async_fs;
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

mod cli;
mod host;
mod repl;
mod session;

/// File name used for `--eval` code.
const EVAL_FILENAME: &str = "<eval>";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so script output on stdout stays clean
    Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(fmt::layer().with_writer(io::stderr).with_target(true))
        .init();

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::debug!("qjs failed: {error:?}");
            if writeln!(io::stderr().lock(), "{error:#}").is_err() {
                return ExitCode::from(2);
            }
            ExitCode::FAILURE
        }
    }
}

/// Dispatch on the selected mode.
async fn run(cli: &Cli) -> Result<()> {
    cli.check()?;
    let config = cli.runtime_config()?;
    let mut session = Session::new(&config)?;

    if cli.is_interactive() {
        repl::run(&mut session).await?;
    } else if let Some(output) = &cli.compile {
        let request = request(cli).await?;
        let bytecode = session.compile(&request)?;
        async_fs::write(output, &bytecode)
            .await
            .with_context(|| format!("Failed to write {}", output.display()))?;
        tracing::info!("Wrote {} bytes of bytecode to {}", bytecode.len(), output.display());
    } else if cli.bytecode {
        let path = script_path(cli)?;
        let bytecode = async_fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        session.execute(&bytecode).await?;
    } else {
        let request = request(cli).await?;
        let value = session.run(&request).await?;
        if cli.eval.is_some()
            && let Some(text) = repl::display(&value)
        {
            writeln!(io::stdout().lock(), "{text}")?;
        }
    }

    if cli.memory_usage {
        writeln!(io::stdout().lock(), "{}", session.memory_usage()?)?;
    }
    Ok(())
}

/// Evaluation request for `--eval` code or the script file.
async fn request(cli: &Cli) -> Result<EvalRequest> {
    let request = if let Some(code) = &cli.eval {
        EvalRequest::new(code.as_str()).filename(EVAL_FILENAME)
    } else {
        let path = script_path(cli)?;
        let code = async_fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        EvalRequest::new(code).filename(path.display().to_string())
    };
    Ok(if cli.module { request.module() } else { request })
}

/// The script argument, required outside `--eval` and the REPL.
fn script_path(cli: &Cli) -> Result<&Path> {
    cli.script
        .as_deref()
        .context("A script file is required")
}
