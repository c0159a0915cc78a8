//! Command-line arguments.

use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use clap::Parser;
use quickjs_bridge::RuntimeConfig;

/// Evaluate JavaScript with the embedded `QuickJS` engine.
#[derive(Debug, Parser)]
#[command(name = "qjs", version, about = "Evaluate JavaScript with the embedded QuickJS engine", long_about = None)]
pub struct Cli {
    /// Script to run; starts a REPL when neither a script nor `--eval` is given
    #[arg(value_name = "FILE")]
    pub script: Option<PathBuf>,

    /// Evaluate this code and print its result
    #[arg(short, long, value_name = "CODE", conflicts_with = "script")]
    pub eval: Option<String>,

    /// Treat the input as an ES module
    #[arg(short, long)]
    pub module: bool,

    /// Write bytecode to this file instead of running
    #[arg(long, value_name = "OUT")]
    pub compile: Option<PathBuf>,

    /// The script file is bytecode produced by `--compile`
    #[arg(long, requires = "script", conflicts_with = "compile")]
    pub bytecode: bool,

    /// Print the engine's memory usage as JSON when done
    #[arg(long)]
    pub memory_usage: bool,

    /// TOML file with runtime limits
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Heap limit in bytes, overriding the config file
    #[arg(long, value_name = "BYTES")]
    pub memory_limit: Option<usize>,

    /// Stack limit in bytes, overriding the config file
    #[arg(long, value_name = "BYTES")]
    pub max_stack_size: Option<usize>,
}

impl Cli {
    /// Runtime limits from the config file with command-line overrides applied.
    ///
    /// # Errors
    /// Returns an error if the config file cannot be loaded or a limit is invalid.
    pub fn runtime_config(&self) -> Result<RuntimeConfig> {
        let mut config = self.config.as_deref().map_or_else(
            || Ok(RuntimeConfig::default()),
            |path| {
                RuntimeConfig::load(path)
                    .with_context(|| format!("Failed to load config from {}", path.display()))
            },
        )?;
        if let Some(limit) = self.memory_limit {
            config = config.with_memory_limit(limit);
        }
        if let Some(size) = self.max_stack_size {
            config = config.with_max_stack_size(size);
        }
        config.validate()?;
        Ok(config)
    }

    /// Whether to read code interactively.
    pub fn is_interactive(&self) -> bool {
        self.script.is_none() && self.eval.is_none()
    }

    /// Reject flag combinations clap cannot express.
    ///
    /// # Errors
    /// Returns an error when `--compile` has no input.
    pub fn check(&self) -> Result<()> {
        if self.compile.is_some() && self.is_interactive() {
            bail!("--compile needs a script file or --eval");
        }
        Ok(())
    }
}
