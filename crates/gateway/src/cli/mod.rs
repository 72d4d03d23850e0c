//! Command-line interface.

pub mod investigate;
pub mod search;
pub mod status;
pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use quarry_domain::config::Config;
use quarry_domain::Result;

#[derive(Parser)]
#[command(
    name = "quarry",
    version,
    about = "Quarry — agentic OSINT investigation runtime"
)]
pub struct Cli {
    /// Verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (defaults to ./quarry.toml when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// LLM provider override (e.g. "stub").
    #[arg(long, global = true)]
    pub llm: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a full investigation.
    Investigate {
        /// Investigation goal (natural language).
        goal: String,
        /// Max agent turns.
        #[arg(long)]
        max_turns: Option<u32>,
        /// Skip auto sanctions screening.
        #[arg(long)]
        no_sanctions: bool,
        /// Skip auto news check.
        #[arg(long)]
        no_news: bool,
        /// Show the investigation plan without executing tools.
        #[arg(long)]
        dry_run: bool,
        /// Pause before each tool call for approval.
        #[arg(short, long)]
        interactive: bool,
        /// Auto-save the session to this path.
        #[arg(short, long)]
        save: Option<PathBuf>,
        /// Resume from a saved session file.
        #[arg(long)]
        resume: Option<PathBuf>,
        /// Save the scrubbed report to a file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Quick entity search.
    Search {
        query: String,
        /// Entity type filter (e.g. Person, Company).
        #[arg(long = "type", default_value = "Any")]
        entity_type: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Run a predefined workflow.
    Workflow {
        name: String,
        /// Investigation target substituted into the workflow steps.
        #[arg(long)]
        target: String,
        /// Preview the steps without executing.
        #[arg(long)]
        dry_run: bool,
    },
    /// Show system status.
    Status,
    /// Start the HTTP/WebSocket server.
    Serve {
        /// Bind address override (e.g. 0.0.0.0:8700).
        #[arg(long)]
        bind: Option<String>,
    },
}

/// Load the config file named by `--config`, or the default lookup.
pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    if let Some(llm) = &cli.llm {
        config.agent.llm_provider = llm.clone();
        config.llm.default_provider = llm.clone();
    }
    Ok(config)
}
