mod commands;
mod config;
mod error;
mod logging;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

use crate::commands::eval::{cmd_eval, EvalArgs};
use crate::commands::laws::cmd_laws;
use crate::config::Config;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Evaluate legal rule specifications.
#[derive(Parser)]
#[command(name = "statute", version, about = "Evaluate legal rule specifications")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Path to the config file (default: ./statute.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding rule JSON files (overrides the config)
    #[arg(long, global = true)]
    rules_dir: Option<PathBuf>,

    /// Log filter, e.g. "debug" (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a law as executed by a service
    Eval {
        /// Service executing the law, e.g. TOESLAGEN
        #[arg(long)]
        service: String,
        /// Law identifier, e.g. zorgtoeslagwet
        #[arg(long)]
        law: String,
        /// Reference date (YYYY-MM-DD); defaults to the config or today
        #[arg(long)]
        date: Option<String>,
        /// Parameter as NAME=VALUE; VALUE is read as JSON when possible
        #[arg(long = "param")]
        params: Vec<String>,
        /// JSON object file of parameters
        #[arg(long = "params")]
        params_file: Option<PathBuf>,
        /// Source table rows as SERVICE:TABLE=FILE (JSON list of objects)
        #[arg(long = "source")]
        sources: Vec<String>,
        /// JSON list of claims
        #[arg(long)]
        claims: Option<PathBuf>,
        /// JSON list of case events
        #[arg(long)]
        events: Option<PathBuf>,
        /// Overwritten value as SERVICE.FIELD=VALUE
        #[arg(long = "overwrite")]
        overwrites: Vec<String>,
        /// Only evaluate this output and what it depends on
        #[arg(long)]
        requested: Option<String>,
        /// Use approved claims only
        #[arg(long)]
        approved: bool,
        /// Also show the values the evaluation used
        #[arg(long)]
        explain: bool,
    },

    /// List the laws per service found in the rules directory
    Laws,
}

fn main() {
    let cli = Cli::parse();

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            report_error(&format!("error: {}", e), cli.output, cli.quiet);
            process::exit(1);
        }
    };
    if let Some(dir) = cli.rules_dir {
        config.rules_dir = dir;
    }
    logging::init(cli.log.as_deref().unwrap_or(&config.log));

    let result = match cli.command {
        Commands::Eval {
            service,
            law,
            date,
            params,
            params_file,
            sources,
            claims,
            events,
            overwrites,
            requested,
            approved,
            explain,
        } => {
            let args = EvalArgs {
                service,
                law,
                date,
                params,
                params_file,
                sources,
                claims,
                events,
                overwrites,
                requested,
                approved,
                explain,
            };
            cmd_eval(&args, &config, cli.output, cli.quiet)
        }
        Commands::Laws => cmd_laws(&config, cli.output, cli.quiet),
    };

    if let Err(e) = result {
        report_error(&format!("error: {}", e), cli.output, cli.quiet);
        process::exit(1);
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
