use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use extrato_classify::CancelFlag;
use extrato_core::StatementKind;
use tracing_subscriber::EnvFilter;

mod cache_store;
mod commands;
mod export;
mod loader;

use commands::CategorizeArgs;
use export::ExportFormat;

#[derive(Parser, Debug)]
#[command(name = "extrato", version, about = "Categorize bank and credit-card statement transactions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Categorize extracted transactions and export the report
    Categorize {
        /// Extractor output CSV files, combined in the order given
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Pattern file (CSV with `pattern` and `category` columns)
        #[arg(long, short)]
        rules: PathBuf,

        /// Pipeline configuration (TOML)
        #[arg(long, short)]
        config: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,

        /// Write the report here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Statement type for rows without a `statement` column
        #[arg(long, default_value = "bank")]
        statement: StatementKind,

        /// Skip the AI fallback tier
        #[arg(long)]
        no_ai: bool,

        /// AI cache file (defaults to the user cache directory)
        #[arg(long, conflicts_with = "no_cache")]
        cache: Option<PathBuf>,

        /// Do not read or write the AI cache file
        #[arg(long)]
        no_cache: bool,
    },

    /// Inspect or edit a pattern file
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },

    /// Write a starter pattern file
    Template {
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum RulesAction {
    /// Show rule counts per mode and category, and skipped rows
    Stats { file: PathBuf },

    /// Add a rule, or change the category of an existing pattern
    Add {
        file: PathBuf,
        /// Wrap in `*` for substring matching, e.g. `*uber*`
        pattern: String,
        category: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Categorize {
            inputs,
            rules,
            config,
            format,
            output,
            statement,
            no_ai,
            cache,
            no_cache,
        } => {
            let cache = if no_cache {
                None
            } else {
                cache.or_else(cache_store::default_cache_path)
            };

            // Ctrl-C stops new AI calls; the report is still produced.
            let cancel = CancelFlag::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupted, finishing in-flight AI calls");
                    on_interrupt.cancel();
                }
            });

            let args = CategorizeArgs {
                inputs,
                rules,
                config,
                format,
                output,
                statement,
                no_ai,
                cache,
            };
            commands::categorize(args, &cancel).await?;
        }

        Command::Rules { action } => match action {
            RulesAction::Stats { file } => {
                commands::rules_stats(&file, std::io::stdout().lock())?;
            }
            RulesAction::Add {
                file,
                pattern,
                category,
            } => {
                commands::add_rule(&file, &pattern, &category)?;
            }
        },

        Command::Template { output } => {
            commands::template(output.as_deref())?;
        }
    }

    Ok(())
}
