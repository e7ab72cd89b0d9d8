use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "herbtrace",
    about = "Herbal batch provenance ledger",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Raise log verbosity (-v info, -vv debug). `RUST_LOG` wins when set.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML configuration file (same schema as the server's).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the commit log. Overrides the config file.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server
    Serve(ServeArgs),
    /// Create a batch with its collection event
    Create(CreateArgs),
    /// Record a processing step for a batch
    Process(AppendArgs),
    /// Record a lab quality test for a batch
    LabTest(AppendArgs),
    /// Show a batch's event history
    History(HistoryArgs),
    /// List every batch
    Batches,
    /// Show batches waiting for the next custody stage
    Pending(PendingArgs),
    /// Show the consumer provenance view of a batch
    Provenance(BatchArgs),
    /// Audit stored histories against the ledger invariants
    Verify(VerifyArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    #[arg(long)]
    pub bind: Option<String>,
    /// Require a credential on read routes too.
    #[arg(long)]
    pub no_anonymous_read: bool,
}

/// Event content, as a JSON document and/or individual fields.
#[derive(Args, Debug)]
pub struct EventArgs {
    /// Caller organization credential.
    #[arg(long)]
    pub org: String,
    /// Event payload as a JSON object.
    #[arg(long)]
    pub payload: Option<String>,
    /// Extra `key=value` field; text attributes such as `quality` stay strings,
    /// other values that parse as JSON keep their type.
    #[arg(short = 'f', long = "field", value_parser = parse_field)]
    pub fields: Vec<(String, String)>,
}

#[derive(Args)]
pub struct CreateArgs {
    /// Batch id; a fresh `BATCH-...` id is minted when omitted.
    pub batch_id: Option<String>,
    #[command(flatten)]
    pub event: EventArgs,
}

#[derive(Args)]
pub struct AppendArgs {
    pub batch_id: String,
    #[command(flatten)]
    pub event: EventArgs,
}

#[derive(Args)]
pub struct HistoryArgs {
    pub batch_id: String,
    /// Print the stored JSON unmodified.
    #[arg(long)]
    pub raw: bool,
}

#[derive(Args)]
pub struct BatchArgs {
    pub batch_id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum PendingStage {
    Processing,
    Testing,
}

#[derive(Args)]
pub struct PendingArgs {
    #[arg(value_enum)]
    pub stage: PendingStage,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// Audit only this batch.
    pub batch_id: Option<String>,
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got {raw:?}")),
    }
}
