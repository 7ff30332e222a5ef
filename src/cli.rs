use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "rulepedia",
    about = "Index rulebook text chunks and discover game rules"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ingest pre-chunked document text from a JSONL file
    Ingest(IngestArgs),
    /// Hybrid semantic and keyword search across the corpus
    Search(SearchArgs),
    /// Discover rule chunks with the classifier
    Discover(DiscoverArgs),
    /// Remove a source document and all its chunks
    Remove(RemoveArgs),
    /// Show corpus statistics
    Status(StatusArgs),
    /// Drop the whole corpus, in memory and on disk
    Clear(ClearArgs),
}

#[derive(Debug, Parser)]
pub struct IngestArgs {
    /// JSONL file of chunk records, one per line:
    /// {"source_id": "...", "order": 0, "content": "..."}
    pub file: PathBuf,
}

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// Search query
    pub query: String,

    /// Number of results to return
    #[arg(short = 'n', long, default_value_t = 10)]
    pub count: usize,

    /// Minimum hybrid score in [0, 1]
    #[arg(long, default_value_t = 0.0)]
    pub threshold: f32,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct DiscoverArgs {
    /// Minimum classifier confidence for accepting a rule
    #[arg(
        long,
        default_value_t = crate::pipeline::DEFAULT_CONFIDENCE_THRESHOLD
    )]
    pub confidence: f32,

    /// Extra candidate words to probe in addition to the corpus-derived
    /// ones
    #[arg(long)]
    pub word: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct RemoveArgs {
    /// Source document id to remove
    pub source_id: String,
}

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct ClearArgs {
    /// Skip the confirmation prompt
    #[arg(long)]
    pub yes: bool,
}
