use std::io::BufRead;

use clap::Parser;
use tracing_subscriber::EnvFilter;

pub mod associations;
pub mod chunk_id;
pub mod chunk_store;
pub mod classifier;
pub mod cli;
pub mod data_dir;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod scheduler;
pub mod state_db;
pub mod tokenize;
pub mod vector_index;

use chunk_store::ChunkRecord;
use classifier::KeywordClassifier;
use cli::{Cli, Command};
use data_dir::DataDir;
use engine::{Engine, EngineConfig};
use state_db::StateDb;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("RULEPEDIA_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let state_db = StateDb::open(&data_dir.state_db())?;
    let mut engine = Engine::open(state_db, EngineConfig::default())?;

    match cli.command {
        Command::Ingest(args) => ingest(&mut engine, &args)?,
        Command::Search(args) => search(&engine, &args)?,
        Command::Discover(args) => discover(&engine, &args)?,
        Command::Remove(args) => {
            let removed = engine.remove_source(&args.source_id);
            engine.force_flush()?;
            println!("Removed {removed} chunk(s) from {}", args.source_id);
        }
        Command::Status(args) => status(&engine, &args)?,
        Command::Clear(args) => clear(&mut engine, &args)?,
    }

    Ok(())
}

fn ingest(engine: &mut Engine, args: &cli::IngestArgs) -> error::Result<()> {
    let file = std::fs::File::open(&args.file)?;
    let reader = std::io::BufReader::new(file);

    let mut records = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ChunkRecord>(&line) {
            Ok(record) => records.push(record),
            Err(err) => {
                tracing::warn!(
                    line = line_no + 1,
                    %err,
                    "skipping malformed chunk record"
                );
            }
        }
    }

    if records.is_empty() {
        println!("No chunk records found in {}", args.file.display());
        return Ok(());
    }

    let count = records.len();
    let ids = engine.ingest_batch(records)?;

    // Wait out the debounce window so the batch is durable before exit.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| {
            error::Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;
    runtime.block_on(engine.flush_pending())?;

    println!(
        "Ingested {} of {count} chunk(s) from {}",
        ids.len(),
        args.file.display()
    );
    Ok(())
}

fn search(engine: &Engine, args: &cli::SearchArgs) -> error::Result<()> {
    let hits = engine.search(&args.query, args.count, args.threshold)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{:>3}. [{:.3}] {}:{} {} (semantic {:.3}, keyword {:.3})",
            i + 1,
            hit.hybrid_score,
            hit.source_id,
            hit.order,
            hit.chunk_id,
            hit.semantic_score,
            hit.keyword_score,
        );
        if !hit.section_context.is_empty() {
            println!("     [{}]", hit.section_context);
        }
        let preview: String = hit.content.chars().take(120).collect();
        println!("     {preview}");
    }
    println!("\n{} result(s)", hits.len());
    Ok(())
}

fn discover(engine: &Engine, args: &cli::DiscoverArgs) -> error::Result<()> {
    let classifier = KeywordClassifier;
    let rules = if args.word.is_empty() {
        engine.discover_rules(&classifier, args.confidence)
    } else {
        engine.discover_rules_for_words(
            &args.word,
            &classifier,
            args.confidence,
        )
    };
    let stats = pipeline::summarize(&rules);

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "rules": rules,
                "stats": stats,
            }))?
        );
        return Ok(());
    }

    for rule in &rules {
        println!(
            "chunk {} [{:.2}] {} ({})",
            rule.chunk.order,
            rule.classification.confidence,
            rule.classification.rule_name,
            rule.associated_words.join(", "),
        );
    }
    println!(
        "\n{} rule(s), average confidence {:.2}",
        stats.total_rules, stats.average_confidence
    );
    Ok(())
}

fn status(engine: &Engine, args: &cli::StatusArgs) -> error::Result<()> {
    let stats = engine.stats();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Chunks:           {}", stats.total_chunks);
    println!("Words:            {}", stats.total_words);
    println!("Documents:        {}", stats.unique_documents);
    println!("Vocabulary:       {}", stats.vocabulary_size);
    println!("Vocabulary epoch: {}", stats.vocabulary_epoch);
    println!("Indexed vectors:  {}", stats.indexed_vectors);
    println!("Pending writes:   {}", stats.pending_writes);
    Ok(())
}

fn clear(engine: &mut Engine, args: &cli::ClearArgs) -> error::Result<()> {
    if !args.yes {
        eprintln!("Refusing to clear without --yes");
        return Ok(());
    }
    engine.clear()?;
    println!("Corpus cleared.");
    Ok(())
}
