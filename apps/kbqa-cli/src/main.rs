mod wiring;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use kbqa_core::config::Config;
use kbqa_hybrid::{parse_signals, ConfidenceGate};
use kbqa_vector::{get_or_create_collection, open_db, LanceCorpusWriter};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::wiring::{load_corpus, load_embedder, path_str, router_llm, Paths};

#[derive(Parser, Debug)]
#[command(author, version, about = "kbqa: hybrid retrieval QA with confidence-gated escalation", long_about = None)]
struct Cli {
    /// Directory holding config.toml; relative data paths resolve against it.
    #[arg(long, global = true, default_value = ".")]
    base: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer a question end to end and print the final result as JSON.
    Ask { query: String },

    /// Run retrieval and context assembly only; no chat model is called.
    Retrieve { query: String },

    /// Route a query from retrieval signals without retrieving.
    Route {
        #[arg(long)]
        query: String,
        /// Signals as JSON or a Python-style dict, e.g. "{top1: 0.4, hits: 5}".
        #[arg(long, default_value = "{}")]
        signals: String,
        #[arg(long)]
        top1: Option<f32>,
        #[arg(long)]
        avg_top5: Option<f32>,
        #[arg(long)]
        hits: Option<usize>,
        #[arg(long, num_args = 0..)]
        sections: Option<Vec<String>>,
    },

    /// Embed the corpus into the vector collection.
    Index {
        #[arg(long, default_value_t = 1000)]
        batch_size: usize,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match env::var("KBQA_LOG_FORMAT").as_deref() {
        Ok("json") => registry.with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr)).init(),
        _ => registry.with(fmt::layer().compact().with_writer(std::io::stderr)).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = Config::load_in(&cli.base)?.pipeline()?;
    let paths = Paths { base: cli.base.clone() };

    match cli.command {
        Commands::Ask { query } => {
            let pipeline = wiring::build_pipeline(cfg, &paths).await?;
            let result = pipeline.answer(&query).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Retrieve { query } => {
            let pipeline = wiring::build_pipeline(cfg, &paths).await?;
            let retrieval = pipeline.retrieve(&query).await?;
            let context = pipeline.assemble_context(&retrieval.reranked)?;
            println!("{}", serde_json::to_string_pretty(&json!({ "retrieval": retrieval, "context": context }))?);
        }
        Commands::Route { query, signals, top1, avg_top5, hits, sections } => {
            let mut s = parse_signals(&signals);
            if let Some(v) = top1 { s.top1 = v; }
            if let Some(v) = avg_top5 { s.avg_top5 = v; }
            if let Some(v) = hits { s.hits = v; }
            if let Some(v) = sections { s.sections = v; }
            let gate = ConfidenceGate::new(router_llm(&cfg)?, cfg.router.clone(), cfg.timeouts.chat());
            let decision = gate.route(&query, &s).await;
            println!("{}", serde_json::to_string_pretty(&json!({ "signals": s, "decision": decision }))?);
        }
        Commands::Index { batch_size } => {
            let start = Instant::now();
            let corpus = load_corpus(&cfg, &paths)?;
            let embedder = load_embedder(&cfg, &paths)?;
            let dim = embedder.dim();

            let conn = open_db(&path_str(&paths.resolve(&cfg.data.lancedb_dir))?).await?;
            let table = get_or_create_collection(&conn, &cfg.data.table, i32::try_from(dim)?).await?;
            let existing = table.count_rows(None).await?;
            if existing > 0 {
                bail!("collection '{}' already holds {existing} rows; remove {} to rebuild", cfg.data.table, cfg.data.lancedb_dir);
            }

            let units = corpus.units().to_vec();
            let texts: Vec<String> = units.iter().map(|u| u.text.clone()).collect();
            let worker = Arc::clone(&embedder);
            let embeddings = tokio::task::spawn_blocking(move || worker.embed_batch(&texts)).await??;

            let written = LanceCorpusWriter::new(table, dim)?.with_batch_size(batch_size).write(&units, &embeddings).await?;
            info!(written, ms = start.elapsed().as_millis(), "index complete");
            println!("Indexed {written} units into '{}'", cfg.data.table);
        }
    }
    Ok(())
}
