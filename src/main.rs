use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use deep_research::{Config, ResearchParams, ResearchProgress, ResearchService};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Research a topic recursively with a local model and web search.
#[derive(Parser, Debug)]
#[command(name = "deep-research", version, about, long_about = None)]
struct Cli {
    /// Topic or question to research
    topic: String,

    /// Sub-queries generated per level (defaults to research.default_breadth)
    #[arg(short, long)]
    breadth: Option<usize>,

    /// Levels of follow-up research (defaults to research.default_depth)
    #[arg(short, long)]
    depth: Option<usize>,

    /// Write a markdown report instead of listing learnings
    #[arg(short, long)]
    report: bool,

    /// Write the output to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print learnings and sources as JSON
    #[arg(long, conflicts_with = "report")]
    json: bool,

    /// Config file (defaults to ~/.config/deep-research/config.toml)
    #[arg(short, long, env = "DEEP_RESEARCH_CONFIG")]
    config: Option<PathBuf>,
}

fn init_tracing() {
    let default = if std::env::var("DEEP_RESEARCH_DEBUG").is_ok() {
        "deep_research=debug"
    } else {
        "deep_research=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter),
        )
        .init();
}

fn print_progress(p: &ResearchProgress) {
    eprintln!(
        "[{}/{}] depth {}/{} breadth {}/{}{}",
        p.completed_queries,
        p.total_queries,
        p.current_depth,
        p.total_depth,
        p.current_breadth,
        p.total_breadth,
        p.current_query
            .as_deref()
            .map(|q| format!(" :: {q}"))
            .unwrap_or_default()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;
    let service = ResearchService::from_config(&config)
        .context("Failed to initialise research service")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, finishing in-flight queries...");
            on_interrupt.cancel();
        }
    });

    let params = ResearchParams {
        topic: cli.topic.clone(),
        breadth: cli.breadth,
        depth: cli.depth,
    };
    let result = service
        .research_with(params, Some(Arc::new(print_progress)), &cancel)
        .await?;

    let output = if cli.report {
        service.write_report(&cli.topic, &result).await?
    } else if cli.json {
        serde_json::to_string_pretty(&result)?
    } else {
        let mut text = String::from("Learnings:\n");
        for learning in &result.learnings {
            text.push_str(&format!("\n- {learning}"));
        }
        text.push_str("\n\nVisited URLs:\n");
        for url in &result.visited_urls {
            text.push_str(&format!("\n- {url}"));
        }
        text.push('\n');
        text
    };

    match &cli.output {
        Some(path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(output.as_bytes())?;
            stdout.flush()?;
        }
    }

    Ok(())
}
