use anyhow::Context;
use clap::Parser;
use linkwalk::{
    Cli, CrawlHandle, DiscoveryParser, Frontier, HtmlTokenizer, MemoryFrontier, QueuedUrl,
    DEFAULT_FRONTIER_QUEUE,
};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::process;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    init_tracing();
    if let Err(err) = run(Cli::parse()) {
        eprintln!("{}: {err:#}", env!("CARGO_PKG_NAME"));
        process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

/// One line of `--json` output.
#[derive(Debug, Serialize)]
struct QueuedRecord<'a> {
    url: &'a str,
    referrer: &'a str,
    depth: u8,
}

impl<'a> QueuedRecord<'a> {
    fn from_queued(queued: &'a QueuedUrl) -> Option<Self> {
        Some(Self {
            url: queued.url().as_str(),
            referrer: queued.referrer()?.as_str(),
            depth: queued.depth(),
        })
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let controls = Arc::new(cli.build_controls());
    let frontier = Arc::new(MemoryFrontier::<DEFAULT_FRONTIER_QUEUE>::with_max_depth(
        controls.max_depth(),
    ));

    let origin = frontier
        .canonicalize(cli.origin.as_str())
        .context("origin is not a crawlable URL")?;
    frontier
        .push_seed(&origin)
        .context("failed to seed frontier")?;

    let input: Box<dyn Read> = match cli.input_path() {
        Some(path) => Box::new(
            File::open(path).with_context(|| format!("failed to open '{}'", path.display()))?,
        ),
        None => Box::new(io::stdin().lock()),
    };

    let handle = CrawlHandle::new(Arc::clone(&frontier) as Arc<dyn Frontier>, controls);
    let mut parser = DiscoveryParser::new(origin, HtmlTokenizer::new(input), handle);
    parser.read_all().context("failed to read document")?;

    let mut out = BufWriter::new(io::stdout().lock());
    while let Some(queued) = frontier.next_url() {
        let Some(record) = QueuedRecord::from_queued(&queued) else {
            continue;
        };
        if cli.json {
            serde_json::to_writer(&mut out, &record).context("failed to serialize JSON")?;
            writeln!(out)?;
        } else {
            writeln!(out, "[depth {}] {}", record.depth, record.url)?;
        }
    }
    out.flush()?;

    let stats = parser.stats();
    info!(
        tags = stats.tags_seen,
        references = stats.references_found,
        submitted = stats.submitted,
        malformed = stats.malformed,
        rejected = stats.rejected,
        scheme_filtered = stats.scheme_filtered,
        declined = stats.declined,
        base_updates = stats.base_updates,
        "document drained"
    );
    Ok(())
}
