//! Terminal front end for the research session engine.
//!
//! Run with: cargo run -p research-cli -- "your question"
//!
//! Without a question the stored session (if any) is resumed. While running,
//! type `help` for commands.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context as _;
use clap::Parser;
use scholarflow_engine::{EngineConfig, EngineState, ExportArtifact, SessionController};
use scholarflow_transport::{HttpApi, ResearchApi};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "research-cli", version, about = "Track ScholarFlow research sessions")]
struct Args {
    /// Base URL of the research server.
    #[arg(long, env = "SCHOLARFLOW_SERVER_URL")]
    server_url: Option<String>,

    /// WebSocket endpoint for live progress.
    #[arg(long, env = "SCHOLARFLOW_STREAM_URL")]
    stream_url: Option<String>,

    /// Seconds between status polls when the live channel is down.
    #[arg(long)]
    poll_interval: Option<u64>,

    /// JSON file with engine settings; flags above override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory exports are written to.
    #[arg(long, default_value = ".")]
    out: PathBuf,

    /// Question to research.
    query: Vec<String>,
}

const HELP: &str = "\
commands:
  new <question>     start a new research session
  md                 export the report as Markdown
  pdf                export the report as PDF
  history            list completed sessions
  load <id>          show a completed session
  clear              abandon the current session
  clear-history      forget all completed sessions
  quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = load_config(args.config.as_deref()).await?;
    if let Some(url) = &args.server_url {
        config = config.with_server_url(url);
    }
    if let Some(url) = &args.stream_url {
        config = config.with_stream_url(url);
    }
    if let Some(secs) = args.poll_interval {
        config = config.with_poll_interval(Duration::from_secs(secs));
    }

    probe(&config.server_url).await?;
    let mut controller =
        SessionController::connect(config).context("Failed to set up the engine")?;

    controller.restore();
    let query = args.query.join(" ");
    if !query.trim().is_empty() {
        controller.start_research(&query);
    }

    let result = interact(&mut controller, &args.out).await;
    controller.shutdown().await;
    result
}

/// Print progress and run commands until `quit` or end of input.
async fn interact(controller: &mut SessionController, out: &Path) -> anyhow::Result<()> {
    let mut shown = controller.state().clone();
    render(&EngineState::default(), &shown);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                if !command(controller, line.trim(), out).await? {
                    break;
                }
            }
            _ = controller.next_event() => {}
        }

        let state = controller.state();
        render(&shown, state);
        shown = state.clone();
    }
    Ok(())
}

async fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid config in {}", path.display()))
}

/// Check the server before doing anything else.
async fn probe(server_url: &str) -> anyhow::Result<()> {
    let api = HttpApi::new(server_url).context("Invalid server URL")?;
    match api.health().await {
        Ok(health) if health.is_healthy() => {
            tracing::info!(api_configured = health.api_configured, "Server is healthy");
        }
        Ok(health) => eprintln!("warning: server reports status {:?}", health.status),
        Err(e) => eprintln!("warning: cannot reach {server_url}: {e}"),
    }
    Ok(())
}

/// Run one user command. Returns `false` to quit.
async fn command(
    controller: &mut SessionController,
    line: &str,
    out: &Path,
) -> anyhow::Result<bool> {
    let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
    match verb {
        "" => {}
        "quit" | "exit" => return Ok(false),
        "help" => println!("{HELP}"),
        "new" => controller.start_research(rest),
        "clear" => controller.clear_session(),
        "clear-history" => controller.clear_history(),
        "history" => {
            for entry in controller.state().history.iter() {
                println!("  {}  {}", entry.session_id, entry.original_query);
            }
        }
        "load" => {
            if !controller.load_session_from_history(rest.trim()) {
                println!("no such session: {rest}");
            }
        }
        "md" => match controller.export_markdown() {
            Some(artifact) => save(&artifact, out).await?,
            None => println!("no report yet"),
        },
        "pdf" => match controller.export_pdf().await {
            Ok(Some(artifact)) => save(&artifact, out).await?,
            Ok(None) => println!("no session"),
            // Shown through the state's error.
            Err(_) => {}
        },
        other => println!("unknown command {other:?}, try `help`"),
    }
    Ok(true)
}

async fn save(artifact: &ExportArtifact, out: &Path) -> anyhow::Result<()> {
    let path = artifact
        .write_to(out)
        .await
        .with_context(|| format!("Failed to write {}", artifact.file_name))?;
    println!("saved {}", path.display());
    Ok(())
}

/// Print whatever changed between two states.
fn render(before: &EngineState, after: &EngineState) {
    let seen = before
        .activity
        .last()
        .and_then(|last| after.activity.iter().position(|e| e == last));
    let skip = seen.map_or(0, |i| i + 1);
    for entry in after.activity.iter().skip(skip) {
        match &entry.detail {
            Some(detail) => println!("[{:?}] {} ({detail})", entry.action, entry.message),
            None => println!("[{:?}] {}", entry.action, entry.message),
        }
    }

    if after.error != before.error {
        if let Some(error) = &after.error {
            println!("error: {error}");
        }
    }
    if after.polling && !before.polling {
        println!("(polling for updates)");
    }
    if let Some(report) = after.report() {
        if before.report() != Some(report) {
            println!("\n{report}\n");
        }
    }
}
