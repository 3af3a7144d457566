use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;

use agent_mesh::agents::{ResearcherAgent, SimulatedLatency};
use agent_mesh::bus::MessageBus;
use agent_mesh::config::MeshConfig;
use agent_mesh::core::{
    AnalysisKind, AnalyzeRequest, Content, Message, ResearchRequest, SearchRequest,
};
use agent_mesh::logging::{self, LoggingConfig};
use agent_mesh::monitor::BroadcastMonitor;
use agent_mesh::runtime::AgentManager;
use agent_mesh::workspace::Workspace;

#[derive(Parser, Debug)]
#[command(name = "agent-mesh", version, about = "Send one message to a researcher agent and print the reply")]
struct Cli {
    /// Sender identity
    #[arg(short, long, default_value = "human")]
    sender: String,

    /// Intent (research, search, analyze, ...)
    #[arg(short, long)]
    intent: String,

    /// Message body; JSON is passed through, plain text becomes the topic/query/data
    #[arg(short, long)]
    message: String,

    /// Recipient agent identity
    #[arg(short, long, default_value = "researcher")]
    recipient: String,

    /// Seconds to wait for the reply
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Print monitor events to stderr as JSON lines
    #[arg(long)]
    monitor: bool,

    /// Skip the simulated lookup delays
    #[arg(long)]
    instant: bool,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Emit stderr logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Also write JSON logs to this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

/// Build the payload for `intent` from the raw `--message` text
fn build_content(intent: &str, raw: &str) -> Content {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        if value.is_object() {
            return Content::Json(value);
        }
    }
    match intent {
        "research" => Content::Research(ResearchRequest::new(raw)),
        "search" => Content::Search(SearchRequest::new(raw)),
        "analyze" => Content::Analyze(AnalyzeRequest::new(Value::String(raw.to_string()), AnalysisKind::Summary)),
        _ => Content::text(raw),
    }
}

/// Poll `sender`'s queue until a message correlated with `id` arrives
async fn wait_for_reply(bus: &MessageBus, sender: &str, id: &str, timeout: Duration) -> Option<Message> {
    let poll = async {
        loop {
            match bus.drain(sender).await {
                Ok(messages) => {
                    if let Some(reply) = messages
                        .into_iter()
                        .find(|m| m.correlates_with.as_deref() == Some(id))
                    {
                        return reply;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to drain replies"),
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };
    tokio::time::timeout(timeout, poll).await.ok()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut log_config = LoggingConfig::default()
        .with_level(&cli.log_level)
        .with_json(cli.log_json);
    if let Some(dir) = &cli.log_dir {
        log_config = log_config.with_log_dir(dir);
    }
    let _log_guard = logging::init_logging(&log_config)?;

    let config = match &cli.config {
        Some(path) => MeshConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => MeshConfig::default(),
    };

    let message = Message::new(
        &cli.sender,
        &cli.recipient,
        "user",
        &cli.intent,
        build_content(&cli.intent, &cli.message),
    );
    message.validate()?;

    let bus = MessageBus::new(&config);
    bus.start().await;
    let workspace = Workspace::new(&config);
    let monitor = BroadcastMonitor::new();

    if cli.monitor {
        let mut events = monitor.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Ok(line) = serde_json::to_string(&event) {
                            eprintln!("{}", line.dimmed());
                        }
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    let latency = if cli.instant {
        SimulatedLatency::none()
    } else {
        SimulatedLatency::default()
    };
    let manager = AgentManager::new(bus.clone(), workspace.clone(), &config.runtime)
        .with_monitor(Arc::new(monitor.clone()));
    manager
        .add(&cli.recipient, Arc::new(ResearcherAgent::with_latency(latency)))
        .await?;
    for (agent_id, result) in manager.initialize_all().await {
        result.with_context(|| format!("initializing {}", agent_id))?;
    }
    for (agent_id, result) in manager.start_all().await {
        result.with_context(|| format!("starting {}", agent_id))?;
    }

    bus.register(&cli.sender).await;
    let id = bus.send(message).await?;
    tracing::info!(message_id = %id, "Message sent");

    let reply = wait_for_reply(&bus, &cli.sender, &id, Duration::from_secs(cli.timeout_secs)).await;

    for (agent_id, result) in manager.stop_all().await {
        if let Err(e) = result {
            tracing::warn!(agent_id = %agent_id, error = %e, "Agent did not stop cleanly");
        }
    }
    bus.stop().await;
    workspace.shutdown().await;

    match reply {
        Some(reply) => {
            let label = if reply.content.is_error() {
                "error".red().bold()
            } else {
                "ok".green().bold()
            };
            eprintln!("{} reply from {}", label, reply.sender.cyan());
            println!("{}", serde_json::to_string_pretty(&reply)?);
            Ok(())
        }
        None => anyhow::bail!(
            "no reply from {} within {}s",
            cli.recipient,
            cli.timeout_secs
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_content() {
        assert!(matches!(
            build_content("research", "quantum computing"),
            Content::Research(r) if r.topic == "quantum computing"
        ));
        assert!(matches!(
            build_content("search", "tokio"),
            Content::Search(s) if s.query == "tokio" && s.source == "web"
        ));
        assert!(matches!(
            build_content("analyze", r#"{"data": [1, 2], "type": "trends"}"#),
            Content::Json(_)
        ));
        assert_eq!(build_content("chat", "hi"), Content::text("hi"));
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "agent-mesh",
            "--intent",
            "research",
            "--message",
            "rust",
            "--instant",
        ])
        .unwrap();
        assert_eq!(cli.sender, "human");
        assert_eq!(cli.recipient, "researcher");
        assert!(cli.instant);
        assert!(!cli.log_json);
        assert!(Cli::try_parse_from(["agent-mesh", "--message", "x"]).is_err());
    }
}
