use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use tutorchat_core::{
    config::{Config, FlowRegistry},
    history,
    http_client::HttpClient,
    model::{ExpertiseLevel, Mode},
    session::{ChatSession, SessionParams, random_session_id},
    store::{ConversationStore, MemoryStore},
};

#[derive(Parser)]
#[command(author, version, about = "tutorchat CLI smoke tool", long_about = None)]
struct Cli {
    /// Path to a JSON or TOML config file with flow definitions.
    #[arg(long, default_value = "tutorchat.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one chat turn and print the streamed answer live
    Chat {
        /// Flow to use: "tutor" or "professor"
        #[arg(long, default_value = "tutor")]
        flow: String,
        #[arg(long)]
        course: String,
        /// balanced, study, professor, or socratic
        #[arg(long, default_value = "balanced")]
        mode: Mode,
        #[arg(long)]
        cohort: Option<String>,
        /// Novice, Intermediate, or Expert
        #[arg(long)]
        level: Option<String>,
        #[arg(short, long, help = "Message from the user")]
        message: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = Config::from_path(&cli.config)?;
    let registry = FlowRegistry::from_config(&cfg)?;

    match cli.command {
        Commands::Chat {
            flow,
            course,
            mode,
            cohort,
            level,
            message,
        } => {
            let Some(flow) = registry.get(&flow) else {
                anyhow::bail!(
                    "flow '{flow}' is not configured or its API key env var is unset \
                     (available: {:?})",
                    registry.names()
                );
            };

            let store = Arc::new(MemoryStore::new());
            let params = SessionParams {
                class_id: course,
                mode,
                cohort_id: cohort,
                lecture: None,
                expertise_level: level.as_deref().and_then(ExpertiseLevel::parse),
                session_id: random_session_id(),
            };
            let http = HttpClient::new_with(&cfg.http)?;
            let mut session = ChatSession::new(http, flow, store.clone(), params)?;

            use std::io::{self, Write};
            let mut printed = 0usize;
            let outcome = session
                .send_turn(&message, &mut |snapshot| {
                    // Each snapshot replaces the previous one; print the suffix.
                    let fresh = &snapshot.content[printed.min(snapshot.content.len())..];
                    print!("{fresh}");
                    printed = snapshot.content.len();
                    io::stdout().flush().ok();
                })
                .await?;
            println!();

            if let Some(sources) = &outcome.assistant_message.sources {
                eprintln!("[{} source(s) attached]", sources.len());
            }
            if let Some(level) = outcome.detected_level {
                eprintln!("[level set to {}]", level.as_str());
            }
            if let Some(topic) = &outcome.calibration_topic {
                eprintln!("[calibration requested: {topic}]");
            }

            let now = now_ms();
            for conv in history::sidebar_order(store.list_conversations().await?) {
                eprintln!(
                    "[saved: {} — {} ({})]",
                    conv.id,
                    conv.title,
                    history::relative_label(now, conv.updated_at_ms)
                );
            }
        }
    }

    Ok(())
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
