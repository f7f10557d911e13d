use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use companion_core::companion::{CompanionRecord, DEFAULT_DURATION_MINUTES, NewCompanion};
use companion_core::config::{CallConfig, QueryConfig};
use companion_core::entitlements::IdentityProvider;
use companion_core::generic_types::Role;
use companion_core::query::QueryFilter;
use companion_core::realtime_api::VoiceService;
use companion_core::store::{CompanionStore, MemoryStore, PostgrestConfig, PostgrestStore};
use companion_core::{CallSession, CallStatus, CompanionActions, Error, SessionUpdate};
use companion_service::config::Config;
use companion_service::identity::EnvIdentity;
use companion_service::voice_adapter::VoiceAdapter;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::fmt::time::ChronoLocal;

/// How long to wait for the service to confirm a hang-up.
const STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(version, about = "Voice tutor companions from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List companions, optionally filtered by subject and topic
    List {
        #[arg(long)]
        subject: Option<String>,
        /// Matches the topic or the name
        #[arg(long)]
        topic: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: i64,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Show one companion
    Show { id: String },
    /// Create a companion owned by the current user
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        topic: String,
        #[arg(long)]
        voice: String,
        #[arg(long)]
        style: String,
        #[arg(long, default_value_t = DEFAULT_DURATION_MINUTES)]
        duration: u32,
    },
    /// Whether the current user may create another companion
    Quota,
    /// Companions from the most recent sessions of any user
    Recent {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Companions from the current user's sessions
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Start a voice call with a companion. Type `m` to toggle mute, `q` to hang up.
    Call { companion_id: String },
}

fn build_store(config: &Config) -> Arc<dyn CompanionStore> {
    match (&config.store_url, &config.store_api_key) {
        (Some(url), Some(key)) => {
            tracing::info!("Using PostgREST store at {}", url);
            Arc::new(PostgrestStore::new(PostgrestConfig::new(url, key.clone())))
        }
        _ => {
            tracing::warn!("STORE_URL is not set, using an empty in-memory store");
            Arc::new(MemoryStore::new())
        }
    }
}

fn print_companions(companions: &[CompanionRecord]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(companions)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    // --- 3. Parse Command-Line Arguments ---
    let args = Cli::parse();

    // --- 4. Wire up the store and identity ---
    let identity = Arc::new(EnvIdentity::from_config(&config));
    let actions = CompanionActions::new(
        build_store(&config),
        identity.clone(),
        QueryConfig::new().with_query_timeout(config.query_timeout),
    );

    match args.command {
        Command::List {
            subject,
            topic,
            page,
            limit,
        } => {
            let mut filter = QueryFilter::new().with_page(page).with_limit(limit);
            if let Some(subject) = subject {
                filter = filter.with_subject(&subject);
            }
            if let Some(topic) = topic {
                filter = filter.with_topic(&topic);
            }
            print_companions(&actions.list_companions(&filter).await?)?;
        }
        Command::Show { id } => {
            let companion = actions.get_companion(&id).await?;
            println!("{}", serde_json::to_string_pretty(&companion)?);
        }
        Command::Create {
            name,
            subject,
            topic,
            voice,
            style,
            duration,
        } => {
            let input =
                NewCompanion::new(&name, &subject, &topic, &voice, &style).with_duration(duration);
            let companion = actions.create_companion_within_quota(input).await?;
            println!("{}", serde_json::to_string_pretty(&companion)?);
        }
        Command::Quota => {
            let author = identity
                .current_user_id()
                .await
                .ok_or(Error::Unauthenticated)?;
            let allowed = actions.check_creation_quota(&author).await?;
            println!("{}", if allowed { "allowed" } else { "limit reached" });
        }
        Command::Recent { limit } => {
            print_companions(&actions.get_recent_sessions(limit).await?)?;
        }
        Command::History { limit } => {
            let user_id = identity
                .current_user_id()
                .await
                .ok_or(Error::Unauthenticated)?;
            print_companions(&actions.get_user_sessions(&user_id, limit).await?)?;
        }
        Command::Call { companion_id } => {
            run_call(&config, actions, &companion_id).await?;
        }
    }

    Ok(())
}

async fn run_call(config: &Config, actions: CompanionActions, companion_id: &str) -> Result<()> {
    let companion = actions.get_companion(companion_id).await?;

    // The event stream is taken before the adapter moves into the session.
    let mut adapter = VoiceAdapter::new(config);
    let mut voice_events = adapter.events().await?;

    let call_config = CallConfig::new().with_connect_timeout(config.connect_timeout);
    let mut session = CallSession::new(companion, adapter, Arc::new(actions), call_config);

    let mut updates = session.subscribe();
    tokio::spawn(async move {
        while let Ok(update) = updates.recv().await {
            match update {
                SessionUpdate::Status(status) => println!("[{:?}]", status),
                SessionUpdate::Speaking(true) => println!("(speaking)"),
                SessionUpdate::Speaking(false) => {}
                SessionUpdate::Muted(muted) => {
                    println!("{}", if muted { "(muted)" } else { "(unmuted)" })
                }
                SessionUpdate::Transcript(message) => {
                    let who = match message.role {
                        Role::Assistant => "tutor",
                        Role::User => "you",
                    };
                    println!("{}: {}", who, message.content);
                }
                SessionUpdate::HistoryRecorded(id) => tracing::info!("Session saved for {}", id),
            }
        }
    });

    session.start().await?;
    call_loop(&mut session, &mut voice_events).await
}

async fn call_loop<V: VoiceService>(
    session: &mut CallSession<V>,
    voice_events: &mut tokio::sync::mpsc::Receiver<companion_core::generic_types::VoiceEvent>,
) -> Result<()> {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut hang_up_deadline: Option<tokio::time::Instant> = None;

    loop {
        tokio::select! {
            event = voice_events.recv() => {
                let Some(event) = event else {
                    tracing::warn!("Voice event stream closed");
                    break;
                };
                let ended = event == companion_core::generic_types::VoiceEvent::CallEnd;
                session.handle_event(event).await;
                if ended && session.status() == CallStatus::Finished {
                    break;
                }
            }
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => match line.trim() {
                        "m" => match session.toggle_microphone().await {
                            Ok(_) => {}
                            Err(e) => tracing::warn!("Cannot toggle microphone: {}", e),
                        },
                        "q" => {
                            hang_up(session).await;
                            hang_up_deadline = Some(tokio::time::Instant::now() + STOP_GRACE);
                        }
                        "" => {}
                        other => tracing::warn!("Unknown command: {}", other),
                    },
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        tracing::error!("Failed to read stdin: {}", e);
                        stdin_open = false;
                    }
                }
            }
            _ = tokio::signal::ctrl_c(), if hang_up_deadline.is_none() => {
                hang_up(session).await;
                hang_up_deadline = Some(tokio::time::Instant::now() + STOP_GRACE);
            }
            _ = sleep_until(hang_up_deadline), if hang_up_deadline.is_some() => {
                tracing::warn!("No call-end after hanging up, exiting");
                break;
            }
        }
    }

    println!("Call ended after {} transcript lines.", session.transcript().len());
    Ok(())
}

async fn hang_up<V: VoiceService>(session: &mut CallSession<V>) {
    if let Err(e) = session.stop().await {
        tracing::warn!("Cannot hang up: {}", e);
    }
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
