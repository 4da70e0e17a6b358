//! Terminal remote for Samsung, LG WebOS and Android TVs
//! Saved pairing tokens live next to the settings, so the TV only prompts once

mod settings;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use settings::ConnectionFlags;
use std::sync::Arc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tvlink_core::{
    create_controller, AdapterContext, ConfigStore, FileStore, TvController, TvEvent, TvKind,
};

#[derive(Parser, Debug)]
#[command(name = "tvlink")]
#[command(author = "TvLink Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Control a TV from the terminal", long_about = None)]
struct Args {
    /// TV family: samsung, lg or android
    #[arg(short = 't', long = "tv", global = true, default_value = "samsung")]
    kind: TvKind,

    #[command(flatten)]
    connection: ConnectionFlags,

    /// Log level when RUST_LOG is not set
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Press one or more remote keys (VOLUME_UP, OK, HOME, ...)
    Key {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// List installed apps
    Apps,
    /// List external inputs
    Inputs,
    /// Launch an app by id
    Launch {
        app_id: String,
        /// Launch parameters as JSON
        #[arg(long)]
        params: Option<String>,
    },
    /// Type text into the focused field
    Text { text: String },
    /// Open a YouTube video
    Youtube { video_id: String },
    /// Set absolute volume (0-100)
    Volume { level: u8 },
    /// Switch to an external input
    Input { input_id: String },
    /// Print the current TV state as JSON
    State,
    /// Forget the pairing and ask the TV again
    Repair,
    /// Stay connected and print events until Ctrl+C
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level);

    let store = Arc::new(FileStore::new().context("No config directory for saved TV settings")?);
    let config = settings::resolve(args.kind, &args.connection, store.as_ref())?;
    settings::remember(&config, &args.connection, store.as_ref())?;
    debug!("Settings directory: {}", store.dir().display());

    let ctx = AdapterContext::new()?.with_store(store.clone() as Arc<dyn ConfigStore>);
    let tv = create_controller(config, &ctx)?;

    let events = tv.events().await;
    let printer = tokio::spawn(print_events(events, matches!(args.command, Command::Watch)));

    info!("Connecting to {} TV", args.kind);
    let result: Result<()> = match args.command {
        // Re-pairing runs its own connect
        Command::Repair => tv.repair().await.map_err(Into::into),
        command => match tv.connect().await {
            Ok(()) => run(tv.as_ref(), command).await,
            Err(e) => Err(e.into()),
        },
    };

    tv.disconnect().await;
    printer.abort();
    result
}

async fn run(tv: &dyn TvController, command: Command) -> Result<()> {
    match command {
        Command::Key { keys } => {
            for key in keys {
                tv.send_command(&key)
                    .await
                    .with_context(|| format!("Key {} failed", key))?;
            }
        }
        Command::Apps => {
            for app in tv.get_apps().await? {
                println!("{:<40} {}", app.id, app.name);
            }
        }
        Command::Inputs => {
            for input in tv.get_inputs().await? {
                println!("{:<20} {}", input.id, input.label);
            }
        }
        Command::Launch { app_id, params } => {
            let params = params
                .map(|p| serde_json::from_str(&p))
                .transpose()
                .context("--params is not valid JSON")?;
            tv.launch_app(&app_id, params).await?;
        }
        Command::Text { text } => tv.send_text(&text).await?,
        Command::Youtube { video_id } => tv.open_youtube(&video_id).await?,
        Command::Volume { level } => tv.set_volume(level).await?,
        Command::Input { input_id } => tv.switch_input(&input_id).await?,
        Command::State => match tv.get_state().await? {
            Some(state) => println!("{}", serde_json::to_string_pretty(&state)?),
            None => println!("State unavailable"),
        },
        Command::Repair => tv.repair().await?,
        Command::Watch => {
            println!("Watching {} TV, Ctrl+C to stop", tv.kind());
            tokio::signal::ctrl_c().await?;
        }
    }
    Ok(())
}

/// Mirror adapter events onto the log; `watch` also prints state changes
async fn print_events(mut events: tokio::sync::mpsc::UnboundedReceiver<TvEvent>, verbose: bool) {
    while let Some(event) = events.recv().await {
        match event {
            TvEvent::Log(line) => debug!("{}", line),
            TvEvent::Error(message) => warn!("{}", message),
            TvEvent::Connected => info!("Connected"),
            TvEvent::Disconnected => info!("Disconnected"),
            TvEvent::StateChanged(patch) if verbose => {
                if let Ok(json) = serde_json::to_string(&patch) {
                    println!("{}", json);
                }
            }
            TvEvent::StateChanged(_) => {}
        }
    }
}

fn setup_logging(level: &str) {
    let log_level = level.parse::<Level>().unwrap_or(Level::INFO);

    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_command() {
        let args = Args::try_parse_from(["tvlink", "--tv", "lg", "--ip", "10.0.0.7", "key", "UP", "OK"])
            .unwrap();
        assert_eq!(args.kind, TvKind::Lg);
        assert_eq!(args.connection.ip.as_deref(), Some("10.0.0.7"));
        match args.command {
            Command::Key { keys } => assert_eq!(keys, vec!["UP", "OK"]),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "tvlink", "volume", "25", "--tv", "android", "--bridge-url", "http://box.local:8080",
        ])
        .unwrap();
        assert_eq!(args.kind, TvKind::Android);
        assert!(matches!(args.command, Command::Volume { level: 25 }));
    }

    #[test]
    fn test_rejects_unknown_tv_kind() {
        assert!(Args::try_parse_from(["tvlink", "--tv", "plasma", "state"]).is_err());
    }

    #[test]
    fn test_key_needs_a_key() {
        assert!(Args::try_parse_from(["tvlink", "key"]).is_err());
    }
}
