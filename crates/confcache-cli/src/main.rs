//! confcache - a conference schedule that works offline.
//!
//! Reads come from the local cache (or the bundled bootstrap documents) and
//! never wait on the network. `confcache refresh` pulls newer content and
//! flags from the remote feed.

mod app;

use std::io;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;
use confcache_core::hydrate::group_by_start;
use confcache_core::{Config, HydratedGraph, HydratedSession, ScheduleFilter};

/// Log file written next to the cached documents
const LOG_FILE: &str = "confcache.log";

const USAGE: &str = "\
Usage: confcache <command>

Commands:
  schedule [DAY]                 Sessions grouped by start time
  info                           Conference, days, tracks, rooms and sponsors
  speaker <ID>                   A speaker and their sessions
  search <TEXT> [--day N] [--track ID]
  favorites                      Favorite sessions in start order
  toggle <SESSION_ID>            Add or remove a favorite
  clear-favorites
  flags                          Current feature flags
  set-flag <NAME> <true|false>
  refresh                        Fetch newer content and flags
  config                         Effective configuration

Environment: CONFCACHE_BASE_URL, CONFCACHE_CACHE_DIR, CONFCACHE_OFFLINE, RUST_LOG";

#[derive(Debug)]
enum Command {
    Schedule { day: Option<i32> },
    Info,
    Speaker(String),
    Search(ScheduleFilter),
    Favorites,
    Toggle(String),
    ClearFavorites,
    Flags,
    SetFlag { name: String, value: bool },
    Refresh,
    Config,
    Help,
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let command = match args.as_slice() {
            [] | ["schedule"] => Command::Schedule { day: None },
            ["schedule", day] => Command::Schedule {
                day: Some(parse_day(day)?),
            },
            ["info"] => Command::Info,
            ["speaker", id] => Command::Speaker(id.to_string()),
            ["search", text, rest @ ..] => Command::Search(parse_filter(text, rest)?),
            ["favorites"] => Command::Favorites,
            ["toggle", id] => Command::Toggle(id.to_string()),
            ["clear-favorites"] => Command::ClearFavorites,
            ["flags"] => Command::Flags,
            ["set-flag", name, value] => Command::SetFlag {
                name: name.to_string(),
                value: parse_bool(value)?,
            },
            ["refresh"] => Command::Refresh,
            ["config"] => Command::Config,
            ["help"] | ["--help"] | ["-h"] => Command::Help,
            _ => bail!("Unrecognized arguments: {}\n\n{}", args.join(" "), USAGE),
        };
        Ok(command)
    }
}

fn parse_day(value: &str) -> Result<i32> {
    value
        .parse()
        .with_context(|| format!("Day must be a number, got '{}'", value))
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "1" | "yes" => Ok(true),
        "false" | "off" | "0" | "no" => Ok(false),
        _ => bail!("Expected true or false, got '{}'", value),
    }
}

fn parse_filter(text: &str, rest: &[&str]) -> Result<ScheduleFilter> {
    let mut filter = ScheduleFilter {
        text: Some(text.to_string()),
        ..ScheduleFilter::default()
    };
    let mut options = rest.iter();
    while let Some(option) = options.next() {
        let value = options
            .next()
            .with_context(|| format!("Missing value for {}", option))?;
        match *option {
            "--day" => filter.day_index = Some(parse_day(value)?),
            "--track" => filter.track_id = Some(value.to_string()),
            other => bail!("Unknown search option '{}'", other),
        }
    }
    Ok(filter)
}

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr and, when the log directory is usable, to a file.
/// The returned guard flushes the file writer and must be held until exit.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let appender = log_dir.and_then(|dir| {
        RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(LOG_FILE)
            .build(dir)
            .ok()
    });
    let (file_layer, guard) = match appender {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;
    if matches!(command, Command::Help) {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut config = Config::load()?;
    config.apply_env_overrides();

    let _log_guard = init_tracing(config.cache_dir().ok().as_deref());
    info!(command = ?command, "confcache starting");

    let app = App::new(config)?;
    run(&app, command).await
}

async fn run(app: &App, command: Command) -> Result<()> {
    match command {
        Command::Schedule { day } => {
            let graph = require_graph(app).await?;
            let sessions = match day {
                Some(day) => graph.sessions_by_day(day),
                None => graph.sessions().iter().map(|s| &**s).collect(),
            };
            print_schedule(&sessions);
        }
        Command::Info => print_info(app).await?,
        Command::Speaker(id) => {
            let graph = require_graph(app).await?;
            let speaker = graph
                .speaker(&id)
                .with_context(|| format!("No speaker with id '{}'", id))?;
            println!("{}", speaker.full_name);
            if let Some(affiliation) = speaker.affiliation() {
                println!("{}", affiliation);
            }
            if !speaker.bio.is_empty() {
                println!("\n{}", speaker.bio);
            }
            println!();
            print_schedule(&graph.sessions_for_speaker(&id));
        }
        Command::Search(filter) => {
            let graph = require_graph(app).await?;
            let matches = graph.search(&filter);
            if matches.is_empty() {
                println!("No sessions match.");
            } else {
                print_schedule(&matches);
            }
        }
        Command::Favorites => {
            let favorites = app.content.favorite_sessions().await;
            if favorites.is_empty() {
                println!("No favorites yet. Add one with `confcache toggle <SESSION_ID>`.");
            } else {
                print_schedule(&favorites.iter().collect::<Vec<_>>());
            }
        }
        Command::Toggle(id) => {
            if let Some(graph) = app.content.get_snapshot().await {
                if graph.session(&id).is_none() {
                    warn!(session = %id, "Toggling a session that is not in the schedule");
                }
            }
            let now_favorite = app.content.toggle_favorite(&id).await?;
            println!(
                "{} {} favorites",
                id,
                if now_favorite { "added to" } else { "removed from" }
            );
        }
        Command::ClearFavorites => {
            app.content.clear_favorites().await?;
            println!("Favorites cleared.");
        }
        Command::Flags => {
            let source = app.flags.load_local();
            let flags = app.flags.current();
            println!("Flags version {} ({:?})", flags.version, source);
            for (name, enabled) in flags.flags() {
                println!("  {:<32} {}", name, if enabled { "on" } else { "off" });
            }
        }
        Command::SetFlag { name, value } => {
            app.flags.load_local();
            app.flags.update_flag(&name, value)?;
            println!("{} = {}", name, value);
        }
        Command::Refresh => refresh(app).await,
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&app.config)?);
            println!("content url: {}", app.config.content_url());
            println!("flags url:   {}", app.config.flags_url());
            println!("cache dir:   {}", app.cache_dir.display());
            println!("online:      {}", app.connectivity.is_online());
        }
        Command::Help => println!("{}", USAGE),
    }
    Ok(())
}

async fn refresh(app: &App) {
    let mut subscription = app.flags.subscribe();

    let (content, flags) = futures::join!(app.content.refresh(), app.flags.initialize());

    println!("Content: {}", content);
    match flags {
        Ok(flags) => println!("Flags:   {}", flags),
        Err(e) => println!("Flags:   refresh task failed ({})", e),
    }
    while let Ok(change) = subscription.receiver.try_recv() {
        info!(origin = ?change.origin, version = %change.flags.version, "Flags changed");
    }
    app.flags.unsubscribe(subscription.id);
}

async fn require_graph(app: &App) -> Result<std::sync::Arc<HydratedGraph>> {
    app.content
        .get_snapshot()
        .await
        .context("No conference data available. Run `confcache refresh` while online.")
}

async fn print_info(app: &App) -> Result<()> {
    let graph = require_graph(app).await?;
    let snapshot = graph.snapshot();
    let conference = &snapshot.conference;

    println!("{}", conference.name);
    if !conference.venue.is_empty() {
        println!("{}", conference.venue);
    }
    println!(
        "Content version {} ({})",
        graph.content_version(),
        app.content
            .last_synced()
            .await
            .unwrap_or_else(|| "bundled".to_string())
    );

    println!("\nDays:");
    for day in graph.days() {
        println!("  {} {} ({})", day.index, day.label(), day.date);
    }
    println!("\nTracks:");
    for track in graph.tracks() {
        println!("  {:<12} {}", track.id, track.name);
    }
    println!("\nRooms:");
    for room in graph.rooms() {
        println!("  {:<12} {} - {}", room.id, room.name, room.location_label());
    }
    if !graph.sponsors().is_empty() {
        println!("\nSponsors:");
        for sponsor in graph.sponsors() {
            println!("  {} ({})", sponsor.name, sponsor.tier);
        }
    }
    Ok(())
}

fn print_schedule(sessions: &[&HydratedSession]) {
    for slot in group_by_start(sessions) {
        println!("{}", format_time(slot.start));
        for session in slot.sessions {
            println!("  {}", session_line(session));
        }
    }
}

fn session_line(session: &HydratedSession) -> String {
    let marker = if session.is_favorite { '*' } else { ' ' };
    let room = session
        .room
        .as_ref()
        .map(|room| room.name.as_str())
        .unwrap_or("TBA");
    let speakers: Vec<&str> = session
        .speakers
        .iter()
        .map(|speaker| speaker.full_name.as_str())
        .collect();

    let mut line = format!(
        "{} [{}] {} ({} min, {})",
        marker,
        session.id,
        session.title,
        session.duration().num_minutes(),
        room
    );
    if !speakers.is_empty() {
        line.push_str(" - ");
        line.push_str(&speakers.join(", "));
    }
    line
}

fn format_time(at: DateTime<Utc>) -> String {
    at.format("%a %d %b %H:%M UTC").to_string()
}
