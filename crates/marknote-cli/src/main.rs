//! marknote CLI - offline-first Markdown notes from the terminal
//!
//! Notes are written to a local SQLite cache first; when a remote is
//! configured the engine reconciles opportunistically after every mutation.

use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use marknote_core::cache::SqliteCache;
use marknote_core::connectivity::ConnectivityMonitor;
use marknote_core::remote::{HttpRemoteClient, RemoteError};
use marknote_core::session::NoteSessionManager;
use marknote_core::sync::{CycleOutcome, SkipReason, SyncEngine};
use marknote_core::{LocalNote, NoteId, NotePatch};
use serde::Serialize;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "marknote")]
#[command(about = "Offline-first Markdown notes with background sync")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to the local cache file
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,

    /// Remote notes collection URL (or MARKNOTE_REMOTE_URL)
    #[arg(long, value_name = "URL")]
    remote: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new note
    #[command(alias = "new")]
    Add {
        /// Note title
        title: String,
        /// Markdown content
        content: Vec<String>,
    },
    /// List notes, newest first
    List {
        /// Number of notes to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing note
    Edit {
        /// Note ID or unique ID prefix
        id: String,
        /// Replacement title
        #[arg(long)]
        title: Option<String>,
        /// Replacement content
        #[arg(long)]
        content: Option<String>,
    },
    /// Delete an existing note
    #[command(alias = "rm")]
    Delete {
        /// Note ID or unique ID prefix
        id: String,
    },
    /// Reconcile the local cache with the remote collection
    Sync,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] marknote_core::Error),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Nothing to change: pass --title and/or --content")]
    NothingToEdit,
    #[error("Note not found for id/prefix: {0}")]
    NoteNotFound(String),
    #[error("{0}")]
    AmbiguousNoteId(String),
    #[error("No remote configured. Pass --remote or set MARKNOTE_REMOTE_URL to enable `marknote sync`.")]
    SyncNotConfigured,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("marknote=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let remote_url = resolve_remote_url(cli.remote);
    let app = open_app(&db_path, remote_url.as_deref())?;

    match cli.command {
        Commands::Add { title, content } => run_add(&app, title, &content).await?,
        Commands::List { limit, json } => run_list(&app, limit, json).await?,
        Commands::Edit { id, title, content } => run_edit(&app, &id, title, content).await?,
        Commands::Delete { id } => run_delete(&app, &id).await?,
        Commands::Sync => run_sync(&app).await?,
    }

    Ok(())
}

struct App {
    engine: Arc<SyncEngine<SqliteCache, HttpRemoteClient>>,
    session: NoteSessionManager<SqliteCache, HttpRemoteClient>,
    remote_configured: bool,
}

fn open_app(db_path: &Path, remote_url: Option<&str>) -> Result<App, CliError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let cache = Arc::new(SqliteCache::open(db_path)?);

    // One-shot process: reachability mirrors configuration. Without a
    // configured remote the monitor stays offline and the engine never
    // contacts the placeholder endpoint.
    let remote_configured = remote_url.is_some();
    let monitor = ConnectivityMonitor::new(remote_configured);
    let endpoint = remote_url.unwrap_or("http://127.0.0.1:0/notes");
    let remote = Arc::new(HttpRemoteClient::new(endpoint)?);

    let engine = Arc::new(SyncEngine::new(Arc::clone(&cache), remote, monitor));
    let session = NoteSessionManager::new(cache, Arc::clone(&engine));
    Ok(App {
        engine,
        session,
        remote_configured,
    })
}

/// Best-effort sync after a mutation; local state is already durable, so
/// failures only log
async fn sync_after_mutation(app: &App) {
    if !app.remote_configured {
        return;
    }
    for _ in 0..2 {
        match app.engine.sync().await {
            Ok(CycleOutcome::Skipped(SkipReason::InFlight)) => {
                // An opportunistic background cycle beat us; let it finish
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Ok(_) => return,
            Err(err) => {
                tracing::warn!(%err, "sync after mutation failed; changes remain local");
                return;
            }
        }
    }
}

async fn run_add(app: &App, title: String, content_parts: &[String]) -> Result<(), CliError> {
    app.session.open_new();
    let note = app
        .session
        .save(&NotePatch {
            title: Some(title),
            content: Some(content_parts.join(" ")),
        })
        .await?;

    sync_after_mutation(app).await;
    println!("{}", note.id);
    Ok(())
}

#[derive(Debug, Serialize)]
struct NoteListItem {
    id: String,
    title: String,
    preview: String,
    updated_at: String,
    sync_status: String,
}

fn note_to_list_item(note: &LocalNote) -> NoteListItem {
    NoteListItem {
        id: note.id.as_str(),
        title: note.title.clone(),
        preview: note_preview(&note.content, 60),
        updated_at: note.updated_at.to_rfc3339(),
        sync_status: note.sync_status.to_string(),
    }
}

async fn run_list(app: &App, limit: usize, as_json: bool) -> Result<(), CliError> {
    app.session.reload().await?;
    let mut notes = app.session.notes();
    notes.truncate(limit);

    if as_json {
        let items = notes.iter().map(note_to_list_item).collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if notes.is_empty() {
        println!("No notes yet. Create one with `marknote add`.");
        return Ok(());
    }

    let now_ms = chrono::Utc::now().timestamp_millis();
    for note in &notes {
        println!(
            "{}  [{:<8}] {:>12}  {}",
            note.id,
            note.sync_status,
            format_relative_time(note.updated_at.timestamp_millis(), now_ms),
            if note.title.is_empty() {
                "(untitled)"
            } else {
                &note.title
            },
        );
    }
    Ok(())
}

async fn run_edit(
    app: &App,
    id: &str,
    title: Option<String>,
    content: Option<String>,
) -> Result<(), CliError> {
    if title.is_none() && content.is_none() {
        return Err(CliError::NothingToEdit);
    }

    app.session.reload().await?;
    let note_id = resolve_note_id(id, &app.session.notes())?;
    app.session.open(&note_id).await?;
    let updated = app.session.save(&NotePatch { title, content }).await?;

    sync_after_mutation(app).await;
    println!("{}", updated.id);
    Ok(())
}

async fn run_delete(app: &App, id: &str) -> Result<(), CliError> {
    app.session.reload().await?;
    let note_id = resolve_note_id(id, &app.session.notes())?;
    app.session.delete(&note_id).await?;

    sync_after_mutation(app).await;
    println!("{note_id}");
    Ok(())
}

async fn run_sync(app: &App) -> Result<(), CliError> {
    if !app.remote_configured {
        return Err(CliError::SyncNotConfigured);
    }

    match app.engine.sync().await? {
        CycleOutcome::Completed(report) => {
            println!(
                "Sync complete: {} pushed, {} deleted, {} pulled, {} errors",
                report.pushed, report.purged, report.pulled, report.record_errors
            );
        }
        CycleOutcome::Skipped(reason) => println!("Sync skipped: {reason}"),
    }
    Ok(())
}

fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("MARKNOTE_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("marknote")
        .join("marknote.db")
}

fn resolve_remote_url(cli_remote: Option<String>) -> Option<String> {
    cli_remote
        .or_else(|| env::var("MARKNOTE_REMOTE_URL").ok())
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
}

/// Resolve a full note id or a unique id prefix against the live notes
fn resolve_note_id(input: &str, notes: &[LocalNote]) -> Result<NoteId, CliError> {
    let input = input.trim();
    if let Ok(id) = input.parse::<NoteId>() {
        if notes.iter().any(|n| n.id == id) {
            return Ok(id);
        }
        return Err(CliError::NoteNotFound(input.to_string()));
    }

    let matches: Vec<NoteId> = notes
        .iter()
        .filter(|n| n.id.as_str().starts_with(input))
        .map(|n| n.id)
        .collect();
    match matches.as_slice() {
        [] => Err(CliError::NoteNotFound(input.to_string())),
        [id] => Ok(*id),
        _ => Err(CliError::AmbiguousNoteId(format!(
            "Prefix '{input}' matches {} notes; use a longer prefix",
            matches.len()
        ))),
    }
}

/// First line of the content, truncated to `max_len` characters
fn note_preview(content: &str, max_len: usize) -> String {
    content
        .lines()
        .next()
        .unwrap_or("")
        .chars()
        .take(max_len)
        .collect()
}

fn format_relative_time(updated_at_ms: i64, now_ms: i64) -> String {
    let elapsed_ms = now_ms.saturating_sub(updated_at_ms);
    let minutes = elapsed_ms / 60_000;
    let hours = minutes / 60;
    let days = hours / 24;

    if minutes < 1 {
        "just now".to_string()
    } else if minutes < 60 {
        format!("{minutes}m ago")
    } else if hours < 24 {
        format!("{hours}h ago")
    } else {
        format!("{days}d ago")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_with_title(title: &str) -> LocalNote {
        let mut note = LocalNote::new_draft();
        note.title = title.to_string();
        note
    }

    #[test]
    fn resolve_db_path_prefers_cli_flag() {
        let path = resolve_db_path(Some(PathBuf::from("/tmp/custom.db")));
        assert_eq!(path, PathBuf::from("/tmp/custom.db"));
    }

    #[test]
    fn resolve_remote_url_rejects_blank() {
        assert_eq!(resolve_remote_url(Some("   ".to_string())), None);
        assert_eq!(
            resolve_remote_url(Some(" https://example.com/notes ".to_string())).as_deref(),
            Some("https://example.com/notes")
        );
    }

    #[test]
    fn resolve_note_id_accepts_unique_prefix() {
        let notes = vec![note_with_title("a"), note_with_title("b")];
        let target = &notes[0];
        let prefix: String = target.id.as_str().chars().take(12).collect();

        let resolved = resolve_note_id(&prefix, &notes).unwrap();
        assert_eq!(resolved, target.id);
    }

    #[test]
    fn resolve_note_id_rejects_unknown() {
        let notes = vec![note_with_title("a")];
        assert!(matches!(
            resolve_note_id("zzzz", &notes),
            Err(CliError::NoteNotFound(_))
        ));
    }

    #[test]
    fn resolve_note_id_rejects_ambiguous_prefix() {
        let notes = vec![note_with_title("a"), note_with_title("b")];
        // UUID v7 ids share a timestamp prefix when created back to back
        let shared: String = notes[0]
            .id
            .as_str()
            .chars()
            .zip(notes[1].id.as_str().chars())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a)
            .collect();
        if shared.is_empty() {
            return;
        }

        assert!(matches!(
            resolve_note_id(&shared, &notes),
            Err(CliError::AmbiguousNoteId(_))
        ));
    }

    #[test]
    fn note_preview_truncates_first_line() {
        assert_eq!(note_preview("First line\nSecond", 50), "First line");
        assert_eq!(note_preview("abcdefgh", 4), "abcd");
        assert_eq!(note_preview("", 4), "");
    }

    #[test]
    fn format_relative_time_units() {
        let now = 10_000_000_000;
        assert_eq!(format_relative_time(now - 30_000, now), "just now");
        assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
        assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
        assert_eq!(format_relative_time(now - 3 * 24 * 60 * 60_000, now), "3d ago");
    }
}
