use anyhow::Result;
use clap::Parser;
use crossterm::{
    event,
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::{info, LevelFilter};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

mod credentials;
mod ui;
mod utils;

use crate::credentials::{credentials_from_env, load_credentials, save_credentials, Credentials};
use crate::ui::{ChatUI, CrosstermBackend, Terminal, UiAction};
use careline::api::{RestBackend, StaticTokenProvider};
use careline::{ChatTimeline, TimelineConfig, TimelineEvent};

/// Command line arguments for Careline
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Careline: a terminal chat client for the caregiver support service.",
    long_about = "Careline is a terminal client for the caregiver support chat.\n\n\
    Credentials are read from --server-url/--token, then the CARELINE_SERVER_URL\n\
    and CARELINE_TOKEN environment variables, then the saved credentials file,\n\
    and are prompted for as a last resort."
)]
struct Args {
    /// Base URL of the chat service
    #[arg(long, value_name = "URL")]
    server_url: Option<String>,

    /// Bearer token used for every request
    #[arg(long, value_name = "TOKEN")]
    token: Option<String>,

    /// Where log lines go (the TUI owns the terminal)
    #[arg(long, value_name = "PATH", default_value = "careline.log")]
    log_file: PathBuf,
}

/// Prompts the user for the service URL and token on stderr, before
/// the terminal is put into raw mode.
fn prompt_credentials() -> Result<Credentials> {
    eprintln!("Enter chat service URL (e.g. https://api.example.com):");
    let server_url = utils::read_line()?;
    eprintln!("Enter your access token:");
    let token = utils::read_line()?;
    Ok(Credentials::new(&server_url, &token))
}

fn resolve_credentials(args: &Args) -> Result<Credentials> {
    // Flags win outright when both are given
    if let (Some(server_url), Some(token)) = (&args.server_url, &args.token) {
        return Ok(Credentials::new(server_url, token));
    }

    let stored = match credentials_from_env() {
        Some(credentials) => Some(credentials),
        None => load_credentials().unwrap_or(None),
    };
    let mut resolved = match stored {
        Some(credentials) => credentials,
        None => {
            let credentials = prompt_credentials()?;
            if let Err(e) = save_credentials(&credentials) {
                eprintln!("Warning: could not save credentials: {}", e);
            }
            credentials
        }
    };

    // A single flag still overrides its field
    if let Some(server_url) = &args.server_url {
        resolved.server_url = server_url.clone();
    }
    if let Some(token) = &args.token {
        resolved.token = token.clone();
    }
    Ok(resolved)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    utils::setup_logging(&args.log_file, LevelFilter::Debug)?;
    info!("Careline chat client starting up");
    info!("Logging to file: {}", args.log_file.display());

    let credentials = resolve_credentials(&args)?;
    info!("Using chat service at {}", credentials.server_url);

    let auth = Arc::new(StaticTokenProvider::new(&credentials.token));
    let backend = Arc::new(RestBackend::new(&credentials.server_url, auth)?);
    let (timeline, events_rx) = ChatTimeline::new(backend, TimelineConfig::default());

    // Kick off the initial history load in the background so the
    // screen comes up immediately
    {
        let timeline = timeline.clone();
        tokio::spawn(async move {
            timeline.initialize().await;
        });
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = run_app(&mut terminal, &timeline, events_rx).await;

    // Leaving the screen cancels anything still in flight
    timeline.dispose();

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    info!("Careline chat client shut down");
    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    timeline: &ChatTimeline,
    mut events_rx: mpsc::Receiver<TimelineEvent>,
) -> Result<()> {
    let mut ui = ChatUI::new();

    loop {
        terminal.draw(|f| ui.draw(f))?;

        // Apply everything the engine reported since the last frame
        while let Ok(event) = events_rx.try_recv() {
            match event {
                TimelineEvent::MessagesChanged => {
                    ui.set_messages(timeline.snapshot().await);
                    ui.set_status_note(None);
                }
                TimelineEvent::HistoryExhausted => ui.set_history_exhausted(),
                TimelineEvent::HistoryLoadFailed(e) => {
                    ui.set_status_note(Some(format!("Could not load older messages: {}", e)));
                }
            }
        }

        if event::poll(Duration::from_millis(100))? {
            let input_event = event::read()?;
            match ui.handle_event(&input_event) {
                UiAction::Quit => return Ok(()),
                UiAction::Send(text) => timeline.send_message(&text).await,
                UiAction::ScrolledTo(oldest_visible) => {
                    timeline.on_scroll_position_changed(oldest_visible).await;
                }
                UiAction::None => {}
            }
        }
    }
}
