use std::fs::{self, OpenOptions};
use std::sync::Mutex;
use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod handler;
mod tui;
mod ui;

use app::App;
use config::Config;
use tui::{EventHandler, Tui};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "could not read config, using defaults");
        Config::new()
    });
    let mut app = App::new(config);
    tracing::info!(endpoint = %app.params.endpoint, model = %app.params.model, "starting");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

/// Draw, then handle exactly one event. Stream fragments arrive as events, so
/// every fold is on screen before the next one is applied.
async fn run(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    let sender = events.sender();

    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event, &sender)?,
            None => break,
        }
    }

    Ok(())
}

/// Log to a file next to the config; the terminal belongs to the UI
fn init_logging() -> Result<()> {
    let dir = Config::data_dir()?;
    fs::create_dir_all(&dir)?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("homechat.log"))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("homechat=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();

    Ok(())
}
