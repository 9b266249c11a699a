use anyhow::Result;

mod app;
mod config;
mod handler;
mod markdown;
mod ollama;
mod session;
mod storage;
mod tui;
mod ui;

use app::App;
use storage::Storage;
use tui::EventHandler;

#[tokio::main]
async fn main() -> Result<()> {
    let storage = Storage::open()?;
    init_logging(&storage);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();
    let mut app = App::new(storage, events.stream_sender());

    let result = run(&mut terminal, &mut events, &mut app).await;

    tui::restore()?;
    result
}

async fn run(terminal: &mut tui::Tui, events: &mut EventHandler, app: &mut App) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    Ok(())
}

/// Logs go to a file under the config dir; stderr belongs to the TUI.
/// Silent unless RUST_LOG asks for output.
fn init_logging(storage: &Storage) {
    if std::env::var("RUST_LOG").is_err() {
        return;
    }

    let path = storage.log_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
    {
        let _ = env_logger::Builder::from_default_env()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .try_init();
    }
}
