use std::{
    io,
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::Result;
use clap::{Arg, Command};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing_subscriber::EnvFilter;

use hubchat::config::{Config, Role};

mod app;
mod ui;

use app::App;

/// Log to a file; the terminal belongs to the UI.
fn init_logging() -> Result<PathBuf> {
    let log_dir = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("hubchat");
    std::fs::create_dir_all(&log_dir)?;

    let log_path = log_dir.join("hubchat.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let filter = EnvFilter::try_from_env("HUBCHAT_LOG").unwrap_or_else(|_| EnvFilter::new("hubchat=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();

    Ok(log_path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("hubchat")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Terminal chat between an admin and its clients over Nostr relays")
        .arg(
            Arg::new("as")
                .long("as")
                .value_name("NAME")
                .default_value("client1")
                .help("Participate as 'admin' or as a client name (e.g. client2)"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("Config file (default: <config dir>/hubchat/config.toml)"),
        )
        .arg(
            Arg::new("nsec")
                .long("nsec")
                .value_name("NSEC_KEY")
                .help("Sign events with this Nostr private key instead of an ephemeral one"),
        )
        .arg(
            Arg::new("offline")
                .long("offline")
                .action(clap::ArgAction::SetTrue)
                .help("Use an in-process loopback instead of Nostr relays"),
        )
        .get_matches();

    let log_path = init_logging()?;
    tracing::info!(log = %log_path.display(), "hubchat starting");

    let role = Role::parse(matches.get_one::<String>("as").map(String::as_str).unwrap_or("client1"))?;
    let config_path = matches.get_one::<String>("config").map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    let nsec = matches.get_one::<String>("nsec").map(|s| s.as_str());
    let offline = matches.get_flag("offline");

    let mut app = App::new(role, &config, nsec, offline).await?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app).await;
    app.shutdown().await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        tracing::error!(error = ?err, "hubchat exited with an error");
        println!("Error: {:?}", err);
    }

    Ok(())
}

async fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    let mut last_tick = Instant::now();
    // Short enough that typing indicators expire on time.
    let tick_rate = Duration::from_millis(50);

    loop {
        if app.take_redraw() {
            terminal.draw(|f| ui::draw(f, app))?;
        }

        let timeout_duration = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if event::poll(timeout_duration)? {
            let event = event::read()?;
            app.handle_input(event).await?;
        }

        if last_tick.elapsed() >= tick_rate {
            app.on_tick().await?;
            last_tick = Instant::now();
        }

        if app.should_quit {
            return Ok(());
        }
    }
}
