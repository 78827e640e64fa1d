mod app;
mod compose;
mod config;
mod data;
mod export;
mod model;
mod overlay;
mod proxy;
mod ui;

use std::{
    fs::OpenOptions,
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use app::{App, AppMessage, Effect};
use compose::{default_fields, FieldId, TextFormat};
use config::Config;
use data::{DataClient, FilterParams};
use export::{export_poster, TextStyle};

const LOG_FILE_NAME: &str = "results2social.log";
/// The composer asks for a week and a day; the proxy's own fallback is wider.
const COMPOSER_RANGE_DAYS: u32 = 8;

#[derive(Parser, Debug)]
#[command(author, version, about = "Basketball results on a poster", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the /api/spiele proxy
    Serve {
        /// Address to listen on (overrides R2S_BIND)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Open the poster composer (default)
    Compose(ComposeArgs),
}

#[derive(Parser, Debug)]
struct ComposeArgs {
    /// Base URL of the proxy [default: http://<R2S_BIND>]
    #[arg(long)]
    proxy_url: Option<String>,

    /// Only show home games; `--home-only false` overrides R2S_DEFAULT_JUST_HOME
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    home_only: Option<bool>,

    /// Days of matches to request [default: 8]
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=60))]
    range_days: Option<u32>,

    /// Columns in display order, e.g. date,home-short,result,guest-short
    #[arg(long, value_enum, value_delimiter = ',')]
    fields: Vec<FieldId>,

    #[arg(long, value_enum, default_value_t = TextFormat::Plain)]
    format: TextFormat,

    /// Background image to start with
    #[arg(long)]
    image: Option<PathBuf>,

    /// Where the poster and the log file are written
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Also run the proxy in this process
    #[arg(long)]
    spawn_proxy: bool,
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let args = Args::parse();
    let mut config = Config::from_env();

    let command = args
        .command
        .unwrap_or_else(|| Command::Compose(ComposeArgs::parse_from(["compose"])));

    match command {
        Command::Serve { bind } => {
            init_tracing(None)?;
            if let Some(bind) = bind {
                config.bind = bind;
            }
            proxy::serve(&config)
        }
        Command::Compose(compose_args) => {
            init_tracing(Some(&compose_args.out_dir.join(LOG_FILE_NAME)))?;
            let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
            runtime.block_on(compose(config, compose_args))
        }
    }
}

/// Logs go to stderr for the proxy and to a file for the composer, whose
/// stdout belongs to the terminal UI.
fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init(),
    }
    Ok(())
}

async fn compose(config: Config, args: ComposeArgs) -> Result<()> {
    if args.spawn_proxy {
        let proxy_config = config.clone();
        std::thread::spawn(move || {
            if let Err(err) = proxy::serve(&proxy_config) {
                tracing::error!(error = %format!("{err:#}"), "proxy stopped");
            }
        });
    }

    let proxy_url = args
        .proxy_url
        .clone()
        .unwrap_or_else(|| format!("http://{}", config.bind));
    let filters = initial_filters(&args, &config);
    let fields = if args.fields.is_empty() {
        default_fields()
    } else {
        args.fields.clone()
    };
    tracing::info!(proxy = %proxy_url, ?filters, "composer starting");

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(filters, fields, args.format, args.out_dir.clone());
    let (tx, mut rx) = mpsc::channel::<AppMessage>(100);
    let client = Arc::new(DataClient::new(proxy_url));

    spawn_effect(app.refresh(), &client, &tx);
    if let Some(path) = args.image {
        spawn_effect(Effect::LoadImage(path), &client, &tx);
    }

    let res = run_app(&mut terminal, &mut app, &mut rx, &client, &tx).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{:?}", err)
    }

    Ok(())
}

fn initial_filters(args: &ComposeArgs, config: &Config) -> FilterParams {
    FilterParams {
        just_home: args.home_only.unwrap_or(config.default_filters.just_home),
        range_days: args.range_days.unwrap_or(COMPOSER_RANGE_DAYS),
    }
}

async fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    rx: &mut mpsc::Receiver<AppMessage>,
    client: &Arc<DataClient>,
    tx: &mpsc::Sender<AppMessage>,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui::ui(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            match event::read()? {
                Event::Key(key) => {
                    if let Some(effect) = app.on_key(key) {
                        spawn_effect(effect, client, tx);
                    }
                }
                Event::Mouse(mouse) => app.on_mouse(mouse),
                _ => {}
            }
        }

        while let Ok(msg) = rx.try_recv() {
            app.apply(msg);
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

/// Runs an effect in the background; its outcome comes back as an `AppMessage`.
fn spawn_effect(effect: Effect, client: &Arc<DataClient>, tx: &mpsc::Sender<AppMessage>) {
    let tx = tx.clone();
    match effect {
        Effect::Fetch { seq, filters } => {
            let client = client.clone();
            tracing::debug!(seq, ?filters, "fetching matches");
            tokio::spawn(async move {
                let result = client.fetch_matches(&filters).await;
                let _ = tx.send(AppMessage::Matches { seq, result }).await;
            });
        }
        Effect::LoadImage(path) => {
            tokio::spawn(async move {
                let decode_path = path.clone();
                let image = match tokio::task::spawn_blocking(move || image::open(decode_path)).await {
                    Ok(Ok(image)) => Some(Arc::new(image)),
                    Ok(Err(err)) => {
                        tracing::debug!(path = %path.display(), error = %err, "image decode failed");
                        None
                    }
                    Err(err) => {
                        tracing::debug!(error = %err, "image loader panicked");
                        None
                    }
                };
                let _ = tx.send(AppMessage::Background { path, image }).await;
            });
        }
        Effect::Export {
            image,
            text,
            origin,
            out_dir,
        } => {
            tokio::spawn(async move {
                let result = tokio::task::spawn_blocking(move || {
                    export_poster(Some(image.as_ref()), &text, origin, &TextStyle::default(), &out_dir)
                })
                .await
                .map_err(anyhow::Error::from)
                .and_then(|r| r);
                let _ = tx.send(AppMessage::Exported(result)).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compose_args(flags: &[&str]) -> ComposeArgs {
        ComposeArgs::parse_from(std::iter::once("compose").chain(flags.iter().copied()))
    }

    fn config(just_home: bool, range_days: u32) -> Config {
        Config {
            default_filters: FilterParams {
                just_home,
                range_days,
            },
            ..Config::default()
        }
    }

    #[test]
    fn composer_asks_for_eight_days_by_default() {
        let filters = initial_filters(&compose_args(&[]), &config(false, 30));
        assert_eq!(filters.range_days, 8);
        assert!(!filters.just_home);

        let filters = initial_filters(&compose_args(&["--range-days", "14"]), &config(false, 30));
        assert_eq!(filters.range_days, 14);
    }

    #[test]
    fn home_only_flag_overrides_deployment_default() {
        let filters = initial_filters(&compose_args(&[]), &config(true, 30));
        assert!(filters.just_home);

        let filters = initial_filters(&compose_args(&["--home-only", "false"]), &config(true, 30));
        assert!(!filters.just_home);

        let filters = initial_filters(&compose_args(&["--home-only"]), &config(false, 30));
        assert!(filters.just_home);
    }
}
