use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use tokio::time::{sleep, Instant};

use blockfall::audio_system::{
    AssetFetcher, AudioManager, FileFetcher, HttpFetcher, ManagerSettings, OutputDevice,
    RodioDevice, SilentDevice,
};
use blockfall::config::{AssetSource, Config};
use blockfall::error::AppResult;
use blockfall::game::{Autopilot, Input, Screen, Session};
use blockfall::messaging::{AudioDirector, EventBus, GameEvent};

const LOG_TARGET_STARTUP: &str = "blockfall::startup";

/// Time on the title screen before pressing start
const TITLE_HOLD: Duration = Duration::from_secs(5);

/// Roughly the length of the dial-up tone
const MODEM_HOLD: Duration = Duration::from_millis(3500);

const GAME_OVER_HOLD: Duration = Duration::from_secs(4);

/// Delay between autopilot key presses
const INPUT_DELAY: Duration = Duration::from_millis(120);

/// Key presses into a game before the demo pauses once
const PAUSE_AFTER_INPUTS: u32 = 80;

const PAUSE_HOLD: Duration = Duration::from_secs(2);

/// Initialize tracing with file rotation
///
/// Logs are written to:
/// - macOS: ~/Library/Application Support/Blockfall/logs/
/// - Windows: %APPDATA%/Blockfall/logs/
/// - Linux: ~/.config/Blockfall/logs/
///
/// Log output:
/// - Debug builds: Console + File
/// - Release builds: File only
fn initialize_tracing() {
    use tracing_appender::rolling;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_dir = dirs::config_dir()
        .map(|dir| dir.join("Blockfall").join("logs"))
        .unwrap_or_else(|| std::path::PathBuf::from("logs"));

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create log directory: {}", e);
    }

    // Daily rotation: blockfall.log.YYYY-MM-DD
    let file_appender = rolling::daily(&log_dir, "blockfall.log");

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true);

    #[cfg(debug_assertions)]
    {
        let console_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(true)
            .with_target(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(console_layer)
            .init();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();
    }

    tracing::info!("Log directory: {}", log_dir.display());
}

/// Command line switches
struct Options {
    /// Skip the sound card and play on the silent clock
    silent: bool,
    games: u32,
}

impl Options {
    fn from_args() -> AppResult<Self> {
        let mut options = Options {
            silent: false,
            games: 1,
        };

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--silent" => options.silent = true,
                "--games" => {
                    let value = args.next().ok_or_else(|| anyhow!("--games needs a number"))?;
                    options.games = value
                        .parse()
                        .with_context(|| format!("Invalid game count: {}", value))?;
                }
                other => return Err(anyhow!("Unknown argument: {}", other)),
            }
        }
        Ok(options)
    }
}

fn open_device(config: &Config, silent: bool) -> Arc<dyn OutputDevice> {
    if silent {
        tracing::info!(target: LOG_TARGET_STARTUP, "Silent output requested");
        return Arc::new(SilentDevice::new());
    }

    match RodioDevice::open(config.master_volume) {
        Ok(device) => Arc::new(device),
        Err(e) => {
            tracing::warn!(
                target: LOG_TARGET_STARTUP,
                "No audio output available ({}), continuing silently",
                e
            );
            Arc::new(SilentDevice::new())
        }
    }
}

fn asset_fetcher(config: &Config) -> Arc<dyn AssetFetcher> {
    match config.asset_source() {
        AssetSource::Http(base) => {
            tracing::info!(target: LOG_TARGET_STARTUP, "Assets from {}", base);
            Arc::new(HttpFetcher::new(base))
        }
        AssetSource::Directory(root) => {
            tracing::info!(target: LOG_TARGET_STARTUP, "Assets from {}", root.display());
            Arc::new(FileFetcher::new(root))
        }
    }
}

/// Title screen, then `games` autopilot games, then back to the title
async fn run_demo(bus: &EventBus, config: &Config, games: u32) {
    let mut session = Session::new(bus.clone(), config.rng_seed);
    let mut pilot = Autopilot::new(config.rng_seed);

    session.enter_title();
    sleep(TITLE_HOLD).await;

    for game in 1..=games {
        if game == 1 {
            session.handle_input(Input::Start);
            sleep(MODEM_HOLD).await;
        } else {
            session.handle_input(Input::Restart);
        }
        tracing::info!("Game {} of {} started", game, games);

        let mut inputs = 0u32;
        let mut last_drop = Instant::now();
        while session.screen() == Screen::Playing {
            sleep(INPUT_DELAY).await;

            if let Some(input) = pilot.next_input(&session) {
                session.handle_input(input);
                inputs += 1;
            }

            if inputs == PAUSE_AFTER_INPUTS {
                session.handle_input(Input::TogglePause);
                sleep(PAUSE_HOLD).await;
                session.handle_input(Input::TogglePause);
                inputs += 1;
            }

            if last_drop.elapsed() >= session.gravity_interval() {
                session.tick();
                last_drop = Instant::now();
            }
        }

        tracing::info!(
            "Game {} finished: score {}, level {}, lines {}",
            game,
            session.score(),
            session.level(),
            session.lines()
        );
        sleep(GAME_OVER_HOLD).await;
    }

    session.handle_input(Input::Exit);
    sleep(TITLE_HOLD).await;
}

#[tokio::main]
async fn main() -> AppResult<()> {
    initialize_tracing();
    tracing::info!(
        target: LOG_TARGET_STARTUP,
        "Starting Blockfall v{} ({}/{})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    );

    let options = Options::from_args()?;
    let config = Config::load().context("Failed to load configuration")?;
    tracing::info!(
        target: LOG_TARGET_STARTUP,
        "Configuration: {}",
        Config::config_path_display()
    );

    let audio = AudioManager::new(
        open_device(&config, options.silent),
        asset_fetcher(&config),
        config.registry(),
        ManagerSettings::from_config(&config),
    );

    let bus = EventBus::new();
    let director = AudioDirector::new(audio.clone())
        .spawn(&bus, tokio::runtime::Handle::current())
        .context("Failed to start audio director")?;

    run_demo(&bus, &config, options.games).await;

    bus.publish(GameEvent::Shutdown);
    tokio::task::spawn_blocking(move || director.join())
        .await
        .context("Audio director join failed")?
        .map_err(|_| anyhow!("Audio director panicked"))?;

    tracing::info!(
        "Shutdown complete ({} sound buffers cached)",
        audio.cached_buffers()
    );
    Ok(())
}
