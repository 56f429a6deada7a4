//! Desktop entry point: opens a window on the built-in scene modules.

use std::process::ExitCode;

use clap::Parser;

use vitrine::{AppConfig, HostConfig, StrategyKind};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to open at startup, like `/` or `/002`
    #[arg(short, long, default_value = "/")]
    route: String,

    /// Only use transitions that skip per-pixel frame analysis
    #[arg(long)]
    lightweight: bool,

    /// Always use this transition (fade, fov-punch, channel-drift, luma-dissolve, wipe, depth-ripple)
    #[arg(short, long)]
    transition: Option<StrategyKind>,

    /// Seed for transition picks and ambient randomness
    #[arg(long)]
    seed: Option<u64>,

    /// Window width in logical pixels
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Window height in logical pixels
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Render this many frames without a window and exit
    #[arg(long, value_name = "FRAMES")]
    headless: Option<u32>,
}

impl Args {
    fn into_config(self) -> AppConfig {
        let mut host = HostConfig::new().lightweight(self.lightweight);
        if let Some(kind) = self.transition {
            host = host.strategy(kind);
        }
        if let Some(seed) = self.seed {
            host = host.seed(seed);
        }

        let mut config = AppConfig::new()
            .size(self.width, self.height)
            .route(self.route)
            .host(host);
        if let Some(frames) = self.headless {
            config = config.headless(frames);
        }
        config
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();
    match vitrine::run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
