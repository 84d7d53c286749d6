use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use fbmirror_core::compositor::CursorAlpha;
use fbmirror_core::config::{parse_fps_arg, MirrorConfig, DEFAULT_FPS};

#[derive(Parser, Debug)]
#[command(name = "fbmirror")]
#[command(about = "Mirror the X11 screen onto a secondary framebuffer panel")]
#[command(version)]
struct Cli {
    /// Target frame rate; anything but a positive integer falls back to 30
    fps: Option<String>,

    /// Framebuffer device to draw into (e.g., /dev/fb1)
    #[arg(long, env = "FBMIRROR_DEVICE")]
    device: Option<PathBuf>,

    /// X11 display to capture (defaults to $DISPLAY)
    #[arg(long)]
    display: Option<String>,

    /// How cursor colors relate to alpha: straight or premultiplied
    #[arg(long)]
    cursor_alpha: Option<CursorAlpha>,

    /// Do not draw the cursor
    #[arg(long)]
    no_cursor: bool,

    /// Path to config file
    #[arg(long, env = "FBMIRROR_CONFIG_PATH")]
    config_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "FBMIRROR_LOG_LEVEL")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!("fbmirror v{} starting", env!("CARGO_PKG_VERSION"));

    let config = resolve_config(cli)?;
    run_mirror(config).await
}

/// Load the config file (if any) and apply command-line overrides.
fn resolve_config(cli: Cli) -> Result<MirrorConfig> {
    let config_path = cli.config_path.unwrap_or_else(MirrorConfig::default_path);

    let mut config = if config_path.exists() {
        info!("loading config from {}", config_path.display());
        MirrorConfig::load(&config_path)?
    } else {
        MirrorConfig::default()
    };

    if let Some(arg) = cli.fps {
        config.fps = match parse_fps_arg(&arg) {
            Some(fps) => fps,
            None => {
                warn!("invalid frame rate '{}', using {}", arg, DEFAULT_FPS);
                DEFAULT_FPS
            }
        };
    }
    if let Some(device) = cli.device {
        config.device = device;
    }
    if let Some(display) = cli.display {
        config.display = Some(display);
    }
    if let Some(mode) = cli.cursor_alpha {
        config.cursor_alpha = mode;
    }
    if cli.no_cursor {
        config.draw_cursor = false;
    }

    Ok(config)
}

#[cfg(target_os = "linux")]
async fn run_mirror(config: MirrorConfig) -> Result<()> {
    use anyhow::Context;
    use fbmirror_core::mirror::Mirror;
    use fbmirror_linux::framebuffer::FramebufferSink;
    use fbmirror_linux::screen_x11::X11Surface;

    let surface = X11Surface::connect(config.display.as_deref())
        .context("failed to set up screen capture")?;
    let sink = FramebufferSink::open(&config.device)
        .context("failed to set up framebuffer")?;
    let mut mirror = Mirror::new(surface, sink, &config)?;

    info!("mirroring, press Ctrl+C to stop");

    tokio::select! {
        result = mirror.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down");
            Ok(())
        }
    }
}

#[cfg(not(target_os = "linux"))]
async fn run_mirror(_config: MirrorConfig) -> Result<()> {
    anyhow::bail!("framebuffer mirroring is only supported on Linux")
}
