//! `workcell` – runs the pick-and-place decision loop against the simulated
//! cell.
//!
//! 1. Initialises tracing (`RUST_LOG`, `WORKCELL_LOG_FORMAT`,
//!    `OTEL_EXPORTER_OTLP_ENDPOINT`).
//! 2. Loads `~/.workcell/config.toml` (defaults when absent) and validates it.
//! 3. Wires a [`SimCell`] to the control loop, replays the demo scenario and
//!    ticks until **Ctrl-C**.

mod config;

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use tracing::{error, warn};

use workcell_hal::SimCell;
use workcell_middleware::{CellBridge, EventBus};
use workcell_perception::TransformBuffer;
use workcell_runtime::{CellServices, ControlLoop, init_tracing};
use workcell_types::CellError;

fn main() -> ExitCode {
    let _tracing = init_tracing("workcell");
    print_banner();

    // ── Shutdown flag ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_on_signal = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping after the current tick …".yellow().bold());
        shutdown_on_signal.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; stop the process with a signal instead");
    }

    // ── Configuration ────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", config::config_path().display().to_string().bold());
            cfg
        }
        Ok(None) => {
            println!("  No config at {}; using defaults.", config::config_path().display());
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {e}", "Config error".red());
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = cfg.validate() {
        println!("{}: {e}", "Invalid config".red());
        return ExitCode::FAILURE;
    }
    println!(
        "  Base frame {} · {} cameras · {} Hz\n",
        cfg.base_frame.bold(),
        cfg.cameras.len(),
        cfg.tick_hz
    );

    // ── Run ──────────────────────────────────────────────────────────────
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(run(&cfg, shutdown)) {
        Ok(ticks) => {
            println!("{}", format!("  ✓ Stopped after {ticks} ticks.").green());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "work cell failed to start");
            ExitCode::FAILURE
        }
    }
}

async fn run(cfg: &config::Config, shutdown: Arc<AtomicBool>) -> Result<u64, CellError> {
    let cell = Arc::new(SimCell::ariac_demo());
    if cell.base_frame() != cfg.base_frame {
        warn!(
            configured = %cfg.base_frame,
            simulated = %cell.base_frame(),
            "configured base frame is not part of the simulated frame tree"
        );
    }
    let transforms = TransformBuffer::new();
    cell.install_frames(&transforms);

    let bus = EventBus::default();
    let services = CellServices {
        control: cell.clone(),
        locations: cell.clone(),
        transforms: Arc::new(transforms),
    };
    // Subscribe before the demo scenario is published.
    let mut control = ControlLoop::new(cfg.control_loop_config(), bus.clone(), services)?;
    cell.publish_demo(&CellBridge::new(bus))?;

    Ok(control.run(shutdown).await)
}

fn print_banner() {
    println!();
    println!("{}", r#"  _      __         __            ____"#.bold().cyan());
    println!("{}", r#" | | /| / /__  ____/ /__ _______ / / /"#.bold().cyan());
    println!("{}", r#" | |/ |/ / _ \/ __/  '_// __/ -_) / / "#.bold().cyan());
    println!("{}", r#" |__/|__/\___/_/ /_/\_\ \__/\__/_/_/  "#.bold().cyan());
    println!();
    println!("  {} {}", "workcell".bold(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Pick-and-place cell controller");
    println!();
}
