//! ALV correlator control: entry point.
//!
//! ```text
//! alv-ctl status                       Show link and measurement status
//! alv-ctl start [--wait]               Start a measurement
//! alv-ctl stop                         Stop the running measurement
//! alv-ctl duration <SECONDS>           Set the measurement duration
//! alv-ctl scaling <NAME>               Set the scaling mode
//! alv-ctl mode <NAME>                  Set the correlation mode
//! alv-ctl save <PATH>                  Store the correlator data
//! alv-ctl measure [--runs N] ...       Run a measurement series
//! alv-ctl --config <path>              Load a custom config TOML
//! alv-ctl --simulate                   Use the simulated correlator
//! alv-ctl --gen-config [path]          Write default config to stdout or a file
//! ```

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use alv_core::{
    AlvError, Controller, ControllerStatus, CorrelationMode, Scaling, SimulatedCorrelator, series,
};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use alv_ctl::config::{CtlConfig, LoggingConfig};

/// Real time per measurement second in simulation mode.
const SIM_SECOND: Duration = Duration::from_millis(10);

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "alv-ctl", about = "Remote control for the ALV-5000/E correlator")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "alv-ctl.toml")]
    config: PathBuf,

    /// Drive a simulated correlator instead of the real application.
    #[arg(long)]
    simulate: bool,

    /// Write the default configuration to PATH (or stdout) and exit.
    #[arg(long, value_name = "PATH", num_args = 0..=1)]
    gen_config: Option<Option<PathBuf>>,

    #[command(subcommand)]
    command: Option<Action>,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Show link and measurement status.
    Status,
    /// Start a measurement.
    Start {
        /// Block until the measurement has finished.
        #[arg(long)]
        wait: bool,
    },
    /// Stop the running measurement.
    Stop,
    /// Set the measurement duration in seconds.
    Duration { seconds: u32 },
    /// Set the scaling mode (Normal, Off, Conservative, Secure, Fixed).
    Scaling { name: String },
    /// Set the correlation mode (Single, Dual, Cross, Auto).
    Mode { name: String },
    /// Ask the correlator to store its data file.
    Save { path: PathBuf },
    /// Run a series of measurements, storing one file per run.
    Measure {
        /// Number of runs.
        #[arg(long, default_value_t = 1)]
        runs: usize,
        /// Duration of each run in seconds (overrides the config).
        #[arg(long)]
        duration: Option<u32>,
        /// Scaling of the first run (overrides the config).
        #[arg(long)]
        scaling: Option<String>,
    },
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    match &cli.gen_config {
        Some(Some(path)) => {
            CtlConfig::write_default(path)?;
            println!("Default configuration written to {}.", path.display());
            return Ok(());
        }
        Some(None) => {
            let text = toml::to_string_pretty(&CtlConfig::default())?;
            println!("{text}");
            return Ok(());
        }
        None => {}
    }

    let config = CtlConfig::load(&cli.config);
    init_tracing(&config.logging)?;

    let Some(action) = cli.command else {
        eprintln!("No command given; see --help.");
        std::process::exit(2);
    };

    info!("alv-ctl v{}", env!("CARGO_PKG_VERSION"));
    info!("window title: {}", config.correlator.window_title);
    info!("timeout: {} ms", config.correlator.timeout_ms);

    let controller_config = config.to_controller_config();
    let mut controller = if cli.simulate {
        info!("using simulated correlator");
        let sim = SimulatedCorrelator::new()
            .with_title(controller_config.window_title.clone())
            .with_auto_finish(SIM_SECOND);
        Controller::new(sim, controller_config)
    } else {
        Controller::native(controller_config)?
    };

    // Ctrl-C handler.
    let interrupt = controller.interrupt_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, interrupting");
        interrupt.interrupt();
    });

    // The controller blocks on acknowledgments; keep it off the runtime.
    tokio::task::spawn_blocking(move || run(&mut controller, action, &config)).await??;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> std::io::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.file.is_empty() {
        builder.init();
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&logging.file)?;
        builder.with_ansi(false).with_writer(Mutex::new(file)).init();
    }
    Ok(())
}

// ── Commands ─────────────────────────────────────────────────────

/// Link, run one command, unlink.
fn run(alv: &mut Controller, action: Action, config: &CtlConfig) -> Result<(), AlvError> {
    alv.init()?;
    let result = execute(alv, action, config);
    alv.close();
    result
}

fn execute(alv: &mut Controller, action: Action, config: &CtlConfig) -> Result<(), AlvError> {
    match action {
        Action::Status => print_status(&alv.status()),
        Action::Start { wait } => {
            alv.start(wait)?;
            if wait {
                println!("Measurement finished.");
            }
        }
        Action::Stop => alv.stop()?,
        Action::Duration { seconds } => alv.set_duration(seconds)?,
        Action::Scaling { name } => alv.set_scaling_by_name(&name)?,
        Action::Mode { name } => alv.set_mode(name.parse::<CorrelationMode>()?)?,
        Action::Save { path } => alv.save(&path)?,
        Action::Measure {
            runs,
            duration,
            scaling,
        } => {
            let mut template = config.to_series();
            if let Some(seconds) = duration {
                template.duration = seconds;
            }
            if let Some(name) = scaling {
                template.scaling = name.parse::<Scaling>()?;
            }
            let plan = template.plan(runs);
            for (index, run) in plan.iter().enumerate() {
                let path = series::execute(alv, run, &config.measurement.data_folder)?;
                println!("Run {}/{}: {}", index + 1, plan.len(), path.display());
            }
        }
    }
    Ok(())
}

fn print_status(status: &ControllerStatus) {
    println!("initialized: {}", status.initialized);
    println!("activated:   {}", status.activated);
    println!("ok to send:  {}", status.ok_to_send);
    println!("phase:       {}", status.phase);
    println!("duration:    {} s", status.duration);
    println!("scaling:     {}", status.scaling);
    match status.mode {
        Some(mode) => println!("mode:        {mode}"),
        None => println!("mode:        (not set)"),
    }
}
