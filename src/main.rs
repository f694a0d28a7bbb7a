//! # Jog Bridge
//!
//! Jog a G-code driven CNC machine or 3D printer with a joystick.
//!
//! # Usage
//!
//! ```bash
//! # Capture the joystick calibration once
//! jog-bridge calibrate
//!
//! # Jog the machine on the configured serial port, homing first
//! jog-bridge --config config/default.toml --home
//!
//! # Try it out without a machine
//! jog-bridge --simulate
//!
//! # Hand G-code to another program on stdout
//! socat /dev/ttyUSB0,b115200,raw EXEC:"jog-bridge --quiet"
//! ```
//!
//! Logs go to stderr, since stdout may carry G-code.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use jog_bridge::config::{Config, LimitsConfig, Transport};
use jog_bridge::controller::calibration::Calibration;
use jog_bridge::controller::joystick::Joystick;
use jog_bridge::controller::rumble::EvdevRumble;
use jog_bridge::controller::wizard;
use jog_bridge::gcode::channel::CommandChannel;
use jog_bridge::gcode::machine::Machine;
use jog_bridge::gcode::simulated::SimulatedChannel;
use jog_bridge::jog::engine::{ExitStatus, JogEngine};
use jog_bridge::jog::memory::{MemoryStore, NoStore, PointsFile};
use jog_bridge::serial::{stdio_channel, MachineSerial};

/// Configuration file used when `--config` is not given, if present
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Jog Bridge - jog a G-code machine with a joystick
#[derive(Parser, Debug)]
#[command(name = "jog-bridge")]
#[command(version)]
#[command(about = "Jog a G-code driven CNC machine or 3D printer with a joystick")]
struct Args {
    /// Configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Home on startup
    #[arg(long)]
    home: bool,

    /// Machine not connected; simulate it
    #[arg(short, long)]
    simulate: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,

    /// Persist stored points in the given file
    #[arg(short, long, value_name = "FILE")]
    persist: Option<PathBuf>,

    /// Machine limits in mm
    #[arg(short = 'L', long, value_name = "X,Y,Z")]
    limits: Option<LimitsConfig>,

    /// Feedrate for X/Y in mm/s
    #[arg(short = 'x', long, value_name = "MM_PER_S")]
    feedrate_xy: Option<f32>,

    /// Feedrate for Z in mm/s
    #[arg(short = 'z', long, value_name = "MM_PER_S")]
    feedrate_z: Option<f32>,

    /// Wait time for the machine to initialize
    #[arg(short = 'i', long, value_name = "MS")]
    startup_wait_ms: Option<u64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Jog the machine (default)
    Jog,
    /// Create the joystick calibration file, then exit
    Calibrate,
}

impl Args {
    /// Load the configuration file and apply command line overrides.
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Config::load(DEFAULT_CONFIG_PATH)
                .with_context(|| format!("loading {}", DEFAULT_CONFIG_PATH))?,
            None => Config::default(),
        };

        if self.home {
            config.machine.home_on_start = true;
        }
        if self.simulate {
            config.serial.transport = Transport::Simulate;
        }
        if let Some(path) = &self.persist {
            config.memory.persist_file = Some(path.clone());
        }
        if let Some(limits) = self.limits {
            config.machine.limits = limits;
        }
        if let Some(feedrate) = self.feedrate_xy {
            config.machine.feedrate_xy = feedrate;
        }
        if let Some(feedrate) = self.feedrate_z {
            config.machine.feedrate_z = feedrate;
        }
        if let Some(ms) = self.startup_wait_ms {
            config.serial.startup_wait_ms = ms;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs on stderr; stdout can be the G-code channel
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
    let default_level = if args.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("Jog Bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = args.load_config()?;

    match args.command.unwrap_or(Command::Jog) {
        Command::Calibrate => calibrate(&config).await,
        Command::Jog => match jog(&config).await? {
            ExitStatus::Shutdown => Ok(()),
            status => {
                error!("Stopped: {:?}", status);
                Err(anyhow::anyhow!("jog engine stopped: {:?}", status))
            }
        },
    }
}

/// Run the calibration wizard and write the calibration file.
async fn calibrate(config: &Config) -> Result<()> {
    let mut joystick = Joystick::open(&config.joystick.device_path)?;
    eprintln!("Calibrating '{}'", joystick.name());

    let calibration = wizard::run(&mut joystick, |text| eprintln!("{}", text)).await?;

    let path = &config.joystick.calibration_file;
    calibration
        .save(path)
        .with_context(|| format!("writing {}", path.display()))?;
    info!("Calibration written to {}", path.display());
    Ok(())
}

/// Connect joystick and machine and run the jog engine.
async fn jog(config: &Config) -> Result<ExitStatus> {
    let mut calibration = Calibration::load(&config.joystick.calibration_file).with_context(|| {
        format!(
            "no usable calibration; run `jog-bridge calibrate` first ({})",
            config.joystick.calibration_file.display()
        )
    })?;

    let joystick = Joystick::open(&config.joystick.device_path)?;
    info!("Using joystick '{}'", joystick.name());
    calibration.axes.rezero(joystick.initial_axis_values());

    let homing_command = config.machine.homing_command.as_str();
    let drain = Duration::from_millis(config.serial.query_drain_ms);

    match config.serial.transport {
        Transport::Serial => {
            let serial = MachineSerial::open(&config.serial.port, config.serial.baud_rate)?;
            let machine = Machine::new(serial.into_channel(), homing_command, drain);
            run_engine(joystick, machine, &calibration, config).await
        }
        Transport::Stdio => {
            let machine = Machine::new(stdio_channel(), homing_command, drain);
            run_engine(joystick, machine, &calibration, config).await
        }
        Transport::Simulate => {
            info!("Simulating the machine");
            let machine = Machine::new(SimulatedChannel::new(homing_command), homing_command, drain);
            run_engine(joystick, machine, &calibration, config).await
        }
    }
}

async fn run_engine<C: CommandChannel>(
    joystick: Joystick,
    machine: Machine<C>,
    calibration: &Calibration,
    config: &Config,
) -> Result<ExitStatus> {
    let haptics = EvdevRumble::open_or_silent(
        joystick.device_path(),
        Duration::from_millis(config.joystick.rumble_ms),
    );

    let store: Box<dyn MemoryStore> = match &config.memory.persist_file {
        Some(path) => {
            info!("Stored points are kept in {}", path.display());
            Box::new(PointsFile::new(path))
        }
        None => Box::new(NoStore),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down...");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => warn!("Ctrl+C handler unavailable: {}", e),
        }
    });

    let mut engine = JogEngine::new(joystick, machine, calibration, config.jog_settings())
        .with_store(store)
        .with_haptics(haptics)
        .with_shutdown(shutdown_rx);

    Ok(engine.run().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults_to_jog() {
        let args = Args::parse_from(["jog-bridge"]);
        assert_eq!(args.command, None);
        assert!(!args.home && !args.simulate && !args.quiet);
    }

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "jog-bridge",
            "--home",
            "-s",
            "-L",
            "300,200,80",
            "-x",
            "100",
            "--startup-wait-ms",
            "500",
            "-p",
            "/tmp/points",
            "calibrate",
        ]);
        assert_eq!(args.command, Some(Command::Calibrate));
        assert_eq!(args.limits, Some(LimitsConfig { x: 300.0, y: 200.0, z: 80.0 }));
        assert_eq!(args.feedrate_xy, Some(100.0));
        assert_eq!(args.startup_wait_ms, Some(500));
        assert_eq!(args.persist, Some(PathBuf::from("/tmp/points")));
    }

    #[test]
    fn test_bad_limits_rejected() {
        assert!(Args::try_parse_from(["jog-bridge", "-L", "300,200"]).is_err());
    }

    #[test]
    fn test_load_config_applies_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("jog.toml");
        std::fs::write(&path, "[machine]\nfeedrate_z = 20\n").unwrap();

        let args = Args::parse_from([
            "jog-bridge",
            "--config",
            path.to_str().unwrap(),
            "--simulate",
            "--limits",
            "100,100,50",
        ]);
        let config = args.load_config().unwrap();
        assert_eq!(config.serial.transport, Transport::Simulate);
        assert_eq!(config.machine.limits, LimitsConfig { x: 100.0, y: 100.0, z: 50.0 });
        assert_eq!(config.machine.feedrate_z, 20.0);
    }

    #[test]
    fn test_invalid_override_fails_validation() {
        let args = Args::parse_from(["jog-bridge", "--feedrate-xy", "0.5", "-c", "/dev/null"]);
        assert!(args.load_config().is_err());
    }
}
