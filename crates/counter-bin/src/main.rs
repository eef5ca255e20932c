//! `gencounter`: run one frequency-counter operation from the command line.
//!
//! Settings come from `counter.toml` (or `--config`), then `COUNTER_*`
//! environment variables, then the flags below. Measurements print as JSON.
//!
//! ```bash
//! gencounter --mock freq "ch:1 cou:dc exp:10E6 sampl:5"
//! gencounter --interface vxi11 --port 192.168.1.50 time-interval "ref:A ch:2 tstamp:Y"
//! gencounter --mock --trig "trig1:a50" freq-ratio "ref:1"
//! gencounter settings
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use counter_core::{CounterSettings, FrequencyCounter, Interface, MeasuredData};
use counter_driver_mock::MockCounter;
use counter_driver_scpi::ScpiCounter;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "counter.toml";

#[derive(Parser, Debug)]
#[command(name = "gencounter")]
#[command(about = "Control a frequency counter/timer", long_about = None)]
struct Cli {
    /// Settings file (TOML format)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the simulated counter instead of hardware
    #[arg(long, global = true)]
    mock: bool,

    /// Instrument interface (usb, usb_acm, vxi11)
    #[arg(long, global = true)]
    interface: Option<Interface>,

    /// Port identifier, e.g. /dev/usbtmc0 or 192.168.1.50
    #[arg(long, global = true)]
    port: Option<String>,

    /// Log instrument traffic
    #[arg(long, global = true)]
    debug: bool,

    /// Trigger levels applied after opening, e.g. "trig1:a50 trig2:0.1"
    #[arg(long, global = true)]
    trig: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Measure frequency
    Freq {
        /// Configuration string, e.g. "ch:1 cou:dc exp:10E6 res:8 sampl:10"
        cfg: String,
    },
    /// Measure period
    Period {
        /// Configuration string, e.g. "ch:1"
        cfg: String,
    },
    /// Measure the time interval between two channels
    TimeInterval {
        /// Configuration string, e.g. "ref:A ch:2 tstamp:Y sampl:10"
        cfg: String,
    },
    /// Measure the frequency ratio of two channels
    FreqRatio {
        /// Configuration string, e.g. "ref:1 res:10"
        cfg: String,
    },
    /// Measure peak-to-peak voltage
    PkToPk {
        /// Configuration string, e.g. "ch:1"
        cfg: String,
    },
    /// Set trigger levels and exit
    TrigLevel {
        /// Configuration string, e.g. "trig1:a50 trig2:-0.1"
        cfg: String,
    },
    /// Reset the instrument to its defaults
    Reset,
    /// Print the effective settings as TOML
    Settings,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = effective_settings(&cli)?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level)))
        .with_writer(std::io::stderr)
        .init();

    if cli.command == Commands::Settings {
        let text = toml::to_string_pretty(&settings).context("Failed to render settings")?;
        print!("{}", text);
        return Ok(());
    }

    let mut counter = build_counter(&settings, cli.mock);
    counter
        .open()
        .with_context(|| format!("Failed to open counter on {}", settings.port))?;

    let outcome = run(counter.as_mut(), &cli);
    let closed = counter.close().context("Failed to close counter");

    if let Some(data) = outcome? {
        println!(
            "{}",
            serde_json::to_string_pretty(&data).context("Failed to serialize measurement")?
        );
    }
    closed
}

/// Load settings from file and environment, then apply command-line overrides.
fn effective_settings(cli: &Cli) -> Result<CounterSettings> {
    let path = cli.config.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let mut settings = CounterSettings::load(Some(&path))
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;

    if let Some(interface) = cli.interface {
        settings.interface = interface;
    }
    if let Some(port) = &cli.port {
        settings.port = port.clone();
    }
    if cli.debug {
        settings.debug = true;
    }
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

fn build_counter(settings: &CounterSettings, mock: bool) -> Box<dyn FrequencyCounter> {
    if mock {
        Box::new(MockCounter::from_settings(settings))
    } else {
        Box::new(ScpiCounter::from_settings(settings))
    }
}

/// Execute the selected operation on an open counter.
fn run(counter: &mut dyn FrequencyCounter, cli: &Cli) -> Result<Option<MeasuredData>> {
    if let Some(trig) = &cli.trig {
        counter
            .trig_level(Some(trig))
            .with_context(|| format!("Failed to set trigger levels '{}'", trig))?;
    }

    let mut data = MeasuredData::default();
    match &cli.command {
        Commands::Freq { cfg } => counter.freq(Some(cfg), &mut data).context("freq failed")?,
        Commands::Period { cfg } => counter.period(Some(cfg), &mut data).context("period failed")?,
        Commands::TimeInterval { cfg } => counter
            .time_interval(Some(cfg), &mut data)
            .context("timeInterval failed")?,
        Commands::FreqRatio { cfg } => counter
            .freq_ratio(Some(cfg), &mut data)
            .context("freqRatio failed")?,
        Commands::PkToPk { cfg } => counter.pk_to_pk(Some(cfg), &mut data).context("pkToPk failed")?,
        Commands::TrigLevel { cfg } => {
            counter
                .trig_level(Some(cfg))
                .with_context(|| format!("Failed to set trigger levels '{}'", cfg))?;
            info!("Trigger levels applied");
            return Ok(None);
        }
        Commands::Reset => {
            counter.reset_device().context("Reset failed")?;
            info!("Counter reset");
            return Ok(None);
        }
        Commands::Settings => return Ok(None),
    }
    Ok(Some(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_measurement_subcommand() {
        let cli = Cli::try_parse_from(["gencounter", "--mock", "freq", "ch:1 cou:dc"]).unwrap();
        assert!(cli.mock);
        assert_eq!(
            cli.command,
            Commands::Freq {
                cfg: "ch:1 cou:dc".to_string()
            }
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "gencounter",
            "time-interval",
            "ref:A ch:2",
            "--interface",
            "usb",
            "--port",
            "/dev/usbtmc1",
            "--debug",
        ])
        .unwrap();
        assert_eq!(cli.interface, Some(Interface::Usb));
        assert_eq!(cli.port.as_deref(), Some("/dev/usbtmc1"));
        assert!(cli.debug);
    }

    #[test]
    fn test_unknown_interface_rejected() {
        assert!(Cli::try_parse_from(["gencounter", "--interface", "gpib", "reset"]).is_err());
    }

    #[test]
    fn test_measurement_requires_config_string() {
        assert!(Cli::try_parse_from(["gencounter", "pk-to-pk"]).is_err());
    }

    #[test]
    fn test_run_against_mock() {
        let cli = Cli::try_parse_from(["gencounter", "--mock", "--trig", "trig1:a50", "pk-to-pk", "ch:1"]).unwrap();
        let settings = CounterSettings::default();
        let mut counter = build_counter(&settings, true);
        counter.open().unwrap();

        let data = run(counter.as_mut(), &cli).unwrap().unwrap();
        assert_eq!(data.channels, vec![1]);
        assert_eq!(data.unit, "V");
        assert_eq!(counter.session().trigger_config().len(), 1);
        counter.close().unwrap();
    }

    #[test]
    fn test_reset_prints_nothing() {
        let cli = Cli::try_parse_from(["gencounter", "--mock", "reset"]).unwrap();
        let mut counter = build_counter(&CounterSettings::default(), true);
        counter.open().unwrap();
        assert!(run(counter.as_mut(), &cli).unwrap().is_none());
    }

    #[test]
    fn test_validation_error_surfaces() {
        let cli = Cli::try_parse_from(["gencounter", "--mock", "freq", "ch:1"]).unwrap();
        let mut counter = build_counter(&CounterSettings::default(), true);
        counter.open().unwrap();
        let err = run(counter.as_mut(), &cli).unwrap_err();
        assert!(format!("{:#}", err).contains("freq failed"));
    }
}
