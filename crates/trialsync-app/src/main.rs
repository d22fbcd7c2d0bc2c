//! Trialsync Application
//!
//! Command-line caller for the trial-synchronization engine. Reads session
//! records exported by the ingest layer as JSON, runs the engine over
//! every session or unit, skips the ones it refuses and prints JSON.
//!
//! # Usage
//!
//! ```bash
//! # Laterality of every photostim protocol
//! trialsync laterality photostims.json
//!
//! # Bitcode-synchronize and segment sessions
//! trialsync --config rig.toml segment sessions.json
//!
//! # Contra hit trials of each unit, aligned to the go cue
//! trialsync align records.json units.json --port contra --outcome hit --align go_cue
//!
//! # Units' trials split into 5 groups of a latent variable
//! trialsync quantiles records.json units.json latent.json --variable q_contra
//!
//! # Delay-period firing regressed on latent variables
//! trialsync tuning latent.json firing.json --period delay --variables q_contra,rpe
//! ```

mod report;
mod store;

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use trialsync_core::condition::{ConditionRequest, OutcomeFilter, RelativePort};
use trialsync_core::latent::LatentVariableTable;
use trialsync_core::period::PeriodTable;
use trialsync_core::photostim::Photostim;
use trialsync_core::session::{RecordedUnit, SessionRecords};
use trialsync_native::config::EngineConfig;
use trialsync_native::pipeline::SessionPipeline;

use crate::report::{AlignRequest, ConditionSpec, QuantileRequest};

/// Trialsync Application
#[derive(Parser, Debug)]
#[command(name = "trialsync")]
#[command(author, version, about = "Trial synchronization and condition resolution", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Engine configuration (TOML); defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write JSON output to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Port relative to the recorded hemisphere
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum PortArg {
    Ipsi,
    Contra,
    Both,
}

/// Trial outcome
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutcomeArg {
    Hit,
    Miss,
    Ignore,
}

impl From<PortArg> for RelativePort {
    fn from(port: PortArg) -> Self {
        match port {
            PortArg::Ipsi => Self::Ipsi,
            PortArg::Contra => Self::Contra,
            PortArg::Both => Self::Both,
        }
    }
}

impl From<OutcomeArg> for OutcomeFilter {
    fn from(outcome: OutcomeArg) -> Self {
        match outcome {
            OutcomeArg::Hit => Self::Hit,
            OutcomeArg::Miss => Self::Miss,
            OutcomeArg::Ignore => Self::Ignore,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve brain area and laterality of photostim protocols
    Laterality {
        /// JSON array of photostim protocols
        protocols: PathBuf,
    },

    /// Synchronize sessions to their acquisition streams and segment trials
    Segment {
        /// JSON array of session records
        sessions: PathBuf,
    },

    /// Resolve condition trials and reference times for every unit
    Align {
        /// Session records (JSON)
        records: PathBuf,

        /// JSON array of recorded units
        units: PathBuf,

        /// Condition table name, e.g. `LR_hit_noearlylick`
        #[arg(long, conflicts_with_all = ["port", "outcome"])]
        condition: Option<String>,

        /// Port relative to the recorded hemisphere
        #[arg(long, value_enum, default_value = "both")]
        port: PortArg,

        /// Trial outcome
        #[arg(long, value_enum, default_value = "hit")]
        outcome: OutcomeArg,

        /// Drop trials with an early lick (defaults to the configured value)
        #[arg(long)]
        exclude_early_lick: bool,

        /// Alignment type
        #[arg(long, default_value = "go_cue")]
        align: String,

        /// Extra trial offset
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        offset: i32,

        /// Alignment types to place median markers for
        #[arg(long, value_delimiter = ',')]
        markers: Vec<String>,
    },

    /// Split each unit's trials into quantile groups of a latent variable
    Quantiles {
        /// Session records (JSON)
        records: PathBuf,

        /// JSON array of recorded units
        units: PathBuf,

        /// Latent-variable table (JSON)
        latent: PathBuf,

        /// Latent variable name
        #[arg(long)]
        variable: String,

        /// Group count (defaults to the configured value)
        #[arg(long)]
        groups: Option<usize>,

        /// Latent trial offset (defaults to the configured value)
        #[arg(long, allow_hyphen_values = true)]
        offset: Option<i32>,

        /// Alignment type
        #[arg(long, default_value = "go_cue")]
        align: String,
    },

    /// Regress a unit's period firing rate on latent variables
    Tuning {
        /// Latent-variable table (JSON)
        latent: PathBuf,

        /// Firing rate per trial over the period (JSON object keyed by trial)
        firing: PathBuf,

        /// Task period the firing rates cover
        #[arg(long, default_value = "delay")]
        period: String,

        /// Latent variable names
        #[arg(long, value_delimiter = ',', required = true)]
        variables: Vec<String>,

        /// Fit without an intercept
        #[arg(long)]
        no_intercept: bool,
    },

    /// Print the default configuration as TOML
    DefaultConfig,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Trialsync v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            EngineConfig::load(path)?
        }
        None => EngineConfig::default(),
    };

    run(cli.command, config, cli.output)
}

fn run(command: Commands, config: EngineConfig, output: Option<PathBuf>) -> anyhow::Result<()> {
    let output = output.as_deref();

    match command {
        Commands::Laterality { protocols } => {
            let protocols: Vec<Photostim> = store::load_json(&protocols)?;
            store::write_json(&report::laterality(&protocols), output)
        }
        Commands::Segment { sessions } => {
            let sessions: Vec<SessionRecords> = store::load_json(&sessions)?;
            let pipeline = SessionPipeline::new(config);
            store::write_json(&report::segment(&pipeline, &sessions), output)
        }
        Commands::Align { records, units, condition, port, outcome, exclude_early_lick, align, offset, markers } => {
            let records: SessionRecords = store::load_json(&records)?;
            let units: Vec<RecordedUnit> = store::load_json(&units)?;
            let condition = match condition {
                Some(name) => ConditionSpec::Named(name),
                None => ConditionSpec::Relative(ConditionRequest::new(
                    port.into(),
                    outcome.into(),
                    exclude_early_lick || config.analysis.exclude_early_lick,
                )),
            };
            let request = AlignRequest { condition, align, offset, markers };
            let table = config.alignment_table();
            store::write_json(&report::align(&records, &units, &table, &request), output)
        }
        Commands::Quantiles { records, units, latent, variable, groups, offset, align } => {
            let records: SessionRecords = store::load_json(&records)?;
            let units: Vec<RecordedUnit> = store::load_json(&units)?;
            let latent: LatentVariableTable = store::load_json(&latent)?;
            let request = QuantileRequest {
                variable,
                groups: groups.unwrap_or(config.analysis.quantile_groups),
                offset: offset.unwrap_or(config.analysis.latent_trial_offset),
                align,
            };
            let table = config.alignment_table();
            store::write_json(&report::quantiles(&records, &units, &table, &latent, &request), output)
        }
        Commands::Tuning { latent, firing, period, variables, no_intercept } => {
            let latent: LatentVariableTable = store::load_json(&latent)?;
            let firing: BTreeMap<u16, f64> = store::load_json(&firing)?;
            let tuning = report::tuning(&PeriodTable::standard(), &period, &latent, &firing, &variables, !no_intercept)?;
            store::write_json(&tuning, output)
        }
        Commands::DefaultConfig => {
            println!("{}", EngineConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}
