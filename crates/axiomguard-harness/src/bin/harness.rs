//! CLI entrypoint for the axiomguard harness.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use axiomguard_harness::structured_log::{LogLevel, Outcome, validate_log_file};
use axiomguard_harness::{HarnessError, LogEmitter, Scenario, run_scenario, sample_gate, script};
use axiomguard_kernel::{DomainTag, KernelConfig, SeverityScript};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Supervision tooling for axiomguard.
#[derive(Debug, Parser)]
#[command(name = "axiomguard-harness")]
#[command(about = "Scripted runs, scenarios and gate statistics for the axiomguard kernel")]
struct Cli {
    /// Kernel configuration JSON (defaults, or `AXIOMGUARD_CONFIG`, when omitted).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// JSONL output path (stdout when omitted).
    #[arg(long, global = true)]
    log: Option<PathBuf>,
    /// Run identifier used in trace ids.
    #[arg(long, global = true, default_value = "local")]
    run_id: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Inject a comma-separated severity list and print the score trajectory.
    Script {
        /// e.g. `critical,high,high,low`.
        #[arg(long)]
        severities: String,
        /// Delay between injected violations.
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
        /// Keep recovering this long after the last violation.
        #[arg(long, default_value_t = 0)]
        settle_ms: u64,
        /// Domain the violations are attributed to.
        #[arg(long, default_value = "INTEGRITY")]
        domain: String,
    },
    /// Run end-to-end scenarios (all of them when none is named).
    Scenario {
        /// One of: spatial-topology, geometry-overlap, combat-desync,
        /// quality-collapse, critical-recovery, formal-worker.
        #[arg(long)]
        name: Option<String>,
    },
    /// Measure the sampling gate at every status.
    Sample {
        #[arg(long, default_value = "RENDER")]
        domain: String,
        #[arg(long, default_value_t = 20_000)]
        trials: u64,
        #[arg(long, default_value_t = 0x5EED)]
        seed: u64,
    },
    /// Validate a JSONL log written by this tool.
    ValidateLog {
        #[arg(long)]
        path: PathBuf,
    },
    /// Print the effective configuration and its fingerprint.
    Config,
}

fn load_config(path: Option<&Path>) -> Result<KernelConfig, HarnessError> {
    let config = match path {
        Some(path) => KernelConfig::from_path(path)?,
        None => KernelConfig::from_env()?,
    };
    Ok(config)
}

fn emitter(path: Option<&Path>, run_id: &str) -> Result<LogEmitter, HarnessError> {
    Ok(match path {
        Some(path) => LogEmitter::to_file(path, run_id)?,
        None => LogEmitter::to_stdout(run_id),
    })
}

fn run(cli: Cli) -> Result<bool, HarnessError> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Script {
            severities,
            interval_ms,
            settle_ms,
            domain,
        } => {
            let config = load_config(config_path)?;
            let mut script_def = SeverityScript::new(script::parse_severities(&severities)?, interval_ms);
            script_def.settle_ms = settle_ms;
            script_def.domain = DomainTag::from_str_loose(&domain)
                .ok_or_else(|| HarnessError::UnknownSource(domain.clone()))?;
            let mut log = emitter(cli.log.as_deref(), &cli.run_id)?;
            let trace = script::run_and_log(&config, &script_def, &mut log)?;
            info!(
                points = trace.points.len(),
                final_score = trace.final_score().unwrap_or_default(),
                "script complete"
            );
            Ok(true)
        }
        Command::Scenario { name } => {
            let config = load_config(config_path)?;
            let scenarios = match name {
                Some(name) => vec![Scenario::parse(&name)?],
                None => Scenario::ALL.to_vec(),
            };
            let mut log = emitter(cli.log.as_deref(), &cli.run_id)?;
            let mut all_passed = true;
            for scenario in scenarios {
                let report = run_scenario(scenario, &config, &mut log)?;
                if report.passed {
                    info!(scenario = scenario.as_str(), score = report.final_score, "scenario passed");
                } else {
                    all_passed = false;
                    for check in report.failed_checks() {
                        error!(scenario = scenario.as_str(), check = %check.name, detail = %check.detail, "check failed");
                    }
                }
            }
            Ok(all_passed)
        }
        Command::Sample {
            domain,
            trials,
            seed,
        } => {
            let config = load_config(config_path)?;
            let domain = DomainTag::from_str_loose(&domain)
                .ok_or_else(|| HarnessError::UnknownSource(domain.clone()))?;
            let mut log = emitter(cli.log.as_deref(), &cli.run_id)?;
            let samples = sample_gate(&config, domain, trials, seed);
            let mut all_within = true;
            for sample in &samples {
                all_within &= sample.within_tolerance;
                let entry = log
                    .entry(LogLevel::Info, "gate_sample")
                    .with_outcome(Outcome::from_bool(sample.within_tolerance))
                    .with_details(serde_json::to_value(sample).map_err(std::io::Error::other)?);
                log.emit_entry(entry)?;
            }
            log.flush()?;
            Ok(all_within)
        }
        Command::ValidateLog { path } => {
            let (lines, errors) = validate_log_file(&path)?;
            for err in &errors {
                error!("{err}");
            }
            info!(lines, errors = errors.len(), path = %path.display(), "log validated");
            Ok(errors.is_empty())
        }
        Command::Config => {
            let config = load_config(config_path)?;
            config.validate()?;
            let json = serde_json::to_string_pretty(&config).map_err(std::io::Error::other)?;
            println!("{json}");
            println!("fingerprint: {}", config.fingerprint());
            Ok(true)
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{err}");
            ExitCode::from(2)
        }
    }
}
