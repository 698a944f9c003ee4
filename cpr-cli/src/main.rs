//! cprdecode: replay recorded CPR reports through the cpr-core resolver.
//!
//! Supports:
//! - Running the built-in decoder self-test
//! - Replaying a report file and printing each accepted fix
//! - Printing the effective configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use cpr_core::config::{self, Config};
use cpr_core::{geo, selftest};
use cpr_core::types::{icao_to_string, Fix};
use cpr_core::{CprRegistry, Resolver, TracingSink};

mod replay;

/// Replay time between registry prunes (seconds).
const PRUNE_INTERVAL: f64 = 60.0;

#[derive(Parser)]
#[command(
    name = "cprdecode",
    version,
    about = "Compact Position Reporting decode and replay"
)]
struct Cli {
    /// Config file (default: ~/.cpr-decode/config.yaml)
    #[arg(long, global = true, env = "CPR_DECODE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the decoder self-test
    Selftest,

    /// Resolve a file of recorded reports
    Replay {
        /// Report file, one `<ts> <icao> <E|O> <A|S> <lat> <lon> [nuc]` per line
        file: PathBuf,

        /// Receiver latitude
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Receiver longitude
        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,

        /// Receiver maximum range in nautical miles
        #[arg(long)]
        max_range_nm: Option<f64>,

        /// Print fixes as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Serialize)]
struct FixLine<'a> {
    icao: String,
    line: usize,
    #[serde(flatten)]
    fix: &'a Fix,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load(cli.config.as_ref());

    match cli.command {
        Commands::Selftest => {
            require_self_test();
            eprintln!("Self-test passed");
        }
        Commands::Replay {
            file,
            lat,
            lon,
            max_range_nm,
            json,
        } => {
            let mut config = config;
            if lat.is_some() {
                config.receiver.lat = lat;
            }
            if lon.is_some() {
                config.receiver.lon = lon;
            }
            if max_range_nm.is_some() {
                config.receiver.max_range_nm = max_range_nm;
            }
            if let Err(e) = config.validate() {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
            cmd_replay(file, &config, json);
        }
        Commands::Config => {
            let path = cli.config.unwrap_or_else(config::config_file);
            println!("# {}", path.display());
            print!("{}", config::serialize_config(&config));
        }
    }
}

fn load(path: Option<&PathBuf>) -> Config {
    let result = match path {
        Some(p) => config::load_config_from(p),
        None => config::load_config(),
    };
    match result {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

/// Exit with status 1 unless every self-test vector passes.
fn require_self_test() {
    let failures = selftest::self_test_report(&TracingSink);
    if failures.is_empty() {
        return;
    }
    for f in &failures {
        eprintln!("Self-test failed: {}: {}", f.name, f.detail);
    }
    eprintln!("{} self-test vector(s) failed, refusing to decode", failures.len());
    std::process::exit(1);
}

fn cmd_replay(file: PathBuf, config: &Config, json: bool) {
    require_self_test();

    let replay = match replay::ReplayReader::new(&file).read_all() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}: {e}", file.display());
            std::process::exit(1);
        }
    };

    eprintln!(
        "Replaying: {} ({} reports, {} malformed lines)",
        file.display(),
        replay.records.len(),
        replay.malformed
    );

    let receiver = config.receiver_position();
    let resolver = Resolver::new(config.resolver_config());
    let registry = CprRegistry::default();
    let mut fixes = 0u64;
    let mut last_prune = f64::NEG_INFINITY;

    for rec in &replay.records {
        let now = rec.report.timestamp;
        if now - last_prune >= PRUNE_INTERVAL {
            let pruned = registry.prune_stale(now);
            if pruned > 0 {
                tracing::debug!(pruned, "pruned stale aircraft");
            }
            last_prune = now;
        }

        let fix = match registry.resolve(&resolver, rec.icao, rec.report, now) {
            Ok(fix) => fix,
            Err(e) => {
                tracing::debug!(line = rec.line, icao = %icao_to_string(&rec.icao), "no fix: {e}");
                continue;
            }
        };
        fixes += 1;

        if json {
            let out = FixLine {
                icao: icao_to_string(&rec.icao),
                line: rec.line,
                fix: &fix,
            };
            match serde_json::to_string(&out) {
                Ok(s) => println!("{s}"),
                Err(e) => eprintln!("Error: {e}"),
            }
        } else {
            let range = receiver
                .map(|rx| format!(" {:.1}nm", geo::haversine_nm(&rx, &fix.position)))
                .unwrap_or_default();
            println!(
                "{:.3} {} {} {:?} nuc={} {}{range}",
                fix.timestamp,
                icao_to_string(&rec.icao),
                fix.position,
                fix.method,
                fix.nuc,
                fix.format
            );
        }
    }

    let stats = resolver.stats();
    eprintln!("{fixes} fixes from {} aircraft", registry.len());
    if json {
        match serde_json::to_string(&stats) {
            Ok(s) => eprintln!("{s}"),
            Err(e) => eprintln!("Error: {e}"),
        }
    } else {
        eprintln!(
            "global: {} ok, {} skipped, {} bad, {} range, {} speed",
            stats.global_ok,
            stats.global_skipped,
            stats.global_bad,
            stats.global_range,
            stats.global_speed
        );
        eprintln!(
            "local:  {} ok, {} skipped, {} range, {} speed",
            stats.local_ok, stats.local_skipped, stats.local_range, stats.local_speed
        );
    }
}
