mod config;
mod telemetry;

use chevereto::config::UpstreamConfig;
use chevereto::probe::Prober;
use chevereto::settings::normalize_domain;
use clap::{Args, Parser};
use config::{CommonConfig, Config, LoggingConfig};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(version, about = "Per-user Chevereto image hosting integration")]
enum CliCommand {
    /// Serve the Chevereto API
    Run(RunArgs),
    /// Check once whether a Chevereto instance is reachable
    Probe(ProbeArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[derive(Args)]
struct ProbeArgs {
    /// Base URL of the instance, e.g. https://img.example.com
    #[arg(long)]
    domain: String,
    #[arg(long, env = "CHEVERETO_API_KEY", hide_env_values = true)]
    api_key: String,
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,
}

fn main() -> ExitCode {
    match CliCommand::parse() {
        CliCommand::Run(args) => run(args),
        CliCommand::Probe(args) => probe(args),
    }
}

fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
}

fn run(args: RunArgs) -> ExitCode {
    let config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {e}", args.config.display());
            return ExitCode::FAILURE;
        }
    };

    let _telemetry = match telemetry::init(&config.common) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("could not set up telemetry: {e}");
            return ExitCode::FAILURE;
        }
    };

    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Could not start runtime");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("Starting Chevereto gateway");
    match rt.block_on(chevereto::run(config.chevereto)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Chevereto gateway stopped");
            ExitCode::FAILURE
        }
    }
}

fn probe(args: ProbeArgs) -> ExitCode {
    let logging = CommonConfig {
        metrics: None,
        logging: LoggingConfig {
            level: "warn".into(),
            sentry_dsn: None,
        },
    };
    let _telemetry = match telemetry::init(&logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("could not set up logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    let upstream = UpstreamConfig {
        probe_timeout_secs: args.timeout_secs,
        ..Default::default()
    };
    if let Err(e) = upstream.validate() {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let result = runtime().map_err(|e| e.to_string()).and_then(|rt| {
        rt.block_on(async {
            let client = chevereto::client::build_client(&upstream).map_err(|e| e.to_string())?;
            let prober = Prober::new(client, upstream.probe_timeout());
            prober
                .probe(&normalize_domain(&args.domain), &args.api_key)
                .await
                .map_err(|e| e.to_string())
        })
    });

    match result {
        Ok(result) => {
            println!("{}", result.message());
            if result.is_reachable() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}
