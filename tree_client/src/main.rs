use std::{fs::File, process::ExitCode, sync::Mutex, time::Instant};

use argh::FromArgs;
use spdz_client::{
    config::SessionConfig,
    dataset::{ClientRole, Dataset},
    error::ConfigError,
    fields::Mersenne127,
    session::{self, ResultMode, TrainingReport},
    transport::{connect_engines, EngineAddress},
    FieldConfig, Result, SpdzClient,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Field the engines compute in.
type Fp = Mersenne127;

/// Dataset used when none is given.
const DEFAULT_DATASET: &str = "bank_marketing_data";

/// Client of a privacy-preserving decision tree training cohort.
#[derive(FromArgs, Debug)]
struct Options {
    /// client ID; client 0 holds the labels
    #[argh(positional)]
    client_id: u32,

    /// number of computing engines
    #[argh(positional)]
    engine_count: usize,

    /// dataset name under the data directory
    #[argh(positional, default = "DEFAULT_DATASET.to_string()")]
    dataset_name: String,

    /// port of engine 0; engine i listens on port_base + i
    #[argh(positional)]
    port_base: Option<u16>,

    /// comma-separated engine hosts, one per engine
    #[argh(option)]
    hosts: Option<String>,

    /// path to JSON session configuration file
    #[argh(option)]
    config: Option<String>,

    /// directory holding one subdirectory per dataset
    #[argh(option, default = "String::from(\"data\")")]
    data_dir: String,

    /// preprocessing directory with the engines' Params-Data file
    #[argh(option)]
    prep_dir: Option<String>,

    /// result to wait for: index, vector:<size> or authenticated
    #[argh(option, default = "ResultMode::Index", from_str_fn(parse_result_mode))]
    result: ResultMode,

    /// write logs to this file instead of stderr
    #[argh(option)]
    log_file: Option<String>,
}

fn parse_result_mode(value: &str) -> std::result::Result<ResultMode, String> {
    value.parse().map_err(|err| format!("{}", err))
}

fn init_logging(log_file: Option<&str>) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let file = File::create(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn session_config(options: &Options) -> Result<SessionConfig> {
    let mut config = match &options.config {
        Some(path) => SessionConfig::load(path, options.engine_count)?,
        None => SessionConfig::local(options.engine_count),
    };
    if let Some(hosts) = &options.hosts {
        config.engines = hosts.split(',').map(|host| host.trim().to_string()).collect();
    }
    if let Some(port_base) = options.port_base {
        config.port_base = port_base;
    }
    config.validate(options.engine_count)?;
    Ok(config)
}

async fn run(options: Options) -> Result<TrainingReport> {
    let config = session_config(&options)?;
    let field = match &options.prep_dir {
        Some(dir) => FieldConfig::<Fp>::load(dir, config.fixed_precision)?,
        None => FieldConfig::<Fp>::for_field()?,
    };
    info!(
        prime = %field.modulus(),
        gf2n_degree = field.gf2n_degree(),
        fixed_precision = field.fixed_precision(),
        "field parameters"
    );

    let role = ClientRole::for_client(options.client_id);
    let path = Dataset::client_path(&options.data_dir, &options.dataset_name, options.client_id);
    let data = Dataset::load(&path)?.training_data(role, config.training_fraction);
    info!(
        client_id = options.client_id,
        ?role,
        dataset = %path.display(),
        samples = data.num_samples(),
        features = data.num_features(),
        "loaded training data"
    );

    let addresses = EngineAddress::with_port_base(&config.engines, config.port_base)
        .ok_or_else(|| {
            ConfigError::InvalidArgument(format!(
                "engine ports starting at {} exceed 65535",
                config.port_base
            ))
        })?;
    let channels = connect_engines(&addresses, options.client_id).await?;
    info!("all engines connected, starting training");

    let start_time = Instant::now();
    let client = SpdzClient::new(&field, channels);
    let report = session::run_session(client, &data, options.result).await?;
    info!(
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        inputs = report.num_inputs,
        "training finished"
    );
    Ok(report)
}

#[tokio::main]
async fn main() -> ExitCode {
    let options: Options = argh::from_env();

    if let Err(err) = init_logging(options.log_file.as_deref()) {
        eprintln!("Cannot open log file: {}", err);
        return ExitCode::FAILURE;
    }

    match run(options).await {
        Ok(report) => {
            info!(result = ?report.result, "done");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
