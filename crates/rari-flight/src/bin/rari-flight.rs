use clap::{Arg, Command};
use futures::StreamExt;
use rari_flight::{FlightConfig, FlightError, Mode, Model, Request, render_to_stream};
use std::io::Read;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let matches = Command::new("rari-flight")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Encode a JSON document as a React Flight stream")
        .arg(Arg::new("input").value_name("FILE").help("JSON input file, or - for stdin").default_value("-"))
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("TOML configuration file")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("Encoder mode: development or production")
                .value_parser(["development", "dev", "production", "prod"]),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .help("Include error messages, stacks and postpone reasons in the stream")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("prefix")
                .long("prefix")
                .value_name("PREFIX")
                .help("Prefix for generated identifiers"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Reduce log output")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    init_logging(&matches)?;

    let config = load_configuration(&matches)?;
    debug!("Encoding in {} mode", config.mode);

    let input = read_input(matches.get_one::<String>("input").map_or("-", String::as_str))?;
    let json: serde_json::Value = serde_json::from_str(&input).map_err(|e| {
        error!("Input is not valid JSON: {}", e);
        FlightError::from(e)
    })?;

    let request = Request::new(Model::from_json(&json), config.to_request_options());
    let mut stream = render_to_stream(request, &config.stream);
    let mut stdout = tokio::io::stdout();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            error!("Flight stream failed: {}", e);
            e
        })?;
        stdout.write_all(&chunk).await?;
    }
    stdout.flush().await?;

    Ok(())
}

fn init_logging(matches: &clap::ArgMatches) -> Result<(), FlightError> {
    let verbose = matches.get_flag("verbose");
    let quiet = matches.get_flag("quiet");

    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("rari_flight={default_level}")))
        .map_err(|e| FlightError::config(format!("Failed to create log filter: {e}")))?;

    // Rows go to stdout, so logs go to stderr.
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(verbose)
                .with_line_number(verbose)
                .compact(),
        )
        .init();

    Ok(())
}

fn load_configuration(matches: &clap::ArgMatches) -> Result<FlightConfig, FlightError> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => FlightConfig::load(path)?,
        None => FlightConfig::default(),
    };

    if let Some(mode) = matches.get_one::<String>("mode") {
        config.mode = match mode.as_str() {
            "production" | "prod" => Mode::Production,
            _ => Mode::Development,
        };
    }
    if matches.get_flag("debug") {
        config.mode = Mode::Development;
    }
    if let Some(prefix) = matches.get_one::<String>("prefix") {
        config.identifier_prefix.clone_from(prefix);
    }

    config.validate()?;
    Ok(config)
}

fn read_input(path: &str) -> Result<String, FlightError> {
    if path == "-" {
        let mut input = String::new();
        std::io::stdin().read_to_string(&mut input)?;
        return Ok(input);
    }
    std::fs::read_to_string(path).map_err(|e| FlightError::config(format!("Failed to read {path}: {e}")))
}
