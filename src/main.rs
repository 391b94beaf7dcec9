//! HTTP Scenario Mock - CLI Entry Point

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use http_scenario_mock::{
    HttpRequest, HttpResponse, InterceptorConfig, Mode, Transport, TransportError,
};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_CONFIG: &str = r#"# Dispatch mode: disabled | enabled | mixed | record
mode: enabled

# Simulated latency for mocked responses (ms); rules may override it
delay_ms: 0

# Scenarios are read from here (defaults to storage_root)
scenario_root: ./scenarios

# Recorded exchanges are written here; required for record mode
# storage_root: ./scenarios

# Scenario file format: json | yaml
format: json

# Filing policies, consulted in order: mirror_path | method_path
filing:
  - mirror_path

# Return recording failures to the caller instead of logging them
fail_on_recording_error: false

# In mixed mode, also record live fallbacks
record_mixed_fallback: false

settings:
  log_matches: true
  log_unmatched: true
"#;

#[derive(Parser, Debug)]
#[command(
    name = "http-scenario-mock",
    about = "HTTP client interceptor - scenario-file mocks, live fallback, and recording",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mock-interceptor.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and every scenario file, then exit
    #[arg(long)]
    validate: bool,

    /// Resolve one request against the scenarios without touching the network
    #[arg(long, num_args = 2, value_names = ["METHOD", "URL"])]
    resolve: Option<Vec<String>>,
}

/// Transport for dry runs; any live call is an error.
struct OfflineTransport;

#[async_trait]
impl Transport for OfflineTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        Err(TransportError::new(format!(
            "offline: refusing live call to {} {}",
            request.method, request.url
        )))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        println!("{}", DEFAULT_CONFIG);
        return Ok(());
    }

    let config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        InterceptorConfig::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration");
        InterceptorConfig::default()
    };

    if args.validate {
        config.validate()?;
        let checked = config.check_scenarios()?;
        println!("Configuration is valid ({} scenario files checked)", checked);
        return Ok(());
    }

    if let Some(parts) = args.resolve {
        let [method, url] = parts.as_slice() else {
            anyhow::bail!("--resolve takes METHOD and URL");
        };
        let interceptor = config.into_builder().mode(Mode::Enabled).build()?;
        let request = HttpRequest::new(method.as_str(), url.as_str());

        match interceptor.intercept(&request, &OfflineTransport).await {
            Ok(response) => {
                println!("{}", response.status);
                for (name, value) in &response.headers {
                    println!("{}: {}", name, value);
                }
                println!();
                println!("{}", response.body_text());
            }
            Err(e) if e.is_no_match() => {
                warn!(method = %request.method, url = %request.url, "No scenario matched");
                std::process::exit(2);
            }
            Err(e) => return Err(e.into()),
        }
        return Ok(());
    }

    let interceptor = config.into_builder().build()?;
    info!(
        mode = %interceptor.mode(),
        providers = ?interceptor.provider_names(),
        recording = interceptor.is_recording_enabled(),
        "Configuration loaded; use --resolve to dry-run a request"
    );

    Ok(())
}
