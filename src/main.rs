//! CLI entry point for sending requests to a search node through the fetch
//! primitive.
//!
//! Outside the sandbox the primitive is [`BasicFetch`], so the binary doubles
//! as a way to exercise a connection configuration end to end.

use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use reqwest::Method;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use urlfetch_transport::{
    BasicFetch, Connection, ConnectionConfig, HttpAuth, Response, UrlFetchConnection,
};

#[derive(Parser)]
#[command(name = "urlfetch")]
#[command(about = "Send search requests through the urlfetch connection", long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnectionArgs {
    /// JSON connection config file
    #[arg(short, long)]
    config: Option<String>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Connect over https
    #[arg(long, default_value_t = false)]
    ssl: bool,

    /// Skip certificate validation
    #[arg(long, default_value_t = false)]
    insecure: bool,

    /// Basic auth credentials as user:pass
    #[arg(long)]
    auth: Option<HttpAuth>,

    #[arg(long)]
    url_prefix: Option<String>,

    /// Extra header sent with every request, as Name:Value
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a single request and print the response
    Request {
        /// HTTP method, e.g. GET or POST
        method: String,

        /// Path appended to the base URL, e.g. /_cluster/health
        path: String,

        /// Query parameter as key=value
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Request body
        #[arg(short, long)]
        body: Option<String>,

        /// Deadline in seconds
        #[arg(short, long)]
        timeout: Option<f64>,

        /// Status code to accept instead of failing on
        #[arg(long)]
        ignore: Vec<u16>,
    },
    /// Fetch cluster health
    Health {
        /// Deadline in seconds
        #[arg(short, long)]
        timeout: Option<f64>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/urlfetch.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("urlfetch.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let config = connection_config(cli.connection)?;
    let fetch = BasicFetch::new().context("failed to build HTTP client")?;
    let connection = UrlFetchConnection::new(config, fetch)?;
    info!(connection = %connection, "Connection ready");

    let response = match cli.command {
        Commands::Request {
            method,
            path,
            params,
            body,
            timeout,
            ignore,
        } => {
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .with_context(|| format!("invalid HTTP method '{method}'"))?;
            let params: Vec<(&str, &str)> = params
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            connection.perform_request(
                method,
                &path,
                &params,
                body.as_deref().map(str::as_bytes),
                deadline(timeout)?,
                &ignore,
            )?
        }
        Commands::Health { timeout } => connection.perform_request(
            Method::GET,
            "/_cluster/health",
            &[],
            None,
            deadline(timeout)?,
            &[],
        )?,
    };

    connection.close();
    print_response(&response);

    Ok(())
}

/// Layers defaults, the config file, `ES_*` variables, and flags, in that order.
fn connection_config(args: ConnectionArgs) -> Result<ConnectionConfig> {
    let mut config = match &args.config {
        Some(path) => ConnectionConfig::load(path)?,
        None => ConnectionConfig::default(),
    }
    .apply_env()?;

    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.ssl {
        config.use_ssl = true;
    }
    if args.insecure {
        config.verify_certs = false;
    }
    if let Some(auth) = args.auth {
        config.http_auth = Some(auth);
    }
    if let Some(prefix) = args.url_prefix {
        config.url_prefix = prefix;
    }
    config.headers.extend(args.headers);

    Ok(config)
}

fn deadline(seconds: Option<f64>) -> Result<Option<Duration>> {
    seconds
        .map(|s| Duration::try_from_secs_f64(s).with_context(|| format!("invalid timeout '{s}'")))
        .transpose()
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once(':')
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .ok_or_else(|| format!("expected Name:Value, got '{raw}'"))
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

fn print_response(response: &Response) {
    println!("{}", response.status);
    println!("{}", String::from_utf8_lossy(&response.body));
}
