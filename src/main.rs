//! xrapc - Command-line client for XRAP servers
//!
//! Sends one request (`xrapc GET host:5555/time fmt=iso`) or runs an
//! interactive shell (`xrapc shell host:5555`).

mod commands;
mod items;
mod repl;

use bytes::Bytes;
use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{CommandError, Invocation, OutputOptions};
use items::UsageError;
use std::io::Read;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use xrapc_client::{Client, ClientConfig, ClientError};
use xrapc_protocol::Verb;

/// Exit status for invocation mistakes (same as clap's own usage errors).
const EXIT_USAGE: u8 = 2;
/// Exit status for communication failures.
const EXIT_FAILURE: u8 = 1;

#[derive(Parser)]
#[command(name = "xrapc")]
#[command(about = "Command-line client for XRAP servers")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Request timeout in seconds
    #[arg(short, long, global = true)]
    timeout: Option<u64>,

    /// Print the request as well as the response
    #[arg(short, long)]
    verbose: bool,

    /// Only print the response headers
    #[arg(short = 'H', long)]
    headers: bool,

    /// Only print the response body
    #[arg(short, long)]
    body: bool,

    /// Request method: GET, POST, PUT or DELETE
    method: Option<String>,

    /// Server and resource: HOST:PORT[/PATH]
    url: Option<String>,

    /// Request items: name:value, name=value, name=@file, name:=json, name:=@file
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    items: Vec<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive shell
    Shell {
        /// Server address: HOST:PORT
        server: String,
    },
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Shell { ref server }) => run_shell(&cli, server),
        None => run_once(&cli),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Usage(e)) => {
            eprintln!("{}: {}", "Error".red(), e);
            eprintln!("Run 'xrapc --help' for usage.");
            ExitCode::from(EXIT_USAGE)
        }
        Err(CliError::Failure(msg)) => {
            eprintln!("{}: {}", "Error".red(), msg);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

enum CliError {
    Usage(UsageError),
    Failure(String),
}

impl From<UsageError> for CliError {
    fn from(e: UsageError) -> Self {
        CliError::Usage(e)
    }
}

impl From<CommandError> for CliError {
    fn from(e: CommandError) -> Self {
        match e {
            CommandError::Usage(e) => CliError::Usage(e),
            other => CliError::Failure(other.to_string()),
        }
    }
}

impl From<ClientError> for CliError {
    fn from(e: ClientError) -> Self {
        CommandError::from(e).into()
    }
}

/// Builds the client configuration: file and environment first, then the
/// endpoint and timeout given on the command line.
fn client_config(endpoint: String, timeout: Option<u64>) -> Result<ClientConfig, CliError> {
    let mut config = ClientConfig::load().map_err(|e| CliError::Failure(e.to_string()))?;
    config.endpoint = endpoint;
    if let Some(secs) = timeout {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    tracing::debug!("Using config {:?}", config);
    Ok(config)
}

fn run_once(cli: &Cli) -> Result<(), CliError> {
    let (Some(method), Some(url)) = (&cli.method, &cli.url) else {
        return Err(UsageError::new("Must supply METHOD and URL").into());
    };

    let verb: Verb = method
        .parse()
        .map_err(|_| UsageError(format!("Unknown method '{}'", method)))?;
    let target = items::parse_url(url)?;

    let mut invocation = Invocation::new(verb, target.resource.as_str());
    for item in &cli.items {
        invocation.add_item(items::parse_item(item)?);
    }

    let body = if invocation.needs_body() {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .map_err(|e| CliError::Failure(format!("failed to read body from stdin: {}", e)))?;
        Some(Bytes::from(buf))
    } else {
        None
    };

    // Validate the request before connecting.
    invocation.build(body.clone())?;

    let config = client_config(target.endpoint(), cli.timeout)?;
    let client = Client::connect(&config)?;

    let opts = OutputOptions::from_flags(cli.verbose, cli.headers, cli.body);
    let output = commands::execute(&client, &invocation, body, &opts)?;
    print!("{}", output);
    Ok(())
}

fn run_shell(cli: &Cli, server: &str) -> Result<(), CliError> {
    let (host, port) = items::parse_host_port(server)?;
    let endpoint = format!("tcp://{}:{}", host, port);

    let config = client_config(endpoint.clone(), cli.timeout)?;
    let client = Client::connect(&config)?;

    repl::run(client, &endpoint).map_err(|e| CliError::Failure(e.to_string()))
}
