//! herd CLI
//!
//! Runs one command, or pushes one file, across many hosts over SSH and
//! prints one outcome per host.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use tracing::error;
use tracing_subscriber::EnvFilter;

use herd_exec::auth::{self, ClientConfig};
use herd_exec::dispatch::dispatch;
use herd_exec::error::ExecError;
use herd_exec::result::{TaskOutcome, summarize};
use herd_exec::session::SessionFactory;

#[derive(Parser)]
#[command(name = "herd")]
#[command(about = "Run a command or push a file across many hosts over SSH", long_about = None)]
struct Cli {
    /// Login user (defaults to the invoking user's login name)
    #[arg(short = 'l', long, global = true)]
    user: Option<String>,

    /// Remote SSH port
    #[arg(short, long, global = true, default_value_t = 22)]
    port: u16,

    /// Print outcomes as JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command on every host and collect its output
    Run {
        /// Command to run remotely
        command: String,
        /// Target hosts
        #[arg(required = true)]
        hosts: Vec<String>,
    },
    /// Upload a local file to the same path on every host
    Push {
        /// Local source file
        source: PathBuf,
        /// Remote target path
        target: String,
        /// Target hosts
        #[arg(required = true)]
        hosts: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Credentials are resolved exactly once, before any host is dialed
    let user = cli.user.clone().unwrap_or_else(auth::login_user);
    let config = ClientConfig::resolve(
        user,
        auth::agent_socket_from_env(),
        &auth::default_key_paths(),
    )
    .await;
    let factory = Arc::new(SessionFactory::new(Arc::new(config)).with_port(cli.port));

    match cli.command {
        Commands::Run { command, hosts } => {
            let command = Arc::new(command);
            let results = dispatch(&hosts, |host| {
                let factory = Arc::clone(&factory);
                let command = Arc::clone(&command);
                async move { run_on(&factory, &host, &command).await }
            })
            .await;

            render(&summarize(&results, |output| Some(output.clone())), cli.json)
        }
        Commands::Push { source, target, hosts } => {
            // No per-host work is meaningful without the file contents
            let contents = tokio::fs::read(&source)
                .await
                .wrap_err_with(|| format!("cannot read {}", source.display()))?;
            let contents = Arc::new(contents);
            let target = Arc::new(target);

            let results = dispatch(&hosts, |host| {
                let factory = Arc::clone(&factory);
                let contents = Arc::clone(&contents);
                let target = Arc::clone(&target);
                async move { push_to(&factory, &host, &target, &contents).await }
            })
            .await;

            render(&summarize(&results, |_| None), cli.json)
        }
    }
}

async fn run_on(
    factory: &SessionFactory,
    host: &str,
    command: &str,
) -> Result<String, ExecError> {
    let outcome = async {
        let mut session = factory.open(host).await?;
        let result = session.run(command).await;
        session.close().await;
        result
    }
    .await;

    if let Err(e) = &outcome {
        error!(host = %host, error = %e, "command failed");
    }
    outcome
}

async fn push_to(
    factory: &SessionFactory,
    host: &str,
    target: &str,
    contents: &[u8],
) -> Result<(), ExecError> {
    let outcome = async {
        let mut session = factory.open(host).await?;
        let result = session.upload(target, contents).await;
        session.close().await;
        result
    }
    .await;

    if let Err(e) = &outcome {
        error!(host = %host, error = %e, "upload failed");
    }
    outcome
}

/// Print the collected outcomes to stdout, one line per host.
fn render(outcomes: &[TaskOutcome], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcomes)?);
        return Ok(());
    }

    println!();
    for outcome in outcomes {
        if !outcome.ok {
            println!(
                "{}: (error) {}",
                outcome.host,
                outcome.error.as_deref().unwrap_or("unknown")
            );
            continue;
        }
        match &outcome.output {
            Some(output) if output.ends_with('\n') => print!("{}: {}", outcome.host, output),
            Some(output) => println!("{}: {}", outcome.host, output),
            None => println!("{}: ok", outcome.host),
        }
    }
    Ok(())
}
