//! jobwatch: drive prompt-optimization jobs on a Job Service from the terminal.

mod commands;

use clap::{Parser, Subcommand};
use job_http::HttpJobService;
use job_poller::{JobPollingClient, PollConfig};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Start, follow, reconnect to, and cancel prompt-optimization jobs
#[derive(Debug, Parser)]
#[command(name = "jobwatch", version)]
struct Cli {
    /// Base URL of the Job Service
    #[arg(long, env = "JOB_API_URL", default_value = "http://localhost:8000")]
    api_url: String,
    /// Workshop the jobs belong to
    #[arg(long, env = "JOB_WORKSHOP_ID", default_value = "default")]
    workshop: String,
    /// Bearer token sent with every request
    #[arg(long, env = "JOB_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a new optimization job and follow its logs
    Start {
        /// Prompt to optimize (e.g. prompts:/support-agent/3)
        #[arg(long)]
        prompt_uri: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        iterations: Option<u32>,
        #[arg(long)]
        candidates: Option<u32>,
        #[arg(long)]
        judge: Option<String>,
        /// Target configuration as a JSON object
        #[arg(long)]
        target: Option<String>,
        /// Print the job id and exit instead of following
        #[arg(long)]
        no_follow: bool,
    },
    /// Re-attach to the running (or most recent) job and follow it
    Attach,
    /// Cancel the running (or most recent) job, or the given one
    Cancel { job_id: Option<String> },
    /// List previous jobs, newest first
    History,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    tracing::debug!(api_url = %cli.api_url, workshop = %cli.workshop, "using job service");
    let service = Arc::new(HttpJobService::new(cli.api_url, cli.workshop, cli.api_key));
    let client = Arc::new(JobPollingClient::new(
        service.clone(),
        PollConfig::from_env(),
    ));

    match cli.command {
        Command::Start {
            prompt_uri,
            model,
            iterations,
            candidates,
            judge,
            target,
            no_follow,
        } => {
            let req =
                commands::build_request(prompt_uri, model, iterations, candidates, judge, target)?;
            let job_id = client.start(&req).await?;
            println!("Started job {}", job_id);
            if !no_follow {
                commands::follow(&client).await?;
            }
        }
        Command::Attach => match client.reconnect_from_service().await? {
            Some(job_id) => {
                println!("Attached to job {}", job_id);
                commands::follow(&client).await?;
            }
            None => println!("No optimization jobs found"),
        },
        Command::Cancel { job_id } => {
            commands::cancel(&client, service.as_ref(), job_id.as_deref()).await?
        }
        Command::History => commands::history(service.as_ref()).await?,
    }
    Ok(())
}
