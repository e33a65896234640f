use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use login_relay::api::JobStatusResponse;
use login_relay::client::RelayClient;
use login_relay::config::{ServerConfig, TimingConfig};
use login_relay::scheduler::{JobId, LoginRequest};
use login_relay::server::RelayServer;
use login_relay::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "login-relay")]
#[command(version)]
#[command(about = "Relay login jobs between HTTP callers and a pull-based worker")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the relay server
    Server(ServerArgs),

    /// Job commands
    Job {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: JobCommands,
    },

    /// Show queue depth and worker liveness
    Health {
        #[command(flatten)]
        client: ClientArgs,
    },
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Seconds since the last heartbeat for the worker to count as online
    #[arg(long, default_value = "15")]
    liveness_threshold_secs: u64,

    /// Seconds an unpulled job stays in the queue before being pruned
    #[arg(long, default_value = "60")]
    stale_after_secs: u64,

    /// Seconds a submission waits for the worker's result
    #[arg(long, default_value = "40")]
    rendezvous_timeout_secs: u64,

    /// Milliseconds between result checks while a submission waits
    #[arg(long, default_value = "1000", value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval_ms: u64,

    /// Seconds a reported result is kept
    #[arg(long, default_value = "300")]
    result_retention_secs: u64,
}

impl ServerArgs {
    fn into_config(self) -> ServerConfig {
        let timing = TimingConfig::default()
            .with_liveness_threshold(Duration::from_secs(self.liveness_threshold_secs))
            .with_stale_after(Duration::from_secs(self.stale_after_secs))
            .with_rendezvous_timeout(Duration::from_secs(self.rendezvous_timeout_secs))
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_result_retention(Duration::from_secs(self.result_retention_secs));

        ServerConfig::new(SocketAddr::new(self.host, self.port)).with_timing(timing)
    }
}

// =============================================================================
// Client Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Relay base URL
    #[arg(long, short = 'a', default_value = "http://127.0.0.1:3000")]
    addr: String,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(clap::Subcommand, Debug)]
enum JobCommands {
    /// Submit a login and wait for the worker's result
    Submit {
        #[arg(long)]
        school_name: String,

        #[arg(long)]
        username: String,

        #[arg(long)]
        password: String,
    },
    /// Get the status of a job
    Status {
        /// The job ID
        job_id: String,
    },
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = args.into_config();
    tracing::info!(listen_addr = %config.listen_addr, "Starting login-relay");

    let shutdown = install_shutdown_handler()?;
    RelayServer::new(config).run(shutdown).await?;
    Ok(())
}

// =============================================================================
// Client Command Handlers
// =============================================================================

async fn handle_job_submit(
    client: &RelayClient,
    request: LoginRequest,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let (status, response) = client.submit(&request).await?;

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Table => {
            println!("HTTP Status: {}", status);
            println!("Success:     {}", response.success);
            println!("Message:     {}", response.message);
            if let Some(ref error) = response.error {
                println!("Error:       {}", error);
            }
            println!("Homeworks:   {}", response.homeworks.len());
            for homework in &response.homeworks {
                println!("  {}", homework);
            }
        }
    }

    if !status.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

async fn handle_job_status(
    client: &RelayClient,
    job_id: String,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = client.status(&JobId::from(job_id.as_str())).await?;

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Table => {
            println!("Job ID:       {}", job_id);
            match response {
                JobStatusResponse::Queued { message } => {
                    println!("Status:       queued");
                    println!("Message:      {}", message);
                }
                JobStatusResponse::Processing { message } => {
                    println!("Status:       processing");
                    println!("Message:      {}", message);
                }
                JobStatusResponse::Completed {
                    success,
                    error,
                    homeworks,
                    completed_at,
                } => {
                    println!("Status:       completed");
                    println!("Success:      {}", success);
                    println!("Completed At: {}", completed_at.to_rfc3339());
                    if let Some(error) = error {
                        println!("Error:        {}", error);
                    }
                    println!("Homeworks:    {}", homeworks.len());
                }
            }
        }
    }
    Ok(())
}

async fn handle_health(
    client: &RelayClient,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let health = client.health().await?;

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
        OutputFormat::Table => {
            let worker = if health.worker_online {
                "[+] online"
            } else {
                "[-] offline"
            };
            println!("Queue Size:     {}", health.queue_size);
            println!("Worker:         {}", worker);
            match health.last_heartbeat {
                Some(at) => println!("Last Heartbeat: {}", at.to_rfc3339()),
                None => println!("Last Heartbeat: never"),
            }
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => {
            run_server(server_args).await?;
        }
        Commands::Job { client, command } => {
            let relay = RelayClient::new(client.addr.clone());
            match command {
                JobCommands::Submit {
                    school_name,
                    username,
                    password,
                } => {
                    let request = LoginRequest::new(school_name, username, password);
                    handle_job_submit(&relay, request, &client.output).await?;
                }
                JobCommands::Status { job_id } => {
                    handle_job_status(&relay, job_id, &client.output).await?;
                }
            }
        }
        Commands::Health { client } => {
            let relay = RelayClient::new(client.addr.clone());
            handle_health(&relay, &client.output).await?;
        }
    }

    Ok(())
}
