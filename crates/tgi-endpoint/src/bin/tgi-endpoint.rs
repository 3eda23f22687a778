//! TGI endpoint CLI - deploy, exercise and tear down Hugging Face TGI endpoints on SageMaker.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tgi_endpoint::benchmark::{BenchmarkRequest, BenchmarkRunner, LlmPerf};
use tgi_endpoint::workflow::{self, RunPlan};
use tgi_endpoint::{
    resource_name, AppConfig, AwsIdentity, ChatMessage, Credentials, DeploymentState, Endpoint,
    EndpointProvider, EndpointStatus, SageMaker, Session, SessionConfig,
};

/// TGI endpoint CLI - Hosted LLM inference on SageMaker.
#[derive(Parser)]
#[command(name = "tgi-endpoint")]
#[command(about = "Deploy, exercise and tear down Hugging Face TGI endpoints on SageMaker")]
struct Cli {
    /// YAML configuration file.
    #[arg(long, short = 'c', env = "TGI_ENDPOINT_CONFIG")]
    config: Option<PathBuf>,

    /// AWS region (or set `AWS_REGION` env var).
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// AWS access key ID (or set `AWS_ACCESS_KEY_ID` env var).
    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    access_key_id: Option<String>,

    /// AWS secret access key (or set `AWS_SECRET_ACCESS_KEY` env var).
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    secret_access_key: Option<String>,

    /// AWS session token (or set `AWS_SESSION_TOKEN` env var).
    #[arg(long, env = "AWS_SESSION_TOKEN", hide_env_values = true)]
    session_token: Option<String>,

    /// Execution role ARN (or set `SAGEMAKER_ROLE_ARN` env var).
    #[arg(long, env = "SAGEMAKER_ROLE_ARN")]
    role_arn: Option<String>,

    /// Hugging Face Hub token (or set `HUGGING_FACE_HUB_TOKEN` env var).
    #[arg(long, env = "HUGGING_FACE_HUB_TOKEN", hide_env_values = true)]
    hf_token: Option<String>,

    /// Directory holding deployment state.
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the serving image URI.
    Image,

    /// Print the container environment with the token masked.
    Env,

    /// Deploy an endpoint and wait until it is in service.
    Deploy {
        /// Resource name prefix (defaults to the image repository).
        #[arg(long)]
        name: Option<String>,

        /// Replace a recorded deployment that is still live.
        #[arg(long, default_value = "false")]
        force: bool,
    },

    /// Show the endpoint status.
    Status {
        /// Endpoint name (defaults to the deployed one).
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Send one chat request.
    Chat {
        /// User prompt.
        #[arg(long)]
        prompt: String,

        /// System prompt.
        #[arg(long)]
        system: Option<String>,

        /// Endpoint name (defaults to the deployed one).
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Run llmperf against the endpoint.
    Benchmark {
        /// Concurrent requests.
        #[arg(long)]
        concurrency: Option<u32>,

        /// Requests to complete before stopping.
        #[arg(long)]
        max_requests: Option<u32>,

        /// Timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,

        /// Path to the llmperf checkout.
        #[arg(long)]
        llmperf_dir: Option<PathBuf>,

        /// Endpoint name (defaults to the deployed one).
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Delete the model, endpoint and endpoint config.
    Teardown {
        /// Skip confirmation prompt.
        #[arg(long, short = 'y', default_value = "false")]
        yes: bool,

        /// Endpoint name (defaults to the deployed one).
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Deploy, chat, benchmark and tear down in one go.
    Run {
        /// Resource name prefix (defaults to the image repository).
        #[arg(long)]
        name: Option<String>,

        /// Skip the llmperf run.
        #[arg(long, default_value = "false")]
        skip_benchmark: bool,

        /// Leave the endpoint running.
        #[arg(long, default_value = "false")]
        keep: bool,

        /// Replace a recorded deployment that is still live.
        #[arg(long, default_value = "false")]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(token) = &cli.hf_token {
        config.serving.hf_token.clone_from(token);
    }
    if let Some(dir) = &cli.state_dir {
        config.state_dir.clone_from(dir);
    }
    let region = resolve_region(&cli, &config);

    match &cli.command {
        Commands::Image => {
            let region = region.context("Region is required to resolve the image URI")?;
            println!("{}", config.image.resolve(&region));
        }

        Commands::Env => {
            println!("\n📦 Container environment");
            println!("{}", "=".repeat(60));
            for (key, value) in config.serving.masked_environment() {
                println!("   {key:<26} {value}");
            }
            if let Err(e) = config.serving.validate() {
                println!("\n⚠️  {e}");
            }
            println!();
        }

        Commands::Deploy { name, force } => {
            let region = region.context("Region is required")?;
            let mut state = DeploymentState::begin(&config.state_dir, &region, *force)?;
            let credentials = resolve_credentials(&cli)?;
            let session = resolve_session(&cli, &config, &region, credentials).await?;
            let provider = provider(&config, &session.region, session.credentials.clone())?;

            let image_uri = config.image.resolve(&session.region);
            let name = endpoint_name(name.as_deref(), &config);
            let request = workflow::deploy_request(
                &name,
                &image_uri,
                &session.role_arn,
                &config.serving,
                &config.deployment,
            )?;

            println!("⏳ Deploying endpoint {name} (this can take 10+ minutes)...");
            let endpoint = workflow::deploy(&provider, &request, Some(&mut state))
                .await
                .context("Deployment failed")?;

            println!("\n✅ Endpoint is in service!");
            print_endpoint(&endpoint);
        }

        Commands::Status { endpoint } => {
            let region = region.context("Region is required")?;
            let provider = provider(&config, &region, resolve_credentials(&cli)?)?;
            let name = match endpoint {
                Some(name) => name.clone(),
                None => saved_endpoint(&config.state_dir)?.name,
            };

            let endpoint = provider.get_endpoint(&name).await?;
            print_endpoint(&endpoint);
            if let Some(reason) = &endpoint.failure_reason {
                println!("   Failure:  {reason}");
            }
        }

        Commands::Chat {
            prompt,
            system,
            endpoint,
        } => {
            let region = region.context("Region is required")?;
            let provider = provider(&config, &region, resolve_credentials(&cli)?)?;
            let endpoint = target_endpoint(&provider, endpoint.as_deref(), &config.state_dir).await?;

            let mut messages = Vec::new();
            if let Some(system) = system {
                messages.push(ChatMessage::system(system.clone()));
            }
            messages.push(ChatMessage::user(prompt.clone()));

            let reply = workflow::chat(&provider, &endpoint, messages, &config.generation).await?;
            println!("{reply}");
        }

        Commands::Benchmark {
            concurrency,
            max_requests,
            timeout,
            llmperf_dir,
            endpoint,
        } => {
            let region = region.context("Region is required")?;
            let credentials = resolve_credentials(&cli)?;
            let target = match endpoint {
                Some(name) => name.clone(),
                None => saved_endpoint(&config.state_dir)?.name,
            };

            let mut bench = config.benchmark.clone();
            if let Some(c) = concurrency {
                bench.concurrency = *c;
            }
            if let Some(n) = max_requests {
                bench.max_requests = *n;
            }
            if let Some(t) = timeout {
                bench.timeout_secs = *t;
            }
            if let Some(dir) = llmperf_dir {
                bench.llmperf_dir.clone_from(dir);
            }

            let runner = LlmPerf::new(&bench)?.with_aws(&region, &credentials);
            let request = BenchmarkRequest::new(&target, &bench);
            println!("⏳ Running llmperf against {target}...");
            let summary = runner.run(&request).await.context("Benchmark failed")?;

            println!("\n📊 Benchmark summary");
            println!("{}", "=".repeat(60));
            print!("{summary}");
        }

        Commands::Teardown { yes, endpoint } => {
            let region = region.context("Region is required")?;
            let provider = provider(&config, &region, resolve_credentials(&cli)?)?;

            let mut state = DeploymentState::load(&config.state_dir)?;
            let target = match (endpoint, state.as_ref().and_then(|s| s.endpoint.clone())) {
                (Some(name), _) => provider.get_endpoint(name).await?,
                (None, Some(saved)) => saved,
                (None, None) => anyhow::bail!(
                    "No deployment found in {}. Use --endpoint.",
                    config.state_dir.display()
                ),
            };

            if !yes {
                println!("⚠️  This deletes:");
                println!("   Model:           {}", target.model_name);
                println!("   Endpoint config: {}", target.config_name);
                println!("   Endpoint:        {}", target.name);
                println!("   This action cannot be undone.");
                println!("   Use --yes to proceed.");
                return Ok(());
            }

            // Only track state for the endpoint it describes.
            let tracked = state
                .as_ref()
                .and_then(|s| s.endpoint.as_ref())
                .is_some_and(|e| e.name == target.name);
            let state = if tracked { state.as_mut() } else { None };

            workflow::teardown(&provider, &target, state).await?;
            println!("\n✅ Endpoint {} deleted successfully!", target.name);
        }

        Commands::Run {
            name,
            skip_benchmark,
            keep,
            force,
        } => {
            let region = region.context("Region is required")?;
            let mut state = DeploymentState::begin(&config.state_dir, &region, *force)?;
            let credentials = resolve_credentials(&cli)?;
            let session = resolve_session(&cli, &config, &region, credentials).await?;
            let provider = provider(&config, &session.region, session.credentials.clone())?;

            let runner = if *skip_benchmark {
                None
            } else {
                Some(
                    LlmPerf::new(&config.benchmark)?
                        .with_aws(&session.region, &session.credentials),
                )
            };

            let plan = RunPlan {
                name: endpoint_name(name.as_deref(), &config),
                image_uri: config.image.resolve(&session.region),
                role_arn: session.role_arn.clone(),
                serving: config.serving.clone(),
                deployment: config.deployment.clone(),
                generation: config.generation.clone(),
                conversations: workflow::default_conversations(),
                benchmark: config.benchmark.clone(),
                teardown: !keep,
            };

            let report = workflow::run(
                &provider,
                runner.as_ref().map(|r| r as &dyn BenchmarkRunner),
                &plan,
                Some(&mut state),
            )
            .await?;

            println!("\n✅ Endpoint {} was in service", report.endpoint.name);
            for (messages, reply) in plan.conversations.iter().zip(&report.replies) {
                if let Some(question) = messages.last() {
                    println!("\n💬 {}", question.content);
                }
                println!("{reply}");
            }
            if let Some(summary) = &report.benchmark {
                println!("\n📊 Benchmark summary");
                println!("{}", "=".repeat(60));
                print!("{summary}");
            }
            if report.torn_down {
                println!("\n🧹 Resources deleted");
            } else {
                println!(
                    "\n💡 Run `tgi-endpoint teardown --yes` to delete {}",
                    report.endpoint.name
                );
            }
        }
    }

    Ok(())
}

fn resolve_region(cli: &Cli, config: &AppConfig) -> Option<String> {
    cli.region
        .clone()
        .or_else(|| config.region.clone())
        .or_else(|| std::env::var("AWS_DEFAULT_REGION").ok())
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
}

fn resolve_credentials(cli: &Cli) -> Result<Credentials> {
    Credentials::from_parts(
        cli.access_key_id.as_deref(),
        cli.secret_access_key.as_deref(),
        cli.session_token.as_deref(),
    )
    .context("AWS credentials are missing")
}

async fn resolve_session(
    cli: &Cli,
    config: &AppConfig,
    region: &str,
    credentials: Credentials,
) -> Result<Session> {
    let identity =
        AwsIdentity::new(credentials.clone(), region).context("Failed to create identity client")?;
    let session_config = SessionConfig {
        region: region.to_string(),
        credentials,
        role_arn: cli.role_arn.clone().or_else(|| config.role_arn.clone()),
        role_name: config.role_name.clone(),
    };
    Session::resolve(session_config, &identity)
        .await
        .context("Failed to resolve execution role")
}

fn provider(config: &AppConfig, region: &str, credentials: Credentials) -> Result<SageMaker> {
    let provider =
        SageMaker::new(credentials, region).context("Failed to create SageMaker provider")?;
    Ok(provider.with_poll_interval(Duration::from_secs(config.deployment.poll_interval_secs)))
}

fn endpoint_name(prefix: Option<&str>, config: &AppConfig) -> String {
    let base = prefix
        .or(config.deployment.name_prefix.as_deref())
        .unwrap_or(&config.image.repository);
    resource_name(base, Utc::now())
}

fn saved_endpoint(state_dir: &Path) -> Result<Endpoint> {
    let state = DeploymentState::load(state_dir)?;
    state.and_then(|s| s.endpoint).with_context(|| {
        format!(
            "No deployment found in {}. Run `tgi-endpoint deploy` or pass --endpoint.",
            state_dir.display()
        )
    })
}

async fn target_endpoint(
    provider: &SageMaker,
    name: Option<&str>,
    state_dir: &Path,
) -> Result<Endpoint> {
    let endpoint = match name {
        Some(name) => provider.get_endpoint(name).await?,
        None => saved_endpoint(state_dir)?,
    };
    if endpoint.status != EndpointStatus::InService {
        warn!(endpoint = %endpoint.name, status = %endpoint.status, "Endpoint may not be in service");
    }
    info!(endpoint = %endpoint.name, "Using endpoint");
    Ok(endpoint)
}

fn print_endpoint(endpoint: &Endpoint) {
    let status_emoji = match endpoint.status {
        EndpointStatus::InService => "🟢",
        EndpointStatus::Creating
        | EndpointStatus::Updating
        | EndpointStatus::SystemUpdating
        | EndpointStatus::RollingBack => "🟡",
        EndpointStatus::Failed | EndpointStatus::OutOfService => "🔴",
        _ => "⚪",
    };

    println!("\n🖥️  Endpoint: {}", endpoint.name);
    println!("   Status:   {status_emoji} {}", endpoint.status);
    println!("   Config:   {}", endpoint.config_name);
    println!("   Model:    {}", endpoint.model_name);
    if let Some(arn) = &endpoint.arn {
        println!("   ARN:      {arn}");
    }
    if let Some(created) = &endpoint.created_at {
        println!("   Created:  {}", created.format("%Y-%m-%d %H:%M:%S UTC"));
    }
}
