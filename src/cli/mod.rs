//! CLI module for the convoy command-line interface.
//!
//! Provides subcommands for interacting with a running convoy server:
//! - `orders list` - List deployment orders
//! - `orders show <id>` - Show one order with per-application status
//! - `orders deploy <id>` - Start an order, or retry the batch it stopped at
//! - `orders cancel <id>` - Cancel an order
//! - `config check` - Validate configuration file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

use crate::api::DeployOrderResponse;
use crate::config::Config;
use crate::db::{DeploymentOrderResponse, OrderPage, OrderStatus};

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "convoy")]
#[command(author, version, about = "Dependency-ordered, multi-application rollout orchestrator", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "convoy.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// API URL to connect to (default: http://localhost:8080)
    #[arg(long, env = "CONVOY_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Authentication token (can also be set via CONVOY_TOKEN env var)
    #[arg(long, env = "CONVOY_TOKEN")]
    pub token: Option<String>,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deployment order commands
    #[command(subcommand)]
    Orders(OrdersCommands),

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Orders subcommands
#[derive(Subcommand, Debug)]
pub enum OrdersCommands {
    /// List deployment orders
    List {
        #[arg(long)]
        project_id: Option<i64>,
        #[arg(long)]
        workspace: Option<String>,
        /// wait_deploy, deploying, canceled, failed or ok
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value = "1")]
        page_no: i64,
        #[arg(long, default_value = "20")]
        page_size: i64,
    },
    /// Show details for an order
    Show { id: String },
    /// Start an order, or retry the batch it stopped at
    Deploy {
        id: String,
        #[arg(long)]
        operator: String,
    },
    /// Cancel an order
    Cancel {
        id: String,
        #[arg(long)]
        operator: String,
        /// Allow canceling an order that already finished successfully
        #[arg(long)]
        force: bool,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Check,
}

/// Error envelope returned by the API
#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: String,
    message: String,
}

// ============================================================================
// CLI Command Handlers
// ============================================================================

/// Create an HTTP client with the given token
fn create_client(token: Option<&str>) -> Result<Client> {
    let mut headers = reqwest::header::HeaderMap::new();
    if let Some(token) = token {
        headers.insert(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {}", token)
                .parse()
                .context("Invalid token format")?,
        );
    }

    Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to create HTTP client")
}

/// Run a CLI command
pub async fn run_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Some(Commands::Orders(OrdersCommands::List {
            project_id,
            workspace,
            status,
            page_no,
            page_size,
        })) => {
            let query = ListArgs {
                project_id: *project_id,
                workspace: workspace.clone(),
                status: status.as_deref().map(parse_status).transpose()?,
                page_no: *page_no,
                page_size: *page_size,
            };
            cmd_orders_list(cli, &query).await
        }
        Some(Commands::Orders(OrdersCommands::Show { id })) => cmd_orders_show(cli, id).await,
        Some(Commands::Orders(OrdersCommands::Deploy { id, operator })) => {
            cmd_orders_deploy(cli, id, operator).await
        }
        Some(Commands::Orders(OrdersCommands::Cancel {
            id,
            operator,
            force,
        })) => cmd_orders_cancel(cli, id, operator, *force).await,
        Some(Commands::Config(ConfigCommands::Check)) => cmd_config_check(cli),
        None => {
            // No subcommand means start the server - this is handled in main.rs
            Ok(())
        }
    }
}

struct ListArgs {
    project_id: Option<i64>,
    workspace: Option<String>,
    status: Option<OrderStatus>,
    page_no: i64,
    page_size: i64,
}

impl ListArgs {
    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("page_no", self.page_no.to_string()),
            ("page_size", self.page_size.to_string()),
        ];
        if let Some(project_id) = self.project_id {
            pairs.push(("project_id", project_id.to_string()));
        }
        if let Some(workspace) = &self.workspace {
            pairs.push(("workspace", workspace.clone()));
        }
        if let Some(status) = self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        pairs
    }
}

fn parse_status(s: &str) -> Result<OrderStatus> {
    serde_json::from_value(json!(s)).with_context(|| {
        format!(
            "Unknown status '{}' (expected wait_deploy, deploying, canceled, failed or ok)",
            s
        )
    })
}

/// Turn a non-success response into an error carrying the API message
async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        anyhow::bail!(
            "Authentication required. Use --token or set CONVOY_TOKEN environment variable."
        );
    }

    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiErrorEnvelope>(&body) {
        Ok(envelope) => anyhow::bail!(
            "Server returned {} ({}): {}",
            status,
            envelope.error.code,
            envelope.error.message
        ),
        Err(_) => anyhow::bail!("Server returned error {}: {}", status, body),
    }
}

/// List deployment orders
async fn cmd_orders_list(cli: &Cli, args: &ListArgs) -> Result<()> {
    let client = create_client(cli.token.as_deref())?;
    let url = format!("{}/api/deployment-orders", cli.api_url);

    let response = client
        .get(&url)
        .query(&args.query_pairs())
        .send()
        .await
        .context("Failed to connect to server. Is convoy running?")?;
    let page: OrderPage = check_response(response)
        .await?
        .json()
        .await
        .context("Failed to parse orders response")?;

    if page.list.is_empty() {
        println!("No deployment orders found.");
        return Ok(());
    }

    println!();
    println!(
        "{:<36}  {:<18}  {:<10}  {:<12}  {:<8}  {:<20}",
        "ID", "KIND", "WORKSPACE", "STATUS", "BATCH", "CREATED"
    );
    println!("{}", "-".repeat(114));

    for order in &page.list {
        println!(
            "{:<36}  {:<18}  {:<10}  {:<12}  {:<8}  {:<20}",
            order.id,
            order.kind.as_str(),
            truncate(&order.workspace, 10),
            order.status.as_str(),
            batch_progress(order),
            truncate(&order.created_at, 20)
        );
    }

    println!();
    println!(
        "Showing {} of {} order(s), page {}",
        page.list.len(),
        page.total,
        args.page_no
    );
    println!();
    Ok(())
}

/// Show details for a specific order
async fn cmd_orders_show(cli: &Cli, id: &str) -> Result<()> {
    let client = create_client(cli.token.as_deref())?;
    let url = format!("{}/api/deployment-orders/{}", cli.api_url, id);

    let response = client
        .get(&url)
        .send()
        .await
        .context("Failed to connect to server. Is convoy running?")?;
    let order: DeploymentOrderResponse = check_response(response)
        .await?
        .json()
        .await
        .context("Failed to parse order response")?;

    print_order(&order);
    Ok(())
}

/// Start an order or retry its current batch
async fn cmd_orders_deploy(cli: &Cli, id: &str, operator: &str) -> Result<()> {
    let client = create_client(cli.token.as_deref())?;
    let url = format!("{}/api/deployment-orders/{}/deploy", cli.api_url, id);

    println!("Deploying order: {}", id);

    let response = client
        .post(&url)
        .json(&json!({ "operator": operator }))
        .send()
        .await
        .context("Failed to trigger deployment")?;
    let result: DeployOrderResponse = check_response(response)
        .await?
        .json()
        .await
        .context("Failed to parse deploy response")?;

    println!();
    println!("[OK] Batch submitted");
    println!();
    for (app, created) in &result.deployments {
        println!(
            "  {:<30}  runtime {:<8}  deployment {}",
            truncate(app, 30),
            created.runtime_id,
            created.deployment_id
        );
    }
    println!();
    println!(
        "Use 'convoy orders show {}' to follow the rollout.",
        result.order_id
    );
    println!();
    Ok(())
}

/// Cancel an order
async fn cmd_orders_cancel(cli: &Cli, id: &str, operator: &str, force: bool) -> Result<()> {
    let client = create_client(cli.token.as_deref())?;
    let url = format!("{}/api/deployment-orders/{}/cancel", cli.api_url, id);

    let response = client
        .post(&url)
        .json(&json!({ "operator": operator, "force": force }))
        .send()
        .await
        .context("Failed to cancel order")?;
    let order: DeploymentOrderResponse = check_response(response)
        .await?
        .json()
        .await
        .context("Failed to parse cancel response")?;

    println!("[OK] Cancel requested, order is now {}", order.status);
    print_order(&order);
    Ok(())
}

/// Validate the configuration file
fn cmd_config_check(cli: &Cli) -> Result<()> {
    println!("Checking configuration: {}", cli.config.display());

    if !cli.config.exists() {
        println!("[!!] File not found, defaults would be used");
    }

    let config = Config::load(&cli.config)?;
    config.validate()?;

    println!();
    println!("[OK] Configuration is valid");
    println!();
    println!("Server:");
    println!("  Listen:       {}:{}", config.server.host, config.server.api_port);
    println!("  Data dir:     {}", config.server.data_dir.display());
    println!("Orchestrator:");
    println!(
        "  Poll:         every {}s (first after {}s)",
        config.orchestrator.poll_interval_secs, config.orchestrator.initial_delay_secs
    );
    println!("  Concurrency:  {}", config.orchestrator.reconcile_concurrency);
    println!("  Queue:        {} slots, {} push retries", config.orchestrator.queue_capacity, config.orchestrator.queue_push_retries);
    println!("Upstream:");
    println!("  URL:          {}", config.upstream.base_url);
    println!("  Timeout:      {}s", config.upstream.request_timeout_secs);
    println!();
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn print_order(order: &DeploymentOrderResponse) {
    println!();
    println!("=== Deployment Order: {} ===", order.id);
    println!();
    println!("Kind:        {}", order.kind);
    println!("Release:     {}", order.release_id);
    println!("Project:     {}", order.project_id);
    println!("Workspace:   {}", order.workspace);
    if let Some(app) = &order.application_name {
        println!("Application: {}", app);
    }
    println!("Status:      {}", order.status);
    println!("Batch:       {}", batch_progress(order));
    if !order.modes.is_empty() {
        println!("Modes:       {}", order.modes.join(", "));
    }
    println!("Operator:    {}", order.operator);
    if let Some(reason) = &order.failure_reason {
        println!("Failure:     {}", reason);
    }
    println!("Started:     {}", order.started_at.as_deref().unwrap_or("-"));
    println!("Updated:     {}", order.updated_at);

    if !order.deploy_list.is_empty() {
        println!();
        println!("Batches:");
        for (i, batch) in order.deploy_list.iter().enumerate() {
            let marker = if (i as i64 + 1) == order.current_batch {
                "->"
            } else {
                "  "
            };
            println!("  {} {}. {}", marker, i + 1, batch.join(", "));
        }
    }

    if !order.status_detail.is_empty() {
        println!();
        println!(
            "{:<30}  {:<10}  {:<12}  {:<12}",
            "APPLICATION", "RUNTIME", "DEPLOYMENT", "STATUS"
        );
        for (app, item) in &order.status_detail {
            println!(
                "{:<30}  {:<10}  {:<12}  {:<12}",
                truncate(app, 30),
                item.runtime_id,
                item.deployment_id,
                status_label(item.deployment_status.as_str())
            );
        }
    }
    println!();
}

/// "current/total" or "-" before the order has started
fn batch_progress(order: &DeploymentOrderResponse) -> String {
    if order.current_batch == 0 {
        "-".to_string()
    } else {
        format!("{}/{}", order.current_batch, order.batch_size)
    }
}

fn status_label(status: &str) -> &str {
    if status.is_empty() {
        "-"
    } else {
        status
    }
}

/// Truncate a string to max length with ellipsis
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
