//! Operator CLI for the portico batch engine

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use portico_batch::{
    strategy::typed_path_args, DomainError, HandlerInvocation, HandlerSet, Method, Resolution,
    ResourceFamily, ResourceHandler, RouteRegistry, RouterBuilder, SubRequest, SubResponse,
};

#[derive(Parser)]
#[command(name = "portico", version)]
#[command(about = "Inspect batch routing and submit batches", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which operation a method and relative URL resolve to
    Route {
        method: String,
        url: String,
    },
    /// Print the route catalog
    Routes,
    /// Build the route registry and report ambiguous routes
    Check,
    /// Submit a batch file to a running server
    Send {
        file: PathBuf,
        #[arg(short, long, default_value = "http://localhost:8080")]
        server: String,
        #[arg(short, long)]
        enclosing_transaction: bool,
    },
}

/// Stands in for every family so the whole catalog is routable.
struct Unbound;

#[async_trait]
impl ResourceHandler for Unbound {
    async fn handle(&self, invocation: HandlerInvocation) -> Result<String, DomainError> {
        Err(DomainError::internal(format!(
            "{} has no handler in the CLI",
            invocation.operation
        )))
    }
}

fn catalog_registry() -> portico_batch::Result<RouteRegistry> {
    let mut handlers = HandlerSet::new();
    let unbound: Arc<dyn ResourceHandler> = Arc::new(Unbound);
    for family in ResourceFamily::ALL {
        handlers.insert_family(family, unbound.clone());
    }
    RouterBuilder::catalog().handlers(handlers).build()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Route { method, url } => route(&method, &url),
        Commands::Routes => routes(),
        Commands::Check => check(),
        Commands::Send {
            file,
            server,
            enclosing_transaction,
        } => send(&file, &server, enclosing_transaction).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn route(method: &str, url: &str) -> anyhow::Result<ExitCode> {
    let method: Method = method
        .parse()
        .map_err(|_| anyhow!("unsupported method '{method}'"))?;
    let registry = catalog_registry()?;

    let Resolution::Matched(matched) = registry.resolve(method, url) else {
        println!("not implemented: {method} {url}");
        return Ok(ExitCode::FAILURE);
    };

    println!("route:     {}", matched.descriptor);
    println!("operation: {}", matched.descriptor.operation);
    println!("family:    {}", matched.descriptor.operation.family());
    match typed_path_args(&matched.params) {
        Ok(args) => {
            for (name, value) in args.iter() {
                println!("capture:   {name} = {value:?}");
            }
        }
        Err(e) => {
            println!("rejected:  {e}");
            return Ok(ExitCode::FAILURE);
        }
    }
    for (key, values) in matched.query.iter() {
        println!("query:     {key} = {}", values.join(","));
    }
    if let Some(command) = &matched.command {
        println!("command:   {command}");
    }
    Ok(ExitCode::SUCCESS)
}

fn routes() -> anyhow::Result<ExitCode> {
    for descriptor in portico_batch::catalog::routes() {
        println!("{descriptor}");
    }
    Ok(ExitCode::SUCCESS)
}

fn check() -> anyhow::Result<ExitCode> {
    match catalog_registry() {
        Ok(registry) => {
            println!("ok: {} routes, no ambiguity", registry.len());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn send(file: &PathBuf, server: &str, enclosing: bool) -> anyhow::Result<ExitCode> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let requests: Vec<SubRequest> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of requests", file.display()))?;

    let url = format!(
        "{}/api/v1/batches?enclosingTransaction={enclosing}",
        server.trim_end_matches('/')
    );
    let response = reqwest::Client::new()
        .post(&url)
        .json(&requests)
        .send()
        .await
        .with_context(|| format!("Failed to reach {url}"))?;

    let status = response.status();
    let outcome = response
        .headers()
        .get("x-transaction-outcome")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if !status.is_success() {
        eprintln!("Error: server returned status {status}");
        if let Ok(text) = response.text().await {
            eprintln!("Response: {text}");
        }
        return Ok(ExitCode::FAILURE);
    }

    let responses: Vec<SubResponse> = response
        .json()
        .await
        .context("Failed to decode Sub-Responses")?;
    println!("{}", serde_json::to_string_pretty(&responses)?);
    if let Some(outcome) = outcome {
        println!("transaction: {outcome}");
    }

    let all_ok = responses.iter().all(SubResponse::is_success);
    Ok(if all_ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_catalog_is_routable() {
        let registry = catalog_registry().unwrap();
        assert_eq!(registry.len(), portico_batch::catalog::routes().len());
    }

    #[test]
    fn cli_parses_send_flags() {
        let cli = Cli::try_parse_from([
            "portico",
            "send",
            "batch.json",
            "--server",
            "http://127.0.0.1:9000",
            "--enclosing-transaction",
        ])
        .unwrap();
        match cli.command {
            Commands::Send {
                server,
                enclosing_transaction,
                ..
            } => {
                assert_eq!(server, "http://127.0.0.1:9000");
                assert!(enclosing_transaction);
            }
            _ => panic!("expected send"),
        }
    }
}
