use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use jsonrpsee::server::Server;
use serde_json::Value;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use aijson_ml::config::Config;
use aijson_ml::host::{ActionStreamEvent, HostRpc};
use aijson_ml::{build_registry, ActionRegistry};

#[derive(Parser, Debug)]
#[command(name = "aijson-ml", version, about = "LLM actions for the aijson orchestration framework")]
struct Cli {
    /// Config file (defaults to $AIJSON_ML_CONFIG or the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered actions
    Actions,

    /// Print inputs and outputs JSON schemas
    Schema {
        /// Only this action
        action: Option<String>,
    },

    /// Invoke an action and print every stream item as a JSON line
    Run {
        /// Action name (`llm`) or id (`aijson-ml@0::llm`)
        action: String,

        /// Inputs as a JSON or TOML file
        #[arg(long)]
        inputs: PathBuf,

        /// Template variable, `KEY=VALUE`; values that parse as JSON are used as JSON
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, Value)>,
    },

    /// Serve the registry over JSON-RPC
    Serve {
        #[arg(long, default_value_t = 4455)]
        port: u16,

        #[arg(long, default_value = "127.0.0.1")]
        host: IpAddr,
    },
}

fn parse_var(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))?;
    if key.is_empty() {
        return Err(format!("empty variable name in `{s}`"));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn read_inputs(path: &Path) -> Result<Value> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read inputs from {}", path.display()))?;
    let is_toml = path.extension().is_some_and(|ext| ext == "toml");
    if is_toml {
        toml::from_str(&contents).with_context(|| format!("invalid TOML in {}", path.display()))
    } else {
        serde_json::from_str(&contents)
            .with_context(|| format!("invalid JSON in {}", path.display()))
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("aijson_ml=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    let registry = build_registry();

    match cli.command {
        Command::Actions => {
            for action in registry.list_actions() {
                println!("{}\t{}", action.id, action.description);
            }
        }
        Command::Schema { action } => {
            let schema = match action {
                Some(name) => match registry.schema(&name) {
                    Some(schema) => serde_json::to_value(schema)?,
                    None => bail!("unknown action `{name}`"),
                },
                None => serde_json::to_value(registry.full_schema())?,
            };
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
        Command::Run {
            action,
            inputs,
            vars,
        } => run(&registry, &config, &action, &inputs, vars).await?,
        Command::Serve { port, host } => serve(registry, &config, SocketAddr::new(host, port)).await?,
    }

    Ok(())
}

async fn run(
    registry: &ActionRegistry,
    config: &Config,
    action: &str,
    inputs: &Path,
    vars: Vec<(String, Value)>,
) -> Result<()> {
    let inputs = read_inputs(inputs)?;
    let ctx = vars
        .into_iter()
        .fold(config.action_context(), |ctx, (key, value)| ctx.with_variable(key, value));

    let mut stream = registry.invoke(action, inputs, ctx)?;
    let mut failed = false;
    while let Some(item) = stream.next().await {
        if matches!(item.event, ActionStreamEvent::Error { .. }) {
            failed = true;
        }
        println!("{}", serde_json::to_string(&item)?);
    }

    if failed {
        bail!("action `{action}` failed");
    }
    Ok(())
}

async fn serve(registry: ActionRegistry, config: &Config, addr: SocketAddr) -> Result<()> {
    let server = Server::builder()
        .build(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let module = HostRpc::new(Arc::new(registry), config.action_context()).into_rpc_module();
    let handle = server.start(module);
    info!(%addr, "JSON-RPC server listening");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    let _ = handle.stop();
    handle.stopped().await;
    Ok(())
}
