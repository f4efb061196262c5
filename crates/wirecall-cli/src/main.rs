//! Wirecall hub - serve the demo receiver or talk to a running server.

mod demo;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use wirecall::{Client, EndpointDescriptor, RpcConfig, Server};

use crate::demo::{DemoClient, DemoServer};

#[derive(Parser, Debug)]
#[command(name = "wirecall")]
#[command(about = "JSON-over-HTTP RPC hub")]
struct Args {
    /// Server host to connect to
    #[arg(long, default_value = RpcConfig::DEFAULT_HOST)]
    host: String,

    /// Server port (`run` listens on it on every interface)
    #[arg(short, long, default_value_t = RpcConfig::DEFAULT_PORT)]
    port: u16,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the demo server
    Run,
    /// List api from local info
    List,
    /// List api from remote
    Remote,
    /// Call server api by: name [arg] [arg]...
    Call {
        name: Option<String>,
        args: Vec<String>,
    },
    /// Show how long the server has been running
    Uptime,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.as_str())),
        )
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let client = Client::new(&format!("{}:{}", args.host, args.port))?;
    let _demo: DemoClient = client.reg()?;
    dispatch(&client, args.port, args.command).await
}

async fn run(port: u16) -> Result<()> {
    let server = Server::new()?;
    server.register(DemoServer)?;

    info!("Starting demo server on port {}", port);
    tokio::select! {
        served = server.run(RpcConfig::DEFAULT_BASE_PATH, port) => served?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received, exiting");
        }
    }
    Ok(())
}

async fn dispatch(client: &Client, port: u16, command: Command) -> Result<()> {
    match command {
        Command::Run => run(port).await?,
        Command::List => print_descriptors(&client.list()),
        Command::Remote => {
            let descriptors = client
                .remote_list()
                .await
                .context("Failed to list remote api")?;
            print_descriptors(&descriptors);
        }
        Command::Call { name: None, .. } => print_descriptors(&client.list()),
        Command::Call {
            name: Some(name),
            args,
        } => {
            let values = args.iter().map(|raw| parse_arg(raw)).collect();
            let result = client
                .call(&name, values)
                .await
                .with_context(|| format!("Call to {} failed", name))?;
            if let Some(rendered) = render_result(result)? {
                println!("{}", rendered);
            }
        }
        Command::Uptime => {
            let uptime = client.uptime().await.context("Failed to query uptime")?;
            println!(
                "started at {}, up {}s",
                uptime.started_at.to_rfc3339(),
                uptime.elapsed.as_secs()
            );
        }
    }
    Ok(())
}

fn print_descriptors(descriptors: &[EndpointDescriptor]) {
    for descriptor in descriptors {
        println!("  {}", descriptor);
    }
}

/// Command-line arguments are JSON when they parse as JSON, strings otherwise.
fn parse_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Pretty-print call outputs. A single output is printed unwrapped.
fn render_result(mut result: Vec<Value>) -> Result<Option<String>> {
    let value = match result.len() {
        0 => return Ok(None),
        1 => result.remove(0),
        _ => Value::Array(result),
    };
    Ok(Some(serde_json::to_string_pretty(&value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_arg() {
        assert_eq!(parse_arg("42"), json!(42));
        assert_eq!(parse_arg("[1,2]"), json!([1, 2]));
        assert_eq!(parse_arg("\"quoted\""), json!("quoted"));
        assert_eq!(parse_arg("hello"), json!("hello"));
        assert_eq!(parse_arg("true"), json!(true));
    }

    #[test]
    fn test_render_result() {
        assert_eq!(render_result(vec![]).unwrap(), None);
        assert_eq!(render_result(vec![json!(5)]).unwrap(), Some("5".to_string()));
        assert_eq!(
            render_result(vec![json!(true), json!(9)]).unwrap(),
            Some("[\n  true,\n  9\n]".to_string())
        );
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from(["wirecall", "-p", "9000", "call", "Add", "1", "2"]).unwrap();
        assert_eq!(args.port, 9000);
        assert_eq!(args.host, RpcConfig::DEFAULT_HOST);
        match args.command {
            Command::Call { name, args } => {
                assert_eq!(name.as_deref(), Some("Add"));
                assert_eq!(args, vec!["1".to_string(), "2".to_string()]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_call_command_against_demo_server() {
        let server = Server::new().unwrap();
        server.register(DemoServer).unwrap();
        let handle = server.bind("127.0.0.1", 0, "/").await.unwrap();

        let client = Client::new(&handle.authority()).unwrap();
        let _demo: DemoClient = client.reg().unwrap();

        let values = ["20", "22"].iter().map(|raw| parse_arg(raw)).collect();
        let result = client.call("Add", values).await.unwrap();
        assert_eq!(render_result(result).unwrap(), Some("42".to_string()));
    }
}
