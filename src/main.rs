use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::Value;
use std::path::PathBuf;

use nodeflow_rs::adapters::Adapters;
use nodeflow_rs::flow::{run_graph, Engine, FlowLoader, TriggerSource};
use nodeflow_rs::Settings;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a flow file once and print the final node data
    Run {
        /// Path to the flow file (.json, .yaml or .yml)
        #[arg(short, long)]
        file: PathBuf,

        /// Initial payload as JSON
        #[arg(short, long)]
        payload: Option<String>,

        /// Start from the webhook trigger with this name
        #[arg(short, long)]
        webhook: Option<String>,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List models available on a local model server
    Models {
        #[arg(short, long)]
        base_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;

    match args.command {
        Commands::Run {
            file,
            payload,
            webhook,
        } => {
            let flow = FlowLoader::load(&file)?;
            let payload: Value = match payload {
                Some(raw) => serde_json::from_str(&raw)?,
                None => Value::Null,
            };
            let trigger = match webhook {
                Some(name) => TriggerSource::webhook(name),
                None => TriggerSource::Manual,
            };

            let engine = Engine::from_settings(&settings)?;
            if let Some(name) = &flow.name {
                println!("Running flow: {}", name);
            }
            let (report, graph) = run_graph(&engine, flow.into_graph(), &trigger, payload).await?;

            for node in &graph.nodes {
                println!("{} ({}): {}", node.id, node.node_type, Value::Object(node.data.clone()));
            }
            if report.truncated {
                println!("Run stopped early after {} activations", report.visited.len());
            }
        }
        Commands::Serve { port } => {
            // Request spans from TraceLayer; `log` output stays with env_logger
            if let Err(e) =
                tracing::subscriber::set_global_default(tracing_subscriber::fmt().finish())
            {
                log::warn!("Tracing subscriber not installed: {}", e);
            }
            if let Some(port) = port {
                settings.server.port = port;
            }
            nodeflow_rs::server::serve(settings).await?;
        }
        Commands::Models { base_url } => {
            let adapters = Adapters::from_settings(&settings)?;
            let base_url = base_url.unwrap_or_else(|| settings.ollama.base_url.clone());
            for model in adapters.local_model.list_models(&base_url).await? {
                println!("{}", model);
            }
        }
    }

    Ok(())
}
