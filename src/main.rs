// ABOUTME: Entry point for the todos binary.
// ABOUTME: Parses CLI arguments, initializes tracing, and runs one storage operation through the service.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use todos_core::{ListOptions, NewTodo, TodoPatch};
use todos_service::{TodoService, TodosConfig, open_store};

#[derive(Debug, Parser)]
#[command(name = "todos", version, about = "Manage todos in a JSON file or SQLite store")]
struct Cli {
    /// Storage backend (json or sqlite). Overrides TODOS_BACKEND.
    #[arg(long, global = true)]
    backend: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a todo
    Add {
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        done: bool,
    },
    /// List todos oldest first
    List {
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        offset: Option<usize>,
    },
    /// Show one todo
    Get { id: String },
    /// Change fields of a todo
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        done: Option<bool>,
    },
    /// Remove a todo
    Delete { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("todos=info,todos_store=info,todos_service=info")
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = TodosConfig::from_env().context("invalid configuration")?;
    if let Some(backend) = &cli.backend {
        config.backend = backend.parse().context("invalid --backend")?;
    }

    let service = todos_service::spawn(open_store(&config));
    service.init().await?;

    let result = run(&service, cli.command).await;
    let closed = service.close().await;

    result?;
    closed?;
    Ok(())
}

async fn run(service: &TodoService, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Add {
            title,
            description,
            done,
        } => {
            let todo = service
                .add_todo(NewTodo {
                    title,
                    description,
                    done: Some(done),
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&todo)?);
        }
        Command::List { limit, offset } => {
            let todos = service
                .get_all_todos(ListOptions { limit, offset })
                .await?;
            println!("{}", serde_json::to_string_pretty(&todos)?);
        }
        Command::Get { id } => match service.get_todo_by_id(&id).await? {
            Some(todo) => println!("{}", serde_json::to_string_pretty(&todo)?),
            None => bail!("todo {} not found", id),
        },
        Command::Update {
            id,
            title,
            description,
            done,
        } => {
            let patch = TodoPatch {
                title,
                description,
                done,
            };
            match service.update_todo(&id, patch).await? {
                Some(todo) => println!("{}", serde_json::to_string_pretty(&todo)?),
                None => bail!("todo {} not found", id),
            }
        }
        Command::Delete { id } => {
            if !service.delete_todo(&id).await? {
                bail!("todo {} not found", id);
            }
            tracing::info!(%id, "deleted");
        }
    }
    Ok(())
}
