//! ContentFlow CLI - command-line interface for content-production workflows.
//!
//! Reuses the same orchestration (contentflow-core) that embedding hosts use,
//! backed by a local SQLite database.

use clap::{Parser, Subcommand};
use contentflow_cli::commands;

/// ContentFlow CLI - Content-production workflow orchestration
#[derive(Parser)]
#[command(
    name = "contentflow",
    version,
    about = "ContentFlow CLI - Content-production workflow orchestration"
)]
pub struct Cli {
    /// Path to the SQLite database file
    #[arg(long, env = "CONTENTFLOW_DB_PATH", default_value = "contentflow.db")]
    db: String,

    /// Path to the orchestrator YAML configuration
    #[arg(long, env = "CONTENTFLOW_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a workflow for a ready input
    Start {
        /// Input ID from the acquisition service
        #[arg(long)]
        input_id: String,
        /// Owning user ID
        #[arg(long)]
        user_id: String,
        /// Transcription text
        #[arg(long)]
        transcription: Option<String>,
        /// Read the transcription from a file
        #[arg(long, conflicts_with = "transcription")]
        file: Option<String>,
    },

    /// Handle an agent reply (response / error / status_update)
    Deliver {
        /// AgentMessage JSON
        #[arg(long)]
        body: Option<String>,
        /// Read the AgentMessage JSON from a file
        #[arg(long)]
        file: Option<String>,
        /// Put the body in the inbox instead of handling it now
        #[arg(long)]
        enqueue: bool,
    },

    /// Consume the inbox until interrupted
    Serve,

    /// Inspect workflows and submit reviews
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },

    /// Agent-side queue access
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Show or validate configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum WorkflowAction {
    /// Show a workflow with all its steps
    Show {
        /// Workflow ID
        #[arg(long)]
        id: String,
    },
    /// List workflows, newest first
    List {
        /// Filter by status (e.g. review_ready, failed)
        #[arg(long)]
        status: Option<String>,
    },
    /// Show the message log of a workflow
    Messages {
        /// Workflow ID
        #[arg(long)]
        id: String,
    },
    /// Approve or reject a workflow waiting for review
    Review {
        /// Workflow ID
        #[arg(long)]
        id: String,
        #[arg(long)]
        approve: bool,
        #[arg(long)]
        reject: bool,
        /// Reviewer notes
        #[arg(long)]
        notes: Option<String>,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Take requests off an agent queue
    Pull {
        /// Queue address (defaults to the agent type name)
        #[arg(long)]
        queue: String,
        #[arg(long, default_value_t = 1)]
        max: usize,
    },
    /// Put an agent reply in the orchestrator inbox
    Push {
        /// AgentMessage JSON
        #[arg(long)]
        body: Option<String>,
        /// Read the AgentMessage JSON from a file
        #[arg(long)]
        file: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as YAML
    Show,
    /// Validate a configuration file
    Validate {
        /// Config file (defaults to --config)
        file: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "contentflow_core=info,contentflow_cli=info".into()),
        )
        .init();

    let config = cli.config.as_deref();
    let result = if let Some(command) = cli.command {
        match command {
            Commands::Start {
                input_id,
                user_id,
                transcription,
                file,
            } => {
                let state = commands::init_state(&cli.db, config).await;
                commands::start::run(&state, &input_id, &user_id, transcription, file.as_deref())
                    .await
            }

            Commands::Deliver {
                body,
                file,
                enqueue,
            } => {
                let state = commands::init_state(&cli.db, config).await;
                commands::deliver::run(&state, body, file.as_deref(), enqueue).await
            }

            Commands::Serve => {
                let state = commands::init_state(&cli.db, config).await;
                commands::serve::run(&state).await
            }

            Commands::Workflow { action } => {
                let state = commands::init_state(&cli.db, config).await;
                match action {
                    WorkflowAction::Show { id } => commands::workflow::show(&state, &id).await,
                    WorkflowAction::List { status } => {
                        commands::workflow::list(&state, status.as_deref()).await
                    }
                    WorkflowAction::Messages { id } => {
                        commands::workflow::messages(&state, &id).await
                    }
                    WorkflowAction::Review {
                        id,
                        approve,
                        reject,
                        notes,
                    } => commands::workflow::run_review(&state, &id, approve, reject, notes).await,
                }
            }

            Commands::Queue { action } => {
                let state = commands::init_state(&cli.db, config).await;
                match action {
                    QueueAction::Pull { queue, max } => {
                        commands::queue::run_pull(&state, &queue, max).await
                    }
                    QueueAction::Push { body, file } => {
                        commands::queue::push(&state, body, file.as_deref()).await
                    }
                }
            }

            Commands::Config { action } => match action {
                ConfigAction::Show => commands::config::show(config),
                ConfigAction::Validate { file } => match file.as_deref().or(config) {
                    Some(path) => commands::config::validate(path),
                    None => Err("No config file given (pass a path or --config)".to_string()),
                },
            },
        }
    } else {
        // No subcommand - show help
        use clap::CommandFactory;
        Cli::command().print_help().ok();
        println!();
        Ok(())
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
