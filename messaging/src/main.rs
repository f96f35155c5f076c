//! Command line entry point: run the hub host, or poke a running host the
//! way a tool process would.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use nx_messaging::{
    EditorActions, LoggingEditorActions, MessagingHub, RunningTasksRegistry, constants,
    create_ide_client, handler_table, structured_logging,
};

#[derive(Parser)]
#[command(name = "nx-messaging")]
#[command(about = "Workspace messaging hub between an editor host and tool processes")]
struct Args {
    #[command(flatten)]
    options: Options,

    #[command(subcommand)]
    command: Command,
}

#[derive(Parser, Debug, Clone)]
struct Options {
    /// Enable development logging to the default log file
    #[arg(long, global = true)]
    dev_log: bool,
}

#[derive(Parser, Debug)]
struct WorkspaceArgs {
    /// Workspace root the socket path is derived from
    #[arg(long, default_value = ".")]
    workspace_root: PathBuf,
}

#[derive(Parser, Debug)]
enum Command {
    /// Run the editor-host side: listen and multiplex tool connections
    Host {
        #[command(flatten)]
        workspace: WorkspaceArgs,
    },

    /// Talk to a running host as a tool process would
    #[command(subcommand)]
    Client(ClientCommand),
}

#[derive(Parser, Debug)]
enum ClientCommand {
    /// Ask the editor to focus a project in its graph view
    FocusProject {
        #[command(flatten)]
        workspace: WorkspaceArgs,

        project_name: String,
    },

    /// Ask the editor to focus a single task
    FocusTask {
        #[command(flatten)]
        workspace: WorkspaceArgs,

        project_name: String,
        task_name: String,
    },

    /// Ask the editor to show the full project graph
    FullGraph {
        #[command(flatten)]
        workspace: WorkspaceArgs,
    },

    /// Ask the editor to open the generate UI for a generator
    Generate {
        #[command(flatten)]
        workspace: WorkspaceArgs,

        /// Generator in `collection:generator` form
        generator_name: String,

        /// Options to prefill, as a JSON object
        #[arg(long, default_value = "{}")]
        options: String,

        /// Directory the generator should run in
        #[arg(long)]
        cwd: Option<String>,
    },

    /// Print the host's merged view of currently running tasks
    Tasks {
        #[command(flatten)]
        workspace: WorkspaceArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = structured_logging::init(args.options.dev_log)?;

    match args.command {
        Command::Host { workspace } => run_host(workspace.workspace_root).await,
        Command::Client(command) => run_client(command).await,
    }
}

async fn run_host(workspace_root: PathBuf) -> Result<()> {
    let registry = Arc::new(RunningTasksRegistry::new());
    let actions: Arc<dyn EditorActions> = Arc::new(LoggingEditorActions);

    let mut hub = MessagingHub::new(handler_table(actions, registry));
    let socket_path = constants::resolve_socket_path(&workspace_root);
    hub.listen(&socket_path).await?;

    info!("host running for {}; ctrl-c to stop", workspace_root.display());
    tokio::signal::ctrl_c().await?;

    hub.dispose();
    Ok(())
}

async fn run_client(command: ClientCommand) -> Result<()> {
    match command {
        ClientCommand::FocusProject {
            workspace,
            project_name,
        } => {
            let client = create_ide_client(workspace.workspace_root).await?;
            client.focus_project(&project_name)?;
            client.disconnect();
        }
        ClientCommand::FocusTask {
            workspace,
            project_name,
            task_name,
        } => {
            let client = create_ide_client(workspace.workspace_root).await?;
            client.focus_task(&project_name, &task_name)?;
            client.disconnect();
        }
        ClientCommand::FullGraph { workspace } => {
            let client = create_ide_client(workspace.workspace_root).await?;
            client.show_full_project_graph()?;
            client.disconnect();
        }
        ClientCommand::Generate {
            workspace,
            generator_name,
            options,
            cwd,
        } => {
            let options: serde_json::Map<String, serde_json::Value> =
                serde_json::from_str(&options)?;
            let client = create_ide_client(workspace.workspace_root).await?;
            let log_file_name = client.open_generate_ui(&generator_name, options, cwd).await?;
            client.disconnect();
            println!("{log_file_name}");
        }
        ClientCommand::Tasks { workspace } => {
            let client = create_ide_client(workspace.workspace_root).await?;
            let tasks = client.get_running_tasks().await?;
            client.disconnect();
            println!("{}", serde_json::to_string_pretty(&tasks)?);
        }
    }
    Ok(())
}
