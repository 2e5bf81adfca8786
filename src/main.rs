use clap::{Args, Parser, Subcommand};
use notes_mcp::Result;
use notes_mcp::commands::{add_note, interactive_search, list_namespaces, search_once, serve_mcp};
use notes_mcp::config::{Config, ConfigOverrides, config_hint, show_config};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "notes-mcp")]
#[command(about = "Personal notes search and capture over Pinecone, with an MCP server")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    pinecone: PineconeArgs,

    /// Defaults to `serve`
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Overrides for the Pinecone settings from the environment and config file
#[derive(Args, Default)]
struct PineconeArgs {
    /// Pinecone API key
    #[arg(long, global = true)]
    pinecone_api_key: Option<String>,
    /// Index host, e.g. notes-abc123.svc.us-east-1.pinecone.io
    #[arg(long, global = true)]
    pinecone_host: Option<String>,
    /// Index name
    #[arg(long, global = true)]
    pinecone_index: Option<String>,
    /// Namespace new notes are written to
    #[arg(long, global = true)]
    pinecone_namespace: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server on stdio
    Serve,
    /// Search notes; prompts interactively when no query is given
    Search {
        /// Search text
        query: Option<String>,
        /// Only search this namespace
        #[arg(long, short)]
        namespace: Option<String>,
    },
    /// Add a note
    Add {
        /// Note text
        text: String,
    },
    /// List namespaces in the index
    Namespaces,
    /// Show the effective configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

impl From<PineconeArgs> for ConfigOverrides {
    fn from(args: PineconeArgs) -> Self {
        Self {
            api_key: args.pinecone_api_key,
            host: args.pinecone_host,
            index: args.pinecone_index,
            namespace: args.pinecone_namespace,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout is the MCP transport, so logs always go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::resolve(&cli.pinecone.into())?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            serve_mcp(&config).await?;
        }
        Commands::Search { query, namespace } => match query {
            Some(query) => search_once(&config, &query, namespace).await?,
            None => interactive_search(&config, namespace).await?,
        },
        Commands::Add { text } => {
            add_note(&config, &text).await?;
        }
        Commands::Namespaces => {
            list_namespaces(&config).await?;
        }
        Commands::Config { show } => {
            if show {
                show_config(&config);
            } else {
                eprintln!("{}", config_hint(&config));
            }
        }
    }

    Ok(())
}
