use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod prompt;
mod session;

use alfred::config::Settings;
use alfred::guests::DEFAULT_DATASET;

#[derive(Parser)]
#[command(author, version, about = "Alfred, the party planning butler", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./alfred.toml, or ALFRED_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Chat model to use, overriding the configured one
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Maximum agent steps per turn
    #[arg(long, global = true)]
    max_steps: Option<u64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start or resume an interactive chat session
    #[command(about = "Start or resume an interactive chat session")]
    Session {
        /// Name of the session, a random one is picked when omitted
        #[arg(short, long)]
        name: Option<String>,

        /// Resume the named session, or the most recent one
        #[arg(short, long, action = clap::ArgAction::SetTrue)]
        resume: bool,
    },

    /// Ask a single question and print the answer
    #[command(about = "Ask Alfred a single question")]
    Run {
        /// The question to ask
        text: String,

        /// Record the conversation under this session name
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Run the evaluation queries and report how the agent did
    #[command(about = "Run evaluation queries against the agent")]
    Eval {
        /// Query to evaluate, may be repeated; the built-in set is used otherwise
        #[arg(short, long = "query")]
        queries: Vec<String>,

        /// Print the report as JSON
        #[arg(long, action = clap::ArgAction::SetTrue)]
        json: bool,

        /// Also write the JSON report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage the guest list
    #[command(subcommand)]
    Guests(GuestsCommand),
}

#[derive(Subcommand)]
enum GuestsCommand {
    /// Fetch a guest dataset from the Hugging Face Hub
    Download {
        /// Dataset repository id
        #[arg(short, long, default_value = DEFAULT_DATASET)]
        dataset: String,

        /// Where to write the guest list
        #[arg(short, long, default_value = "invitees.json")]
        output: PathBuf,
    },

    /// Print the guests Alfred knows about
    List,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Layered settings with the command line applied last
fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut builder = Settings::builder()?;
    if let Some(path) = &cli.config {
        builder = builder.add_source(config::File::from(path.as_path()).required(true));
    }
    if let Some(model) = &cli.model {
        builder = builder.set_override("provider.model", model.as_str())?;
    }
    if let Some(max_steps) = cli.max_steps {
        builder = builder.set_override("agent.max_steps", max_steps)?;
    }
    Ok(Settings::from_config(builder.build()?)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    match cli.command {
        Some(Command::Session { name, resume }) => {
            let mut session = commands::session::build_session(&settings, name, resume).await?;
            session.start().await
        }
        Some(Command::Run { text, name }) => commands::run::execute(&settings, text, name).await,
        Some(Command::Eval {
            queries,
            json,
            output,
        }) => commands::eval::execute(&settings, queries, json, output).await,
        Some(Command::Guests(GuestsCommand::Download { dataset, output })) => {
            commands::guests::download(&dataset, &output).await
        }
        Some(Command::Guests(GuestsCommand::List)) => commands::guests::list(&settings),
        None => {
            let mut session = commands::session::build_session(&settings, None, false).await?;
            session.start().await
        }
    }
}
