use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use crate::output::OutputFormat;
use crate::theme::Biome;

#[derive(Parser)]
#[command(name = "ecosure")]
#[command(
    version,
    about = "ecoSure - streamed environmental assessments from your terminal"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Relay base URL
    #[arg(
        long,
        global = true,
        env = "ECOSURE_SERVER_URL",
        default_value = "http://localhost:3001"
    )]
    pub server: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask one question and print the report
    Ask(AskArgs),

    /// Interactive conversation on a fresh thread
    Chat(ChatArgs),

    /// Print the messages of a thread, oldest first
    Messages { thread_id: String },

    /// Save a file the assistant referenced
    Download {
        file_id: String,

        /// Directory to write into
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Show or set the report theme
    Theme {
        #[arg(value_enum)]
        biome: Option<Biome>,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Default)]
pub struct AskArgs {
    /// Question to ask
    pub message: Option<String>,

    /// Attach a file (repeatable)
    #[arg(short, long = "file", value_name = "PATH")]
    pub files: Vec<PathBuf>,

    /// Continue this thread instead of the saved one
    #[arg(long)]
    pub thread: Option<String>,

    /// Start a new thread, ignoring the saved one
    #[arg(long, conflicts_with = "thread")]
    pub new: bool,

    /// Also write the report as markdown
    #[arg(long, value_name = "PATH")]
    pub save: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub struct ChatArgs {
    /// Files to attach to the first message
    #[arg(short, long = "file", value_name = "PATH")]
    pub files: Vec<PathBuf>,
}
