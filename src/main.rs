mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use poe2_trends::config::Settings;
use poe2_trends::logging;

#[derive(Parser, Debug)]
#[command(author, version, about = "Path of Exile 2 crafting price trends", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage the stored POESESSID
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Currency rates used to price results
    #[command(subcommand)]
    Rates(RatesCommand),
    /// List the item base catalog
    Items {
        /// Only show bases or categories containing this text
        #[arg(long)]
        filter: Option<String>,
    },
    /// Run a server-side gap analysis job and follow its progress
    Job {
        /// Item base names
        bases: Vec<String>,
        /// Add every base in this catalog category
        #[arg(long = "category")]
        categories: Vec<String>,
        /// Add every base in this custom category (name or id)
        #[arg(long = "group")]
        groups: Vec<String>,
        /// Start from every base whose name or category contains this text
        #[arg(long)]
        matching: Option<String>,
    },
    /// Analyse bases one at a time, waiting out rate limits
    Batch {
        bases: Vec<String>,
        /// Read base names from a file, one per line
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Gap analysis for a single base
    Analyze { base: String },
    /// Price distribution and value influencers for a single base
    Distribution { base: String },
    /// Modifier exclusion rules
    #[command(subcommand)]
    Exclusions(ExclusionsCommand),
    /// Custom item categories
    #[command(subcommand)]
    Categories(CategoriesCommand),
    /// Stored analysis history
    #[command(subcommand)]
    Analyses(AnalysesCommand),
    /// Locally saved batch results
    #[command(subcommand)]
    Results(ResultsCommand),
    /// Modifier frequencies on listings matching a trade query
    Stats {
        /// File holding the trade query JSON ("-" reads stdin)
        query: PathBuf,
        #[command(flatten)]
        view: StatsView,
    },
    /// Saved modifier-stats runs
    #[command(subcommand)]
    History(HistoryCommand),
    /// Save the last modifier-stats run under a name
    Save { name: String },
}

#[derive(clap::Args, Debug)]
struct StatsView {
    /// Item category to show (defaults to Bow, else the first)
    #[arg(long)]
    category: Option<String>,
    /// Only list modifiers whose name contains this text
    #[arg(long, default_value = "")]
    filter: String,
}

#[derive(Subcommand, Debug)]
enum HistoryCommand {
    List,
    /// Load a saved run by file name
    Show {
        filename: String,
        #[command(flatten)]
        view: StatsView,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// Save the POESESSID (an empty value clears it)
    Set { session_id: String },
    Clear,
    Show,
}

#[derive(Subcommand, Debug)]
enum RatesCommand {
    Show,
    /// Fetch current rates from the backend
    Refresh,
    /// Convert an amount to Exalted Orbs
    Convert { amount: f64, currency: String },
}

#[derive(Subcommand, Debug)]
enum ExclusionsCommand {
    List,
    Add(ExclusionArgs),
    Update {
        id: String,
        #[command(flatten)]
        rule: ExclusionArgs,
    },
    Remove { id: String },
}

#[derive(clap::Args, Debug)]
struct ExclusionArgs {
    /// Modifier name pattern
    #[arg(long)]
    pattern: Option<String>,
    /// Modifier tier, e.g. P1
    #[arg(long)]
    tier: Option<String>,
    /// Modifier type, e.g. prefix
    #[arg(long = "type")]
    mod_type: Option<String>,
    #[arg(long)]
    reason: Option<String>,
}

#[derive(Subcommand, Debug)]
enum CategoriesCommand {
    List,
    Add { name: String, items: Vec<String> },
    Remove { id: String },
}

#[derive(Subcommand, Debug)]
enum AnalysesCommand {
    /// Latest analysis per base
    Latest {
        #[arg(long)]
        base: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: u32,
        /// Only show bases in this catalog category
        #[arg(long = "category")]
        categories: Vec<String>,
        /// Only show bases in this custom category (name or id)
        #[arg(long = "group")]
        groups: Vec<String>,
    },
    List {
        #[arg(long)]
        base: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    Show { id: String },
}

#[derive(Subcommand, Debug)]
enum ResultsCommand {
    Show,
    Clear,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match commands::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if !e.is_precondition() {
                tracing::debug!("Command failed: {:?}", e);
            }
            eprintln!("Error: {}", e.user_message());
            ExitCode::from(e.exit_status())
        }
    }
}
