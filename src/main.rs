mod cli;
mod core;
mod logging;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::core::batch::BatchOptions;
use crate::core::client::ReasoningEffort;
use crate::core::config::{AppConfig, API_KEY_ENV};

#[derive(Parser)]
#[command(
    name = "aaa-scanner",
    about = "Detect Arrange-Act-Assert pattern issues in unit tests with an LLM",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// OpenAI API key
    #[arg(long, global = true, env = API_KEY_ENV, hide_env_values = true)]
    api_key: Option<String>,

    /// Model to use (default: o4-mini)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Reasoning effort for reasoning models (low|medium|high)
    #[arg(long, global = true)]
    reasoning_effort: Option<ReasoningEffort>,

    /// Do not show cost information
    #[arg(long, global = true)]
    no_cost: bool,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a single test case JSON file
    Single {
        /// Test case JSON file
        json_file: PathBuf,

        /// Write the raw analysis to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Analyze every test case under <PROJECT_ROOT>/AAA
    Batch {
        /// Project directory containing an AAA folder
        project_root: PathBuf,

        /// Maximum number of concurrent workers
        #[arg(long)]
        max_workers: Option<usize>,

        /// Disable the result cache
        #[arg(long)]
        no_cache: bool,

        /// Cache directory
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Discard saved progress and start over
        #[arg(long)]
        restart: bool,

        /// Maximum API requests per minute (0 disables limiting)
        #[arg(long)]
        requests_per_minute: Option<u32>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate default config file
    Init,
    /// Validate config file
    Check,
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = AppConfig::load()?;
    let show_cost = !cli.no_cost && config.settings.show_cost;
    let use_color = cli::output::detect_color(!cli.no_color);

    // Cost display turns on the verbose banner for batch runs.
    let verbose = match &cli.command {
        Commands::Batch { .. } => cli.verbose || show_cost,
        _ => cli.verbose,
    };
    logging::init_logging(verbose, use_color);

    let output_opts = cli::output::OutputOptions {
        use_color,
        verbose,
        show_cost,
    };

    let model = cli.model.clone().unwrap_or_else(|| config.model());
    let reasoning_effort = cli
        .reasoning_effort
        .unwrap_or(config.settings.reasoning_effort);
    let base_url = config.settings.api_base_url.clone();

    match cli.command {
        Commands::Single { json_file, output } => {
            let api_key = cli::credentials::resolve_api_key(cli.api_key, &config)?;
            let args = cli::single_cmd::SingleArgs {
                file: json_file,
                output,
                api_key,
                model,
                base_url,
                reasoning_effort,
            };
            cli::single_cmd::run(&args, &output_opts).await?;
            Ok(true)
        }
        Commands::Batch {
            project_root,
            max_workers,
            no_cache,
            cache_dir,
            restart,
            requests_per_minute,
        } => {
            let api_key = cli::credentials::resolve_api_key(cli.api_key, &config)?;
            let settings = &config.settings;
            let args = cli::batch_cmd::BatchArgs {
                project_root,
                api_key,
                model,
                base_url,
                options: BatchOptions {
                    reasoning_effort,
                    max_workers: max_workers.unwrap_or(settings.max_workers).max(1),
                    use_cache: !no_cache && settings.use_cache,
                    cache_dir: cache_dir.unwrap_or_else(|| settings.cache_dir.clone()),
                    requests_per_minute: requests_per_minute.unwrap_or(settings.requests_per_minute),
                    restart,
                },
            };
            cli::batch_cmd::run(args, &output_opts).await
        }
        Commands::Config { action } => match action {
            ConfigAction::Init => cli::config_cmd::init().map(|()| true),
            ConfigAction::Check => cli::config_cmd::check(&output_opts),
        },
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if let Some(hint) = cli::credentials::auth_hint(&e) {
                eprintln!("{}", hint);
            }
            std::process::exit(1);
        }
    }
}
