use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::credentials::mask_api_key;
use crate::cli::output::OutputOptions;
use crate::cli::renderer;
use crate::core::batch::{BatchOptions, BatchOrchestrator};
use crate::core::client::OpenAiClient;

pub struct BatchArgs {
    pub project_root: PathBuf,
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub options: BatchOptions,
}

fn print_banner(args: &BatchArgs, opts: &OutputOptions) {
    let options = &args.options;
    println!("Project root: {}", args.project_root.display());
    println!("Using model: {}", args.model);
    println!("Max workers: {}", options.max_workers);
    println!("Cache enabled: {}", options.use_cache);
    println!("Restart mode: {}", options.restart);
    if options.requests_per_minute == 0 {
        println!("Rate limit: disabled");
    } else {
        println!("Rate limit: {} req/min", options.requests_per_minute);
    }
    println!(
        "Cost tracking: {}",
        if opts.show_cost { "enabled" } else { "disabled" }
    );
    println!("API key: {}", mask_api_key(&args.api_key));
    println!();
}

/// Run a batch and print the outcome. Returns whether the run succeeded.
pub async fn run(args: BatchArgs, opts: &OutputOptions) -> Result<bool> {
    if opts.verbose {
        print_banner(&args, opts);
    }

    let client = OpenAiClient::new(&args.api_key, &args.model, &args.base_url)?;
    let orchestrator = BatchOrchestrator::new(Arc::new(client), args.options);
    let summary = orchestrator.run(&args.project_root).await?;

    println!("{}", renderer::render_batch_result(&summary, opts.use_color));
    if summary.success && opts.show_cost {
        println!();
        println!("{}", "=".repeat(50));
        println!("{}", renderer::render_cost_summary(&summary.cost, true, opts.use_color));
    }
    Ok(summary.success)
}
