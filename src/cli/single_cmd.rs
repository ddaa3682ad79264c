use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::cli::credentials::mask_api_key;
use crate::cli::output::OutputOptions;
use crate::cli::renderer;
use crate::core::client::{AnalysisClient, AnalysisResponse, OpenAiClient, ReasoningEffort};
use crate::core::cost::ledger::CostLedger;
use crate::core::models::record::TestCaseRecord;
use crate::core::parser::{parse_response, ParseOutcome};
use crate::core::prompt::format_test_case;

pub struct SingleArgs {
    pub file: PathBuf,
    pub output: Option<PathBuf>,
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub reasoning_effort: ReasoningEffort,
}

fn load_record(path: &Path) -> Result<TestCaseRecord> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("File not found {}", path.display()))?;
    TestCaseRecord::from_json(&content).context("Invalid JSON format")
}

/// Format one record and send it to the model. No cache, no limiter.
async fn analyze_single(
    client: &dyn AnalysisClient,
    record: &TestCaseRecord,
    effort: ReasoningEffort,
) -> Result<AnalysisResponse> {
    let prompt = format_test_case(record)?;
    info!(model = client.model(), "calling analysis endpoint");
    let response = client.analyze(&prompt, effort).await?;
    match parse_response(&response.text) {
        ParseOutcome::Structured(outcome) | ParseOutcome::Fallback(outcome) => {
            info!(issue = %outcome.issue_type, focal = %outcome.focal_method, "parsed analysis");
        }
        ParseOutcome::Failed => info!("response has no parseable <analysis> block"),
    }
    Ok(response)
}

pub async fn run(args: &SingleArgs, opts: &OutputOptions) -> Result<()> {
    let record = load_record(&args.file)?;

    if opts.verbose {
        println!("File loaded: {}", args.file.display());
        println!("Test case: {}", record.test_case_name);
        println!("Using model: {}", args.model);
        println!("API key: {}", mask_api_key(&args.api_key));
    }

    let client = OpenAiClient::new(&args.api_key, &args.model, &args.base_url)?;
    let response = analyze_single(&client, &record, args.reasoning_effort).await?;

    let ledger = CostLedger::new();
    ledger.record(response.usage, response.cost);
    let summary = ledger.summarize();

    if opts.show_cost {
        println!();
        println!(
            "{}",
            renderer::render_call_cost(&response.usage, &response.cost, summary.cache_savings, opts.use_color)
        );
    }

    match &args.output {
        Some(path) => {
            std::fs::write(path, &response.text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Analysis results saved to: {}", path.display());
        }
        None => {
            println!("\n=== AAA Pattern Analysis Results ===");
            println!("{}", response.text);
        }
    }

    if opts.show_cost {
        println!();
        println!("{}", renderer::render_cost_summary(&summary, opts.verbose, opts.use_color));
    }
    Ok(())
}
