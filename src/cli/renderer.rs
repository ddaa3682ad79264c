use colored::{control, Colorize};

use crate::core::batch::BatchSummary;
use crate::core::models::cost::{CostInfo, CostSummary, TokenUsage};

/// Compact token count: `950`, `12.3K`, `4.1M`.
fn format_tokens(count: u64) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        format!("{}", count)
    }
}

/// Full count with thousands separators: `1,234,567`.
fn format_count(count: u64) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Render the ledger summary.
///
/// Detailed layout:
/// ```text
///  Cost Summary
///   API calls       12
///   Total tokens    18,400
///     Input         14,000
///     Cached        1,024
///     Output        3,376
///   Input cost      $0.015400
///   Cached cost     $0.000282
///   Output cost     $0.014854
///   Total cost      $0.030536
///   Cache savings   $0.000845
/// ```
pub fn render_cost_summary(summary: &CostSummary, detailed: bool, use_color: bool) -> String {
    control::set_override(use_color);

    if !detailed {
        let mut line = format!(
            " {} ${:.4} ({} API calls, {} tokens)",
            "Total cost".cyan(),
            summary.total_cost,
            summary.total_calls,
            format_tokens(summary.total_tokens)
        );
        if summary.cache_savings > 0.0 {
            line.push_str(&format!(" | saved ${:.4}", summary.cache_savings));
        }
        return line;
    }

    let input_tokens = summary.prompt_tokens.saturating_sub(summary.cached_tokens);
    let mut lines = vec![
        " Cost Summary".bold().to_string(),
        format!("  {}       {}", "API calls".cyan(), summary.total_calls),
        format!("  {}    {}", "Total tokens".cyan(), format_count(summary.total_tokens)),
        format!("    {}         {}", "Input".cyan(), format_count(input_tokens)),
        format!("    {}        {}", "Cached".cyan(), format_count(summary.cached_tokens)),
        format!("    {}        {}", "Output".cyan(), format_count(summary.completion_tokens)),
        format!("  {}      ${:.6}", "Input cost".cyan(), summary.input_cost),
        format!("  {}     ${:.6}", "Cached cost".cyan(), summary.cached_input_cost),
        format!("  {}     ${:.6}", "Output cost".cyan(), summary.output_cost),
        format!(
            "  {}      {}",
            "Total cost".cyan(),
            format!("${:.6}", summary.total_cost).bold()
        ),
    ];
    if summary.cache_savings > 0.0 {
        lines.push(format!(
            "  {}   {}",
            "Cache savings".cyan(),
            format!("${:.6}", summary.cache_savings).green()
        ));
    }
    lines.join("\n")
}

/// Usage and cost of one remote call.
pub fn render_call_cost(usage: &TokenUsage, cost: &CostInfo, savings: f64, use_color: bool) -> String {
    control::set_override(use_color);

    let mut lines = vec![
        " Cost Information".bold().to_string(),
        format!("  {}   {}", "Input tokens".cyan(), format_count(usage.input_tokens())),
    ];
    if usage.cached_tokens > 0 {
        lines.push(format!("  {}  {}", "Cached tokens".cyan(), format_count(usage.cached_tokens)));
    }
    lines.push(format!("  {}  {}", "Output tokens".cyan(), format_count(usage.completion_tokens)));
    lines.push(format!("  {}   {}", "Total tokens".cyan(), format_count(usage.total_tokens)));
    lines.push(format!("  {}     ${:.6}", "Total cost".cyan(), cost.total_cost));
    if usage.cached_tokens > 0 && savings > 0.0 {
        lines.push(format!("  {}  ${:.6}", "Cache savings".cyan(), savings));
    }
    lines.join("\n")
}

/// Final counts of a batch run.
pub fn render_batch_result(summary: &BatchSummary, use_color: bool) -> String {
    control::set_override(use_color);

    let status = if summary.success {
        "Batch processing completed successfully".green().bold()
    } else {
        "Batch processing completed with errors".red().bold()
    };
    let mut lines = vec![format!(" {}", status)];
    lines.push(format!("  {}       {}", "Project".cyan(), summary.project_name));
    lines.push(format!("  {}    {}", "Test cases".cyan(), summary.total_files));
    lines.push(format!(
        "  {}     {} ({} this run, {} earlier)",
        "Processed".cyan(),
        summary.previously_processed + summary.processed_this_run,
        summary.processed_this_run,
        summary.previously_processed
    ));
    let failed = summary.failed.to_string();
    lines.push(format!(
        "  {}        {}",
        "Failed".cyan(),
        if summary.failed > 0 { failed.as_str().red() } else { failed.as_str().normal() }
    ));
    lines.push(format!("  {}    {}", "Cache hits".cyan(), summary.cache_hits));
    lines.push(format!("  {}     {}", "API calls".cyan(), summary.api_calls));
    if let Some(path) = &summary.csv_path {
        lines.push(format!("  {}        {}", "Report".cyan(), path.display()));
    }
    lines.join("\n")
}
