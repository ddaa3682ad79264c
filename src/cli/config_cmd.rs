use anyhow::Result;

use crate::cli::output::OutputOptions;
use crate::core::config::AppConfig;

/// Write a default config file unless one exists.
pub fn init() -> Result<()> {
    let path = AppConfig::config_path();
    if path.exists() {
        eprintln!("Config file already exists at {}", path.display());
        eprintln!("Remove it first if you want to regenerate.");
        return Ok(());
    }

    let path = AppConfig::default().save()?;
    println!("Generated config at {}", path.display());
    println!("  Set OPENAI_API_KEY or add api_key to the file before running a scan.");
    Ok(())
}

/// Validate the config file. Returns false when issues were found.
pub fn check(opts: &OutputOptions) -> Result<bool> {
    let path = AppConfig::config_path();
    if !path.exists() {
        eprintln!("No config file found at {}", path.display());
        eprintln!("Run `aaa-scanner config init` to create one.");
        return Ok(true);
    }

    let config = AppConfig::load()?;
    let issues = config.validate();
    if !issues.is_empty() {
        eprintln!("Config issues found in {}:", path.display());
        for issue in &issues {
            eprintln!("  - {}", issue);
        }
        return Ok(false);
    }

    println!("Config is valid: {}", path.display());
    if opts.verbose {
        let s = &config.settings;
        println!("  model               {}", s.model);
        println!("  reasoning_effort    {}", s.reasoning_effort);
        println!("  max_workers         {}", s.max_workers);
        println!("  requests_per_minute {}", s.requests_per_minute);
        println!("  use_cache           {}", s.use_cache);
        println!("  cache_dir           {}", s.cache_dir.display());
        println!("  api_base_url        {}", s.api_base_url);
        println!("  show_cost           {}", s.show_cost);
        println!(
            "  api_key             {}",
            if config.file_api_key().is_some() { "set" } else { "not set" }
        );
    }
    Ok(true)
}
