//! Spindle main entry point
//!
//! This is the command-line interface for the Spindle audit core.

use clap::Parser;
use spindle::config::{load_config_with_hash, Config};
use spindle::Framework;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Spindle: crawl a web application and audit what it finds
///
/// Spindle maps a site within the configured scope, feeds every page it
/// finds through the registered audit modules and prints a report of the
/// results.
#[derive(Parser, Debug)]
#[command(name = "spindle")]
#[command(version)]
#[command(about = "Crawl and audit a web application", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be audited without sending requests
    #[arg(long, conflicts_with = "list_reports")]
    dry_run: bool,

    /// Report printed once the audit finishes
    #[arg(long, value_name = "NAME", default_value = "stdout")]
    report: String,

    /// List available reports and exit
    #[arg(long)]
    list_reports: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    let framework = Framework::new(config)?;
    framework.set_config_hash(config_hash);

    if cli.list_reports {
        handle_list_reports(&framework)?;
    } else {
        handle_audit(&framework, &cli.report).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("spindle=info,warn"),
            1 => EnvFilter::new("spindle=debug,info"),
            2 => EnvFilter::new("spindle=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Handles the --dry-run mode: shows the effective scope and exits
fn handle_dry_run(config: &Config) {
    println!("=== Spindle Dry Run ===\n");

    println!("Target: {}", config.url);

    println!("\nAudit:");
    println!("  Links: {}", config.audit.links);
    println!("  Forms: {}", config.audit.forms);
    println!("  Cookies: {}", config.audit.cookies);
    println!("  Headers: {}", config.audit.headers);

    let scope = &config.scope;
    println!("\nScope:");
    println!("  Crawl: {}", scope.crawl);
    println!("  Include subdomains: {}", scope.include_subdomains);
    if let Some(limit) = scope.link_count_limit {
        println!("  Link count limit: {}", limit);
    }
    match scope.redirect_hops() {
        Some(hops) => println!("  Redirect limit: {}", hops),
        None => println!("  Redirect limit: unlimited"),
    }
    if let Some(cap) = scope.auto_redundant {
        println!("  Auto-redundant cap: {}", cap);
    }
    for (pattern, cap) in &scope.redundant {
        println!("  Redundant: {} (max {})", pattern, cap);
    }
    for pattern in &scope.exclude {
        println!("  Exclude: {}", pattern);
    }
    for pattern in &scope.include {
        println!("  Include: {}", pattern);
    }

    if !scope.restrict_paths.is_empty() {
        println!("\nRestricted to {} paths:", scope.restrict_paths.len());
        for path in &scope.restrict_paths {
            println!("  - {}", path);
        }
    } else if !scope.extend_paths.is_empty() {
        println!("\nExtra seed paths ({}):", scope.extend_paths.len());
        for path in &scope.extend_paths {
            println!("  - {}", path);
        }
    }

    println!("\nHTTP:");
    println!("  Max concurrency: {}", config.http.max_concurrency);
    println!("  Timeout: {}ms", config.http.timeout_ms);
    println!("  Max retries: {}", config.http.max_retries);
    println!("  User agent: {}", config.http.user_agent);

    if let Some(login) = &config.login {
        println!("\nLogin: {} (checked at {})", login.url, login.check_url);
    }

    for entry in &config.reports {
        println!("\nReport: {} -> {}", entry.name, entry.outfile);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --list-reports mode
fn handle_list_reports(framework: &Framework) -> Result<(), Box<dyn std::error::Error>> {
    for report in framework.list_reports(None)? {
        let outfile = if report.supports_outfile { "" } else { " (no file output)" };
        println!("{:<10} {}{}", report.name, report.description, outfile);
    }
    Ok(())
}

/// Handles the main audit operation
async fn handle_audit(
    framework: &Framework,
    report: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    // Fail on an unknown report before spending time on the audit
    if framework
        .list_reports(None)?
        .iter()
        .all(|r| r.name != report)
    {
        return Err(spindle::SpindleError::UnknownReport(report.to_string()).into());
    }

    tracing::info!("Starting audit of {}", framework.config().url);

    match framework.run().await {
        Ok(store) => {
            let stats = framework.stats();
            tracing::info!(
                "Audit completed in {}: {} requests, {} pages audited, {} issues",
                stats.time,
                stats.requests,
                stats.auditmap_size,
                store.issues().len()
            );
            print!("{}", framework.render_report(report)?);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Audit failed: {}", e);
            Err(e.into())
        }
    }
}
