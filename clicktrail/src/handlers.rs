use anyhow::{Context, Result};
use clap::ArgMatches;
use clicktrail_core::config::{ConfigError, expand_path, parse_viewports};
use clicktrail_core::report::{self, AuditReport, ReportOutcome};
use clicktrail_core::{AuditConfig, execute_crawl, launch_driver, preflight, run_audit};
use clicktrail_scanner::{BrowserDriver, OutcomeKind};
use colored::Colorize;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Install the fmt subscriber. `RUST_LOG` wins over the flags.
pub fn init_tracing(verbose: bool, quiet: bool) {
    let default = if verbose {
        "clicktrail=debug"
    } else if quiet {
        "clicktrail=warn"
    } else {
        "clicktrail=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Apply command-line overrides on top of an environment-derived config.
/// Flags absent from `args` leave the config untouched.
pub fn apply_overrides(mut config: AuditConfig, args: &ArgMatches) -> Result<AuditConfig, ConfigError> {
    let has = |id: &str| args.try_contains_id(id).unwrap_or(false);

    if has("url")
        && let Some(url) = args.get_one::<Url>("url")
    {
        config.base_url = url.to_string();
    }
    if has("max-depth")
        && let Some(depth) = args.get_one::<usize>("max-depth")
    {
        config.max_depth = *depth;
    }
    if has("max-pages")
        && let Some(pages) = args.get_one::<usize>("max-pages")
    {
        config.max_pages = *pages;
    }
    if has("driver")
        && let Some(driver) = args.get_one::<String>("driver")
    {
        config.driver = driver.parse().map_err(|reason| ConfigError::InvalidValue {
            key: "--driver",
            value: driver.clone(),
            reason,
        })?;
    }
    if has("headed") && args.get_flag("headed") {
        config.headless = false;
    }
    if has("chrome-path")
        && let Some(path) = args.get_one::<String>("chrome-path")
    {
        config.chrome_path = Some(expand_path(path).display().to_string());
    }
    if has("nav-timeout-ms")
        && let Some(ms) = args.get_one::<u64>("nav-timeout-ms")
    {
        config.nav_timeout = Duration::from_millis(*ms);
    }
    if has("out-dir")
        && let Some(dir) = args.get_one::<String>("out-dir")
    {
        config.out_dir = expand_path(dir);
    }
    if has("viewports")
        && let Some(list) = args.get_one::<String>("viewports")
    {
        config.viewports = parse_viewports(list)?;
    }
    if has("click-timeout-ms")
        && let Some(ms) = args.get_one::<u64>("click-timeout-ms")
    {
        config.click_timeout = Duration::from_millis(*ms);
    }
    if has("settle-timeout-ms")
        && let Some(ms) = args.get_one::<u64>("settle-timeout-ms")
    {
        config.settle_timeout = Duration::from_millis(*ms);
    }
    if has("max-elements")
        && let Some(max) = args.get_one::<usize>("max-elements")
    {
        config.max_elements_per_page = *max;
    }
    if has("no-screenshots") && args.get_flag("no-screenshots") {
        config.screenshots = false;
    }
    if has("parallel") && args.get_flag("parallel") {
        config.parallel_viewports = true;
    }

    config.validate()?;
    Ok(config)
}

fn load_config(args: Option<&ArgMatches>) -> Result<AuditConfig> {
    let config = AuditConfig::from_env().context("Invalid environment configuration")?;
    match args {
        Some(args) => apply_overrides(config, args).context("Invalid command-line options"),
        None => Ok(config),
    }
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

/// Settings block printed before a run starts.
pub fn format_settings(config: &AuditConfig) -> Vec<(&'static str, String)> {
    let viewports: Vec<String> = config.viewports.iter().map(|v| v.to_string()).collect();
    vec![
        ("Target", config.base_url.clone()),
        ("Driver", config.driver.to_string()),
        ("Viewports", viewports.join(", ")),
        (
            "Limits",
            format!(
                "depth {}, {} pages, {} elements/page",
                config.max_depth, config.max_pages, config.max_elements_per_page
            ),
        ),
        ("Output", config.out_dir.display().to_string()),
        (
            "Screenshots",
            if config.screenshots { "on" } else { "off" }.to_string(),
        ),
    ]
}

fn print_settings(config: &AuditConfig) {
    for (label, value) in format_settings(config) {
        println!("{} {:<12} {}", "→".blue(), format!("{}:", label), value.bright_white());
    }
    println!();
}

async fn close_driver(driver: &dyn BrowserDriver) {
    if let Err(e) = driver.close().await {
        warn!("Failed to close {} driver: {}", driver.name(), e);
    }
}

/// `clicktrail audit` (or no subcommand): full run plus report files.
pub async fn handle_audit(args: Option<&ArgMatches>, quiet: bool) -> Result<()> {
    let config = load_config(args)?;

    if !quiet {
        print_divider();
        println!("{}", "  CLICKTRAIL AUDIT".bright_white().bold());
        print_divider();
        println!();
        print_settings(&config);
    }

    let driver = launch_driver(&config)
        .await
        .with_context(|| format!("Could not start the {} driver", config.driver))?;

    let audit = run_audit(&config, driver.as_ref(), !quiet).await;
    close_driver(driver.as_ref()).await;
    let audit = audit.context("Audit aborted")?;

    let outcome = report::generate(&audit, &config.out_dir);
    print_audit_summary(&audit, &outcome, quiet);
    Ok(())
}

/// One line per outcome kind with a non-zero count.
pub fn outcome_lines(report: &AuditReport) -> Vec<String> {
    OutcomeKind::ALL
        .iter()
        .filter_map(|&kind| {
            let count = report.summary.count(kind);
            (count > 0).then(|| format!("{:<20} {}", kind.as_str(), count))
        })
        .collect()
}

fn print_audit_summary(report: &AuditReport, outcome: &ReportOutcome, quiet: bool) {
    let summary = &report.summary;

    if !quiet {
        println!();
        for line in outcome_lines(report) {
            if line.starts_with("OK_") {
                println!("  {} {}", "✓".green(), line);
            } else {
                println!("  {} {}", "✗".red(), line);
            }
        }
        println!();
    }

    println!(
        "{} {} interactions on {} pages: {} passed, {} failed ({:.1}% success)",
        "✓".green().bold(),
        summary.total_interactions,
        summary.reachable_pages,
        summary.successes.to_string().green(),
        summary.failures.to_string().red(),
        summary.success_rate()
    );
    if summary.broken_links > 0 {
        println!(
            "{} {} broken link(s)",
            "⚠".yellow().bold(),
            summary.broken_links
        );
    }
    if summary.fake_data_findings > 0 {
        println!(
            "{} {} placeholder content finding(s)",
            "⚠".yellow().bold(),
            summary.fake_data_findings
        );
    }

    for path in &outcome.written {
        println!("  {} {}", "•".blue(), path.display().to_string().bright_white());
    }
    for (name, reason) in &outcome.failed {
        eprintln!("{} Could not write {}: {}", "✗".red().bold(), name, reason);
    }
}

/// `clicktrail crawl`: discovery only, prints the sitemap and broken links.
pub async fn handle_crawl(args: &ArgMatches, quiet: bool) -> Result<()> {
    let config = load_config(Some(args))?;

    if !quiet {
        println!("\n🕷️  Crawling {}", config.base_url);
        println!("Max depth: {}", config.max_depth);
        println!("Max pages: {}\n", config.max_pages);
    }

    preflight(&config).await.context("Crawl aborted")?;

    let driver = launch_driver(&config)
        .await
        .with_context(|| format!("Could not start the {} driver", config.driver))?;
    let crawl = execute_crawl(&config, driver.as_ref(), !quiet).await;
    close_driver(driver.as_ref()).await;
    let ctx = crawl.context("Crawl aborted")?;

    println!();
    print!("{}", report::generate_sitemap(ctx.pages()));

    if !ctx.broken_links().is_empty() {
        println!("\n{}", "BROKEN LINKS".yellow().bold());
        print!("{}", report::generate_broken_links(ctx.broken_links()));
    }

    println!(
        "\n{} {} pages discovered ({} reachable)",
        "✓".green().bold(),
        ctx.pages().len(),
        ctx.reachable_pages().count()
    );
    Ok(())
}
