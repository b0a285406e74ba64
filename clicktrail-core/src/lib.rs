pub mod audit;
pub mod config;
pub mod report;

use colored::Colorize;

pub use audit::{AuditError, execute_crawl, launch_driver, preflight, run_audit};
pub use config::{AuditConfig, ConfigError, DriverKind};
pub use report::{AuditReport, AuditSummary, ReportOutcome, generate};

const BANNER: &str = r#"
      _ _      _    _            _ _
  ___| (_) ___| | _| |_ _ __ __ _(_) |
 / __| | |/ __| |/ / __| '__/ _` | | |
| (__| | | (__|   <| |_| | | (_| | | |
 \___|_|_|\___|_|\_\\__|_|  \__,_|_|_|
"#;

pub fn print_banner() {
    println!("{}", BANNER.bright_cyan());
    println!(
        "  {} {}\n",
        "clicktrail".bold(),
        format!("v{} - click everything, report what broke", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
