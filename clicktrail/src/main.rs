use clicktrail::{command_argument_builder, handle_audit, handle_crawl, init_tracing};
use clicktrail_core::print_banner;
use colored::Colorize;

#[tokio::main]
async fn main() {
    let chosen_command = command_argument_builder().get_matches();
    let quiet = chosen_command.get_flag("quiet");
    let verbose = chosen_command.get_flag("verbose");

    init_tracing(verbose, quiet);

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    let outcome = match chosen_command.subcommand() {
        None => handle_audit(None, quiet).await,
        Some(("audit", primary_command)) => handle_audit(Some(primary_command), quiet).await,
        Some(("crawl", primary_command)) => handle_crawl(primary_command, quiet).await,
        _ => unreachable!("clap should ensure we don't get here"),
    };

    // Recorded failures are report data; only a run that could not finish exits non-zero
    if let Err(e) = outcome {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}
