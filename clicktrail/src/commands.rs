use crate::CLAP_STYLING;
use clap::{Arg, ArgAction, arg, command};
use url::Url;

/// Flags shared by `audit` and `crawl`. Every flag overrides the matching
/// environment variable.
fn target_args() -> Vec<Arg> {
    vec![
        arg!(-u --"url" <URL>)
            .required(false)
            .help("Base URL of the site to audit (env: BASE_URL)")
            .value_parser(clap::value_parser!(Url)),
        arg!(-d --"max-depth" <DEPTH>)
            .required(false)
            .help("Maximum link depth from the base URL (env: MAX_DEPTH)")
            .value_parser(clap::value_parser!(usize)),
        arg!(-p --"max-pages" <PAGES>)
            .required(false)
            .help("Maximum number of pages to visit (env: MAX_PAGES)")
            .value_parser(clap::value_parser!(usize)),
        arg!(--"driver" <DRIVER>)
            .required(false)
            .help("Browser driver: chrome or http (env: DRIVER)")
            .value_parser(["chrome", "http"]),
        arg!(--"headed")
            .required(false)
            .help("Show the Chrome window instead of running headless (env: HEADLESS=false)")
            .action(ArgAction::SetTrue),
        arg!(--"chrome-path" <PATH>)
            .required(false)
            .help("Chrome executable to launch (env: CHROME_PATH)"),
        arg!(--"nav-timeout-ms" <MS>)
            .required(false)
            .help("Page navigation timeout in milliseconds (env: NAV_TIMEOUT_MS)")
            .value_parser(clap::value_parser!(u64)),
    ]
}

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("clicktrail")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("clicktrail")
        .about("Crawl a site, click every interactive element and report what broke")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .arg(
            arg!(-v --"verbose" "Enable debug logging")
                .required(false)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(
            command!("audit")
                .about(
                    "Crawl the site, exercise every interactive element in each viewport and \
                write the report set. Runs with environment defaults when no subcommand is given.",
                )
                .args(target_args())
                .arg(
                    arg!(-o --"out-dir" <PATH>)
                        .required(false)
                        .help("Directory for reports and screenshots (env: OUT_DIR)"),
                )
                .arg(
                    arg!(--"viewports" <LIST>)
                        .required(false)
                        .help(
                            "Comma-separated viewports: desktop, mobile or name:WIDTHxHEIGHT \
                        (env: VIEWPORTS)",
                        ),
                )
                .arg(
                    arg!(--"click-timeout-ms" <MS>)
                        .required(false)
                        .help("Click timeout in milliseconds (env: CLICK_TIMEOUT_MS)")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(--"settle-timeout-ms" <MS>)
                        .required(false)
                        .help("Post-click settle delay in milliseconds (env: SETTLE_TIMEOUT_MS)")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(--"max-elements" <COUNT>)
                        .required(false)
                        .help("Maximum elements tested per page (env: MAX_ELEMENTS)")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"no-screenshots")
                        .required(false)
                        .help("Skip before/after screenshots (env: SCREENSHOTS=false)")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"parallel")
                        .required(false)
                        .help("Test viewports concurrently (env: PARALLEL_VIEWPORTS)")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("crawl")
                .about("Discover reachable pages without clicking anything and print a sitemap")
                .args(target_args()),
        )
}
