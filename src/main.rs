//! Command-line entry point.
//!
//! Parses flags, resolves settings, and drives a one-shot session: open
//! a page, optionally run a script against it, print the markup or the
//! cookie jar, and download resources with the session's cookies.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use webpilot::{
    browser::Browser,
    config::{BrowserSettings, CliArgs},
    NAME, VERSION,
};

/// ANSI escapes used for terminal output.
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
}

fn print_banner() {
    println!(
        r#"
{cyan}{bold} __        __   _     ____  _ _       _
 \ \      / /__| |__ |  _ \(_) | ___ | |_
  \ \ /\ / / _ \ '_ \| |_) | | |/ _ \| __|
   \ V  V /  __/ |_) |  __/| | | (_) | |_
    \_/\_/ \___|_.__/|_|   |_|_|\___/ \__|
{reset}
{dim}  Programmatic Browsing over Headless Chromium{reset}
{dim}  Version: {version}{reset}
"#,
        cyan = colors::CYAN,
        bold = colors::BOLD,
        reset = colors::RESET,
        dim = colors::DIM,
        version = VERSION
    );
}

/// One aligned `label: value` line of the startup summary.
fn row(label: &str, value: impl std::fmt::Display) {
    println!(
        "  {dim}{label:<15}{reset}{value}",
        dim = colors::DIM,
        reset = colors::RESET
    );
}

fn tinted(text: &str, color: &str) -> String {
    format!("{color}{text}{reset}", reset = colors::RESET)
}

fn print_config_summary(settings: &BrowserSettings) {
    println!(
        "{bold}{blue}Configuration:{reset}",
        bold = colors::BOLD,
        blue = colors::BLUE,
        reset = colors::RESET
    );
    row(
        "Window size:",
        format!("{}x{}", settings.window_width, settings.window_height),
    );
    row(
        "Headless:",
        if settings.headless {
            tinted("yes", colors::GREEN)
        } else {
            tinted("no", colors::YELLOW)
        },
    );
    let engine = match &settings.remote_endpoint {
        Some(endpoint) => tinted(&format!("attached to {endpoint}"), colors::GREEN),
        None => "launched process".to_string(),
    };
    row("Engine:", engine);
    row("Timeout:", format!("{}ms", settings.default_timeout_ms));
    if let Some(proxy) = &settings.proxy {
        row("Proxy:", proxy.to_url());
    }
    if let Some(profile) = &settings.profile_path {
        row("Profile:", profile.display());
    }
    println!();
}

fn build_cli() -> Command {
    Command::new(NAME)
        .version(VERSION)
        .author("Webpilot Team")
        .about("Load pages in a real browser from the command line")
        .long_about(
            "Webpilot opens a page in a headless browser. Once the page is\n\
             ready it can evaluate JavaScript on it, print the rendered\n\
             markup, export the cookie jar in Netscape cookies.txt form,\n\
             and download resources that reuse the session's cookies.",
        )
        .args(action_args())
        .args(browser_args())
        .args(proxy_args())
        .args(general_args())
}

/// Positional URL plus the flags selecting what to do after the load.
fn action_args() -> Vec<Arg> {
    vec![
        Arg::new("url")
            .value_name("URL")
            .help("Address of the page to open")
            .required(true),
        Arg::new("script")
            .short('e')
            .long("script")
            .value_name("CODE")
            .help("JavaScript to run once the page is ready"),
        Arg::new("dump-html")
            .long("dump-html")
            .help("Write the rendered markup to stdout")
            .action(ArgAction::SetTrue),
        Arg::new("cookies")
            .long("cookies")
            .help("Write the cookie jar in cookies.txt form to stdout")
            .action(ArgAction::SetTrue),
        Arg::new("download")
            .short('d')
            .long("download")
            .value_name("URL")
            .help("Fetch this resource with the session cookies (may be relative)")
            .requires("output"),
        Arg::new("output")
            .short('o')
            .long("output")
            .value_name("FILE")
            .help("Destination file for --download")
            .value_parser(clap::value_parser!(PathBuf))
            .requires("download"),
    ]
}

/// Flags shaping the browser the session runs in.
fn browser_args() -> Vec<Arg> {
    vec![
        Arg::new("headless")
            .long("headless")
            .help("Hide the browser window (default)")
            .action(ArgAction::SetTrue),
        Arg::new("no-headless")
            .long("no-headless")
            .help("Show the browser window")
            .action(ArgAction::SetTrue)
            .conflicts_with("headless"),
        Arg::new("strict-certs")
            .long("strict-certs")
            .help("Refuse pages served with broken TLS certificates")
            .action(ArgAction::SetTrue),
        Arg::new("width")
            .long("width")
            .value_name("N")
            .help("Window width in pixels")
            .value_parser(clap::value_parser!(u32)),
        Arg::new("height")
            .long("height")
            .value_name("N")
            .help("Window height in pixels")
            .value_parser(clap::value_parser!(u32)),
        Arg::new("user-agent")
            .long("user-agent")
            .value_name("UA")
            .help("User agent to present"),
        Arg::new("executable")
            .long("executable")
            .value_name("BIN")
            .help("Browser binary to launch")
            .value_parser(clap::value_parser!(PathBuf)),
        Arg::new("remote-endpoint")
            .long("remote-endpoint")
            .value_name("URL")
            .help("DevTools address of a running browser to attach to"),
        Arg::new("profile")
            .long("profile")
            .value_name("DIR")
            .help("Directory holding the persistent browser profile")
            .value_parser(clap::value_parser!(PathBuf)),
        Arg::new("timeout")
            .long("timeout")
            .value_name("MILLIS")
            .help("Load and command timeout in milliseconds")
            .value_parser(clap::value_parser!(u64)),
    ]
}

fn proxy_args() -> Vec<Arg> {
    vec![
        Arg::new("proxy")
            .long("proxy")
            .value_name("ADDR")
            .help("Forward proxy as host or host:port"),
        Arg::new("proxy-type")
            .long("proxy-type")
            .value_name("PROTO")
            .help("Protocol spoken towards the proxy")
            .value_parser(["http", "https", "socks5"]),
        Arg::new("proxy-auth")
            .long("proxy-auth")
            .value_name("CREDS")
            .help("Proxy credentials as user:password"),
    ]
}

fn general_args() -> Vec<Arg> {
    vec![
        Arg::new("config")
            .short('c')
            .long("config")
            .value_name("FILE")
            .help("Settings file, TOML or JSON")
            .value_parser(clap::value_parser!(PathBuf)),
        Arg::new("verbose")
            .short('v')
            .long("verbose")
            .help("Raise log verbosity (repeatable)")
            .action(ArgAction::Count),
        Arg::new("quiet")
            .short('q')
            .long("quiet")
            .help("Only print errors")
            .action(ArgAction::SetTrue)
            .conflicts_with("verbose"),
    ]
}

fn parse_cli_args(matches: &clap::ArgMatches) -> CliArgs {
    let (proxy_host, proxy_port) = split_proxy_address(matches.get_one::<String>("proxy"));
    let (proxy_username, proxy_password) =
        split_credentials(matches.get_one::<String>("proxy-auth"));

    CliArgs {
        width: matches.get_one::<u32>("width").copied(),
        height: matches.get_one::<u32>("height").copied(),
        headless: headless_override(matches),
        user_agent: matches.get_one::<String>("user-agent").cloned(),
        ignore_certificate_errors: matches.get_flag("strict-certs").then_some(false),
        executable_path: matches.get_one::<PathBuf>("executable").cloned(),
        remote_endpoint: matches.get_one::<String>("remote-endpoint").cloned(),
        profile_path: matches.get_one::<PathBuf>("profile").cloned(),
        timeout_ms: matches.get_one::<u64>("timeout").copied(),
        proxy_host,
        proxy_port,
        proxy_type: matches.get_one::<String>("proxy-type").cloned(),
        proxy_username,
        proxy_password,
        config_file: matches.get_one::<PathBuf>("config").cloned(),
    }
}

/// `--headless` and `--no-headless` fold into one optional override.
fn headless_override(matches: &clap::ArgMatches) -> Option<bool> {
    if matches.get_flag("headless") {
        Some(true)
    } else if matches.get_flag("no-headless") {
        Some(false)
    } else {
        None
    }
}

/// Splits `host[:port]`. A suffix that is not a port number leaves the
/// whole value as the host.
fn split_proxy_address(value: Option<&String>) -> (Option<String>, Option<u16>) {
    let Some(address) = value else {
        return (None, None);
    };
    match address.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (Some(host.to_string()), Some(port)),
            Err(_) => (Some(address.clone()), None),
        },
        None => (Some(address.clone()), None),
    }
}

/// Splits `user[:password]` on the first colon.
fn split_credentials(value: Option<&String>) -> (Option<String>, Option<String>) {
    let Some(auth) = value else {
        return (None, None);
    };
    match auth.split_once(':') {
        Some((user, pass)) => (Some(user.to_string()), Some(pass.to_string())),
        None => (Some(auth.clone()), None),
    }
}

fn init_tracing(verbosity: u8, quiet: bool) {
    let level = match (quiet, verbosity) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::INFO,
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse().unwrap())
        .add_directive("tungstenite=info".parse().unwrap());

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

/// What the one-shot session should do after loading the page.
struct RunAction {
    url: String,
    script: Option<String>,
    dump_html: bool,
    show_cookies: bool,
    download: Option<String>,
    output: Option<PathBuf>,
}

impl RunAction {
    fn from_matches(matches: &clap::ArgMatches) -> Result<Self> {
        Ok(Self {
            url: matches
                .get_one::<String>("url")
                .cloned()
                .context("missing URL argument")?,
            script: matches.get_one::<String>("script").cloned(),
            dump_html: matches.get_flag("dump-html"),
            show_cookies: matches.get_flag("cookies"),
            download: matches.get_one::<String>("download").cloned(),
            output: matches.get_one::<PathBuf>("output").cloned(),
        })
    }
}

/// Run the one-shot session: load, act, close.
async fn run(settings: BrowserSettings, action: RunAction) -> Result<()> {
    info!("Initializing browser engine...");
    let browser = Browser::launch(settings.to_engine_config())
        .await
        .context("Failed to start the browser")?;

    let outcome = drive(&browser, &action).await;

    if let Err(e) = browser.close().await {
        warn!("Browser shutdown reported an error: {}", e);
    }
    outcome
}

async fn drive(browser: &Browser, action: &RunAction) -> Result<()> {
    let success = browser
        .load(&action.url)
        .await
        .with_context(|| format!("Failed to load {}", action.url))?;
    if !success {
        warn!("Page reported an unsuccessful load");
    }

    if let Some(ref script) = action.script {
        let value = browser
            .run_script(script)
            .await
            .context("Script evaluation failed")?;
        println!("{}", value);
    }

    if action.dump_html {
        println!("{}", browser.html().await?);
    }

    if action.show_cookies {
        println!("{}", browser.cookies_string().await?);
    }

    if let (Some(url), Some(path)) = (&action.download, &action.output) {
        let mut file = tokio::fs::File::create(path)
            .await
            .with_context(|| format!("Cannot create {}", path.display()))?;
        let bytes = browser
            .download_to(url, &mut file)
            .await
            .with_context(|| format!("Failed to download {}", url))?;
        println!(
            "{green}Downloaded:{reset} {} bytes to {}",
            bytes,
            path.display(),
            green = colors::GREEN,
            reset = colors::RESET
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    let quiet = matches.get_flag("quiet");
    init_tracing(matches.get_count("verbose"), quiet);

    let settings = parse_cli_args(&matches)
        .load_settings()
        .context("Could not resolve settings")?;

    if !quiet {
        print_banner();
        print_config_summary(&settings);
    }

    let action = RunAction::from_matches(&matches)?;

    // A hung load or script should not leave the terminal stuck.
    tokio::select! {
        result = run(settings, action) => {
            result?;
            if !quiet {
                println!(
                    "{green}Done.{reset}",
                    green = colors::GREEN,
                    reset = colors::RESET
                );
            }
        }
        _ = signal::ctrl_c() => {
            println!();
            info!("Interrupted, shutting down");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_accepts_url_and_flags() {
        let matches = build_cli()
            .try_get_matches_from(["webpilot", "https://example.org/", "--headless"])
            .unwrap();

        assert!(matches.get_flag("headless"));
        assert_eq!(
            matches.get_one::<String>("url").map(String::as_str),
            Some("https://example.org/")
        );
    }

    #[test]
    fn cli_requires_url() {
        assert!(build_cli().try_get_matches_from(["webpilot"]).is_err());
    }

    #[test]
    fn headless_flags_conflict() {
        let result = build_cli().try_get_matches_from([
            "webpilot",
            "https://example.org/",
            "--headless",
            "--no-headless",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn download_needs_output() {
        let bare = build_cli().try_get_matches_from([
            "webpilot",
            "https://example.org/",
            "--download",
            "report.pdf",
        ]);
        assert!(bare.is_err());

        let paired = build_cli().try_get_matches_from([
            "webpilot",
            "https://example.org/",
            "--download",
            "report.pdf",
            "--output",
            "/tmp/report.pdf",
        ]);
        assert!(paired.is_ok());
    }

    #[test]
    fn matches_map_to_cli_args() {
        let matches = build_cli()
            .try_get_matches_from([
                "webpilot",
                "https://example.org/",
                "--no-headless",
                "--width",
                "1600",
                "--height",
                "900",
                "--timeout",
                "7500",
                "--strict-certs",
            ])
            .unwrap();

        let args = parse_cli_args(&matches);
        assert_eq!(args.headless, Some(false));
        assert_eq!(args.width, Some(1600));
        assert_eq!(args.height, Some(900));
        assert_eq!(args.timeout_ms, Some(7500));
        assert_eq!(args.ignore_certificate_errors, Some(false));
    }

    #[test]
    fn proxy_address_splits_host_and_port() {
        let (host, port) = split_proxy_address(Some(&"gate.internal:3128".to_string()));
        assert_eq!(host.as_deref(), Some("gate.internal"));
        assert_eq!(port, Some(3128));

        let (host, port) = split_proxy_address(Some(&"gate.internal".to_string()));
        assert_eq!(host.as_deref(), Some("gate.internal"));
        assert_eq!(port, None);

        assert_eq!(split_proxy_address(None), (None, None));
    }

    #[test]
    fn credentials_split_on_first_colon() {
        let (user, pass) = split_credentials(Some(&"jdoe:s3cret:extra".to_string()));
        assert_eq!(user.as_deref(), Some("jdoe"));
        assert_eq!(pass.as_deref(), Some("s3cret:extra"));

        let (user, pass) = split_credentials(Some(&"jdoe".to_string()));
        assert_eq!(user.as_deref(), Some("jdoe"));
        assert_eq!(pass, None);
    }

    #[test]
    fn run_action_collects_page_work() {
        let matches = build_cli()
            .try_get_matches_from([
                "webpilot",
                "https://example.org/",
                "--script",
                "document.title",
                "--dump-html",
            ])
            .unwrap();

        let action = RunAction::from_matches(&matches).unwrap();
        assert_eq!(action.url, "https://example.org/");
        assert_eq!(action.script.as_deref(), Some("document.title"));
        assert!(action.dump_html);
        assert!(!action.show_cookies);
    }
}
