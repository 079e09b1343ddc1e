use anyhow::{anyhow, Result};
use log::{debug, info};
use std::env;
use std::sync::Arc;
use vanguard_helper::notify::{ConsolePresenter, DefaultResources};
use vanguard_helper::{Config, OperationResult, VanguardServiceHelper};

fn print_help(program: &str) {
    println!("vanguard-helper - stop the Vanguard kernel driver");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("\nUsage: {} [OPTIONS] [COMMAND]\n", program);
    println!("Commands:");
    println!("  status [--json]     Show whether the driver is installed and running (default)");
    println!("  stop                Stop the driver, relaunching elevated if needed");
    println!(
        "  disable vanguard    Stop the driver from this process (used by the elevated relaunch)"
    );
    println!("\nOptions:");
    println!("  --help, -h          Show this help message");
    println!("  --version, -v       Show version information");
    println!("  --debug             Enable debug logging");
    println!("\nEnvironment Variables:");
    println!("  VANGUARD_HELPER_SERVICE=<name>         Driver service name (default: vgk)");
    println!("  VANGUARD_HELPER_POLL_INTERVAL_MS=<ms>  Status poll interval (default: 250)");
    println!("  VANGUARD_HELPER_TIMEOUT_SECS=<secs>    Stop timeout (default: 10)");
    println!("  VANGUARD_HELPER_LOG_LEVEL=<level>      Log level when RUST_LOG is unset");
    println!("  RUST_LOG=<level>                       Set log level (error|warn|info|debug)");
}

fn finish(action: &str, result: OperationResult) -> Result<()> {
    match result.into_result() {
        Ok(()) => {
            println!("{}: done", action);
            Ok(())
        }
        Err(e) => Err(anyhow!("{} failed: {}", action, e)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--version" || a == "-v") {
        println!("vanguard-helper {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help(args.first().map(String::as_str).unwrap_or("vanguard-helper"));
        return Ok(());
    }

    let debug_mode = args.iter().any(|a| a == "--debug");
    let json = args.iter().any(|a| a == "--json");
    let positional: Vec<&str> = args
        .iter()
        .skip(1)
        .map(String::as_str)
        .filter(|a| !a.starts_with("--"))
        .collect();

    let config = Config::load()?;

    let default_level = if debug_mode { "debug" } else { config.log_level.as_str() };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    debug!("Command line args: {:?}", args);
    debug!("Configuration: {:?}", config);

    let helper = VanguardServiceHelper::native(
        config,
        Arc::new(ConsolePresenter),
        Arc::new(DefaultResources),
    );

    match positional.as_slice() {
        [] | ["status"] => {
            let status = helper.status().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                match status.state {
                    Some(state) => println!(
                        "{}: {} (running: {})",
                        status.service, state, status.running
                    ),
                    None => println!("{}: not installed", status.service),
                }
                println!("elevated: {}", status.elevated);
            }
            Ok(())
        }
        ["disable", "vanguard"] => {
            info!("Running elevated stop of '{}'", helper.service_name());
            finish("disable vanguard", helper.try_stop_vanguard().await)
        }
        ["stop"] => {
            if !helper.is_vanguard_running().await {
                println!("{} is not running", helper.service_name());
                return Ok(());
            }
            if helper.controller().is_elevated() {
                finish("stop", helper.try_stop_vanguard().await)
            } else {
                info!("Not elevated, relaunching with administrator rights");
                finish("stop", helper.start_privileged_process().await)
            }
        }
        other => Err(anyhow!("Unknown command: {}. Use --help for usage.", other.join(" "))),
    }
}
