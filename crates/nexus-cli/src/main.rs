//! `nexus` – rover command-and-telemetry relay
//!
//! 1. Initialises tracing (`RUST_LOG`, `NEXUS_LOG_FORMAT`, optional OTLP).
//! 2. Loads `~/.nexus/config.toml` (or `$NEXUS_CONFIG`) plus env overrides.
//! 3. Spawns the arbitration engine and the WebSocket relay.
//! 4. Intercepts **Ctrl-C** so the engine sends a final `STOP` before exit.
//!
//! `nexus init` writes a default config file and exits.

mod config;

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use nexus_middleware::{ConnectionRegistry, FanOut};
use nexus_relay::RelayServer;
use nexus_types::RelayError;
use tracing::{error, warn};

/// Time allowed for the final `STOP` to reach connected sockets.
const SHUTDOWN_FLUSH: Duration = Duration::from_millis(200);

fn main() {
    let _tracing = nexus_runtime::init_tracing("nexus");

    print_banner();

    if std::env::args().nth(1).as_deref() == Some("init") {
        write_default_config();
        return;
    }

    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };
    println!(
        "  Listening on {}{}",
        format!("ws://0.0.0.0:{}", cfg.port).bold(),
        if cfg.shared_secret.is_some() { "  (token required)".dimmed() } else { "".dimmed() }
    );
    println!("  Press {} to stop the rover and exit.\n", "Ctrl-C".bold().cyan());

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start Tokio runtime");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(serve(cfg)) {
        error!(error = %e, "relay stopped");
        println!("{}: {}", "Relay error".red(), e);
        std::process::exit(1);
    }
}

async fn serve(cfg: config::Config) -> Result<(), RelayError> {
    let fanout = FanOut::new(Arc::new(ConnectionRegistry::new()));
    let (engine, engine_task) = nexus_runtime::spawn_engine(Box::new(fanout.clone()));

    let ctrlc_engine = engine.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the rover …".yellow().bold());
        if ctrlc_engine.shutdown().is_err() {
            println!("{}", "  Engine already stopped.".dimmed());
        }
    }) {
        warn!(
            error = %e,
            "Failed to install Ctrl-C handler; the final STOP will not be sent on Ctrl-C"
        );
    }

    let server = RelayServer::new(cfg.relay_settings(), fanout, engine);
    tokio::select! {
        result = server.run() => result,
        _ = engine_task => {
            tokio::time::sleep(SHUTDOWN_FLUSH).await;
            println!("{}", "  ✓ Final STOP sent. Exiting Nexus.".green());
            Ok(())
        }
    }
}

fn write_default_config() {
    let path = config::config_path();
    if path.exists() {
        println!("  Config already exists at {}", path.display().to_string().bold());
        return;
    }
    match config::save_to(&config::Config::default(), &path) {
        Ok(()) => println!(
            "  {} Config saved to {}",
            "✓".green().bold(),
            path.display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

fn print_banner() {
    println!();
    println!("{}", r#"    _   __                    "#.bold().cyan());
    println!("{}", r#"   / | / /__  _  ____  _______"#.bold().cyan());
    println!("{}", r#"  /  |/ / _ \| |/_/ / / / ___/"#.bold().cyan());
    println!("{}", r#" / /|  /  __/>  </ /_/ (__  ) "#.bold().cyan());
    println!("{}", r#"/_/ |_/\___/_/|_|\__,_/____/  "#.bold().cyan());
    println!();
    println!("  {} {}", "Nexus".bold(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Rover command & telemetry relay");
    println!();
}
