//! # R-Type Server
//!
//! Hosts lobbies, custom rooms and game sessions.
//!
//! ## Usage
//!
//! ```bash
//! rtype_server --config server.toml --tcp-port 4242 --udp-port 4243 --tick-rate 64
//! ```

use std::process::ExitCode;
use std::time::Duration;

use rtype_server::{GameServer, ServerConfig};

fn main() -> ExitCode {
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         R-TYPE MULTIPLAYER SERVER                                ║");
    println!("║         LOBBIES · ROOMS · SESSIONS                               ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    // Hand-rolled argument loop
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<String> = None;
    let mut tcp_port: Option<u16> = None;
    let mut udp_port: Option<u16> = None;
    let mut tick_rate: Option<u32> = None;
    let mut duration_secs: Option<u64> = None;
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--tcp-port" | "-p" => {
                if i + 1 < args.len() {
                    tcp_port = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            "--udp-port" | "-u" => {
                if i + 1 < args.len() {
                    udp_port = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            "--tick-rate" | "-t" => {
                if i + 1 < args.len() {
                    tick_rate = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            "--duration" | "-d" => {
                if i + 1 < args.len() {
                    duration_secs = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            "--verbose" | "-v" => verbose = true,
            "--help" | "-h" => {
                println!("Usage: rtype_server [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>        TOML configuration file");
                println!("  -p, --tcp-port <PORT>      Reliable channel port (default: 4242)");
                println!("  -u, --udp-port <PORT>      Unreliable channel port (default: 4243)");
                println!("  -t, --tick-rate <RATE>     Server tick rate in Hz (default: 64)");
                println!("  -d, --duration <SECS>      Run for N seconds then exit");
                println!("  -v, --verbose              Log dropped packets and state changes");
                println!("  -h, --help                 Show this help");
                return ExitCode::SUCCESS;
            }
            other => eprintln!("Ignoring unknown argument '{other}'"),
        }
        i += 1;
    }

    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).with_target(false).init();

    let mut config = match config_path {
        Some(path) => match ServerConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Cannot load {}: {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => ServerConfig::default(),
    };
    if let Some(port) = tcp_port {
        config.tcp_port = port;
    }
    if let Some(port) = udp_port {
        config.udp_port = port;
    }
    if let Some(rate) = tick_rate {
        config.tick_rate = rate;
        config.snapshot_rate = config.snapshot_rate.min(rate);
    }
    if let Err(e) = config.validate() {
        tracing::error!("{}", e);
        return ExitCode::FAILURE;
    }

    println!("┌─ CONFIGURATION ─────────────────────────────────────────────────┐");
    println!("│ Reliable (TCP):     {}", config.tcp_address());
    println!("│ Unreliable (UDP):   {}", config.udp_address());
    println!("│ Tick Rate:          {} Hz", config.tick_rate);
    println!("│ Snapshot Rate:      {} Hz", config.snapshot_rate);
    println!("│ Max Clients:        {}", config.max_clients);
    println!("│ Compression:        {}", if config.compression.enabled { "lz4" } else { "off" });
    println!("│ Admin:              {}", if config.admin_password_hash.is_some() { "enabled" } else { "disabled" });
    if let Some(d) = duration_secs {
        println!("│ Duration:           {d} seconds");
    } else {
        println!("│ Duration:           infinite");
    }
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    let mut server = match GameServer::bind(config) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Startup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Starting server...");
    println!();

    server.run(duration_secs.map(Duration::from_secs));
    ExitCode::SUCCESS
}
