//! magscout daemon: sample motion sensors and stream them to the collector

use magscout::config::AgentConfig;
use magscout::error::{Error, Result};
use magscout::session::Session;
use magscout::{source, transport};
use std::env;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Parse config path from command line arguments.
///
/// Supports:
/// - `magscout <path>` (positional)
/// - `magscout --config <path>` (flag-based)
/// - `magscout -c <path>` (short flag)
///
/// Defaults to `magscout.toml` if not specified.
fn parse_config_path(args: &[String]) -> String {
    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    "magscout.toml".to_string()
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let config_path = parse_config_path(&args);
    let config = if Path::new(&config_path).exists() {
        AgentConfig::from_file(&config_path)?
    } else {
        AgentConfig::local_defaults()
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.clone()),
    )
    .init();

    log::info!("magscout starting (config: {})", config_path);
    log::info!(
        "Collector: {} (subject {})",
        config.server.endpoint(),
        config.session.subject_id
    );

    // `--check`: probe the collector once and exit
    if args.iter().any(|a| a == "--check") {
        let endpoint = config.server.endpoint();
        return match transport::pretest(&endpoint, config.transport.connect_timeout()) {
            Ok(()) => {
                log::info!("Collector {} is reachable", endpoint);
                Ok(())
            }
            Err(e) => {
                log::error!("Collector {} is not reachable: {}", endpoint, e);
                Err(e)
            }
        };
    }

    let source = source::create_source(&config)?;
    let mut session = Session::new(config, source);
    session.enter()?;

    // Shutdown on Ctrl-C
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    log::info!("Sampling. Press Ctrl-C to stop.");

    let mut last_stats = Instant::now();
    while running.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));

        if last_stats.elapsed().as_secs() >= 10 {
            if let (Some(state), Some(stats)) = (session.uplink_state(), session.uplink_stats()) {
                log::info!(
                    "Uplink {:?}: {}/{} bytes sent, {} attempts, {} transient failures",
                    state,
                    stats.bytes_sent,
                    session.recorded_bytes(),
                    stats.attempts,
                    stats.connect_failures
                        + stats.handshake_timeouts
                        + stats.handshake_mismatches
                        + stats.probe_failures
                        + stats.write_failures
                );
            }
            last_stats = Instant::now();
        }
    }

    log::info!("Leaving session...");
    session.leave();
    log::info!("magscout stopped");
    Ok(())
}
