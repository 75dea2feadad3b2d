//! Config validation CLI tool
//!
//! Validates a vigild configuration file and reports any errors.

use std::path::PathBuf;
use std::process::ExitCode;
use vigil_util::{default_config_path, format_duration_words};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a vigild configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match vigil_config::load_config(&config_path) {
        Ok(policy) => {
            let enforcement = &policy.enforcement;
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", vigil_config::CURRENT_CONFIG_VERSION);
            println!(
                "  Initial window: {}",
                format_duration_words(enforcement.initial_wait)
            );
            println!(
                "  Reminder after: {}",
                format_duration_words(enforcement.reminder_wait)
            );
            println!(
                "  Removal after:  {}",
                format_duration_words(enforcement.kick_delay())
            );
            println!();
            println!("Monitored channels:");
            for channel in &policy.channels {
                println!("  - {}: {}", channel.id, channel.label);
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                vigil_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                vigil_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                vigil_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                vigil_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        vigil_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
