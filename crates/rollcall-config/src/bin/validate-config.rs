//! Config validation CLI tool
//!
//! Validates a rollcalld configuration file and reports any errors.

use rollcall_config::ConfigError;
use rollcall_util::{default_config_path, format_datetime_full, format_duration};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a rollcalld configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            eprintln!("  validate-config config.example.toml");
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match rollcall_config::load_config(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", rollcall_config::CURRENT_CONFIG_VERSION);
            println!("  Calendar: {}", config.calendar.calendar_id);
            println!("  Channel: {}", config.messaging.channel_id);
            match &config.schedule.horizon_end {
                Some(end) => println!("  Horizon end: {}", format_datetime_full(end)),
                None => println!("  Horizon end: (from --until)"),
            }
            println!("  Window size: {}", format_duration(config.schedule.window));
            println!("  Lead time: {}", format_duration(config.schedule.lead_time));
            println!(
                "  Concurrency: {} sessions, {} fetches",
                config.schedule.max_concurrent_sessions, config.schedule.max_concurrent_fetches
            );
            if !config.calendar.excluded_titles.is_empty() {
                println!();
                println!("Excluded titles:");
                for title in &config.calendar.excluded_titles {
                    println!("  - {}", title);
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        rollcall_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
