use rust_i18n::t;
use std::fs::File;
use std::path::Path;

use crate::error::AppError;

/// Simplifies file paths by extracting relevant parts from cargo registry paths
///
/// # Arguments
/// * `file_path` - The file path to simplify
///
/// # Returns
/// A simplified version of the file path
fn simplify_file_path(file_path: &str) -> String {
    if file_path.contains("ollama-complete") || file_path.starts_with("src/") {
        if let Some(pos) = file_path.rfind("src/") {
            return file_path[pos..].to_string();
        }
    }

    if let Some((_, suffix)) = file_path.split_once(".cargo/registry/src/") {
        if let Some(first_slash) = suffix.find('/') {
            suffix[(first_slash + 1)..].to_string()
        } else {
            suffix.to_string()
        }
    } else {
        file_path.to_string()
    }
}

/// Only our own debug output is interesting; dependencies log at info and up.
fn is_own_or_important(record: &log::Metadata, threshold: log::LevelFilter) -> bool {
    record.target().starts_with("ollama_complete") || record.level() < threshold
}

/// Formats log messages for console output with a simplified format
///
/// # Features
/// * Simplified time format (HH:MM:SS)
/// * Colored level for quick scanning
pub fn console_log_formatter(
    out: fern::FormatCallback,
    message: &std::fmt::Arguments,
    record: &log::Record,
) {
    let level = record.level();
    let level_color = match level {
        log::Level::Error => "\x1B[31m", // red
        log::Level::Warn => "\x1B[33m",  // yellow
        log::Level::Info => "\x1B[32m",  // green
        log::Level::Debug => "\x1B[0m",  // normal
        log::Level::Trace => "\x1B[35m", // purple
    };
    let reset = "\x1B[0m";

    out.finish(format_args!(
        "{}{}[{}] {}:{} {}{}",
        level_color,
        chrono::Local::now().format("%H:%M:%S.%3f "),
        get_level(level),
        simplify_file_path(record.file().unwrap_or("")),
        record.line().unwrap_or(0),
        message,
        reset,
    ))
}

/// Formats log messages for file output with the full date
pub fn file_log_formatter(
    out: fern::FormatCallback,
    message: &std::fmt::Arguments,
    record: &log::Record,
) {
    out.finish(format_args!(
        "{}[{}] {}:{} {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S.%3f"),
        get_level(record.level()),
        simplify_file_path(record.file().unwrap_or("")),
        record.line().unwrap_or(0),
        message
    ))
}

/// Sets up the logger.
///
/// Console output goes to stderr so stdout stays reserved for completions.
///
/// # Arguments
/// * `log_file` - Optional file that additionally receives info and above
/// * `verbose` - Show debug output on the console
pub fn setup_logger(log_file: Option<&Path>, verbose: bool) -> Result<(), AppError> {
    let console_level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };

    let stderr_dispatcher = fern::Dispatch::new()
        .level(console_level)
        .filter(move |metadata| is_own_or_important(metadata, log::LevelFilter::Debug))
        .format(console_log_formatter)
        .chain(std::io::stderr());

    let mut dispatcher = fern::Dispatch::new()
        .level(log::LevelFilter::Debug)
        .chain(stderr_dispatcher);

    if let Some(log_file_path) = log_file {
        if let Some(log_dir) = log_file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(log_dir).map_err(|e| AppError::General {
                message: t!(
                    "main.failed_to_create_log_directory",
                    path = log_dir.display().to_string(),
                    error = e.to_string()
                )
                .to_string(),
            })?;
        }
        let log_file_error = |e: std::io::Error| AppError::General {
            message: t!(
                "main.failed_to_create_log_file",
                path = log_file_path.display().to_string(),
                error = e.to_string()
            )
            .to_string(),
        };
        File::create(log_file_path).map_err(log_file_error)?;

        let file_dispatcher = fern::Dispatch::new()
            .level(log::LevelFilter::Info)
            .filter(|metadata| is_own_or_important(metadata, log::LevelFilter::Info))
            .format(file_log_formatter)
            .chain(fern::log_file(log_file_path).map_err(log_file_error)?);
        dispatcher = dispatcher.chain(file_dispatcher);
    }

    dispatcher.apply().map_err(|e| AppError::General {
        message: t!("main.failed_to_initialize_logger", error = e.to_string()).to_string(),
    })?;

    log::debug!("Logger initialized, log file: {:?}", log_file);
    Ok(())
}

fn get_level(level: log::Level) -> String {
    match level {
        log::Level::Error => "E",
        log::Level::Warn => "W",
        log::Level::Info => "I",
        log::Level::Debug => "D",
        log::Level::Trace => "T",
    }
    .to_string()
}

#[cfg(test)]
use log::SetLoggerError;

/// Console-only logger for tests
#[cfg(test)]
pub fn setup_test_logger() -> Result<(), SetLoggerError> {
    if log::logger().enabled(&log::Metadata::builder().level(log::Level::Debug).build()) {
        return Ok(());
    }

    fern::Dispatch::new()
        .format(console_log_formatter)
        .level(log::LevelFilter::Debug)
        .filter(|metadata| is_own_or_important(metadata, log::LevelFilter::Debug))
        .chain(std::io::stdout())
        .apply()?;

    log::debug!("Test logger initialized successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simplify_file_path() {
        assert_eq!(
            simplify_file_path("/home/dev/ollama-complete/src/completions/cancel.rs"),
            "src/completions/cancel.rs"
        );
        assert_eq!(
            simplify_file_path("/home/dev/.cargo/registry/src/index.crates.io-6f17d22bba15001f/reqwest-0.12.8/src/async_impl/client.rs"),
            "reqwest-0.12.8/src/async_impl/client.rs"
        );
        assert_eq!(simplify_file_path("src/main.rs"), "src/main.rs");
    }
}
