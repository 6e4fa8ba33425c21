// Logger setup: colored stdout and an optional file rotated daily
//
// Everything logs through the `log` facade, this module only installs the
// backend once at startup.

use chrono::Local;
use fern::{
    colors::{Color, ColoredLevelConfig},
    DateBased, Dispatch,
};
use log::LevelFilter;
use std::{fs, io, path::PathBuf};
use thiserror::Error;

use crate::config::LogConfig;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("Cannot create logs directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    SetLogger(#[from] log::SetLoggerError),
}

fn colors() -> ColoredLevelConfig {
    ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Cyan)
        .trace(Color::BrightBlack)
}

/// Build the dispatcher described by `config` without installing it.
pub fn dispatch(config: &LogConfig) -> Result<Dispatch, LoggerError> {
    let mut base = Dispatch::new().level(config.level.into());
    for module in config.modules.iter() {
        base = base.level_for(module.module.clone(), LevelFilter::from(module.level));
    }

    let colors = colors();
    let use_color = !config.disable_log_color;
    let datetime_format = config.datetime_format.clone();
    let stdout = Dispatch::new()
        .format(move |out, message, record| {
            let now = Local::now().format(&datetime_format);
            if use_color {
                out.finish(format_args!(
                    "{} {} [{}] {}",
                    now,
                    colors.color(record.level()),
                    record.target(),
                    message
                ))
            } else {
                out.finish(format_args!("{} {} [{}] {}", now, record.level(), record.target(), message))
            }
        })
        .chain(io::stdout());
    base = base.chain(stdout);

    if !config.disable_file_logging {
        fs::create_dir_all(&config.logs_path).map_err(|source| LoggerError::Directory {
            path: config.logs_path.clone(),
            source,
        })?;

        // trailing separator, the date based suffix is appended as is
        let mut prefix = PathBuf::from(&config.logs_path);
        prefix.push("");

        let datetime_format = config.datetime_format.clone();
        let file = Dispatch::new()
            .format(move |out, message, record| {
                out.finish(format_args!(
                    "{} {} [{}] {}",
                    Local::now().format(&datetime_format),
                    record.level(),
                    record.target(),
                    message
                ))
            })
            .chain(DateBased::new(prefix, format!("%Y-%m-%d.{}", config.filename_log)));
        base = base.chain(file);
    }

    Ok(base)
}

/// Install the global logger, fails if one is already set.
pub fn init(config: &LogConfig) -> Result<(), LoggerError> {
    dispatch(config)?.apply()?;
    log::info!("Logger initialized at level {:?}", config.level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;
    use log::{Level, Record};

    #[test]
    fn test_file_output() {
        let dir = tempfile::tempdir().unwrap();
        let logs_path = dir.path().join("logs");
        let config = LogConfig {
            level: LogLevel::Debug,
            disable_log_color: true,
            logs_path: logs_path.to_string_lossy().into_owned(),
            ..Default::default()
        };

        let (level, logger) = dispatch(&config).unwrap().into_log();
        assert_eq!(level, LevelFilter::Debug);

        logger.log(
            &Record::builder()
                .args(format_args!("slot 7 allocated"))
                .level(Level::Info)
                .target("tasklane_client::allocator")
                .build(),
        );
        logger.flush();

        let files: Vec<_> = fs::read_dir(&logs_path).unwrap().collect();
        assert_eq!(files.len(), 1);
        let path = files[0].as_ref().unwrap().path();
        assert!(path.to_string_lossy().ends_with(&config.filename_log));
        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("slot 7 allocated"));
    }

    #[test]
    fn test_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let logs_path = dir.path().join("never");
        let config = LogConfig {
            level: LogLevel::Warn,
            disable_file_logging: true,
            logs_path: logs_path.to_string_lossy().into_owned(),
            ..Default::default()
        };

        let (level, _) = dispatch(&config).unwrap().into_log();
        assert_eq!(level, LevelFilter::Warn);
        assert!(!logs_path.exists());
    }
}
