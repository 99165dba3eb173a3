//! Diagnostics for the codec.
//!
//! `log_metric!` emits one structured line per call in debug builds and is
//! compiled out of release builds. `enable_verbose_logging` installs an
//! `env_logger` backend once per process so the `log::` calls made by the
//! decoders become visible.

use colored::Colorize;
use log::{Level, LevelFilter};
use std::fs::OpenOptions;
use std::sync::Once;

use crate::config::LoggingConfig;
use crate::error::L1CaloError;

/// Logs a structured key-value metric string to stdout, only in debug builds.
///
/// # Example
/// ```
/// use l1calo_bytestream::log_metric;
/// let format = 3;
/// log_metric!("event"="ppm_compress", "format"=&format);
/// ```
#[macro_export]
macro_rules! log_metric {
    ($($key:literal = $value:expr),+ $(,)?) => {
        #[cfg(debug_assertions)]
        {
            let mut parts = Vec::new();
            $(
                parts.push(format!("\"{}\": \"{}\"", $key, $value));
            )+

            let output = format!("L1CALO_METRIC: {{ {} }}", parts.join(", "));
            println!("{}", output);
        }
    };
}

static INIT_LOGGER: Once = Once::new();

fn parse_level(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

fn colored_level(level: Level) -> String {
    let name = level.to_string();
    match level {
        Level::Error => name.red().bold().to_string(),
        Level::Warn => name.yellow().to_string(),
        Level::Info => name.green().to_string(),
        Level::Debug => name.blue().to_string(),
        Level::Trace => name.dimmed().to_string(),
    }
}

/// Installs the process-wide logger. Later calls are no-ops.
pub fn enable_verbose_logging(config: &LoggingConfig) -> Result<(), L1CaloError> {
    let mut result = Ok(());
    INIT_LOGGER.call_once(|| {
        let mut builder = env_logger::Builder::new();

        builder.is_test(false);
        builder.filter_level(parse_level(&config.level));

        // Custom formatter: just print the level and message
        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(buf, "[{}] {}", colored_level(record.level()), record.args())?;
            buf.flush()?;
            Ok(())
        });

        if let Some(filename) = &config.file {
            match OpenOptions::new().append(true).create(true).open(filename) {
                Ok(file) => {
                    colored::control::set_override(false);
                    builder.target(env_logger::Target::Pipe(Box::new(file)));
                }
                Err(e) => {
                    result = Err(L1CaloError::Io(e));
                    return;
                }
            }
        }

        let _ = builder.try_init();
    });
    result
}
