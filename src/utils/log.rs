use chrono::Local;
use env_logger::{Builder, Env};
use std::io::Write;

/// Installs the global logger.
///
/// `default_level` is used unless `RUST_LOG` is set. Lines carry a local
/// timestamp with millisecond precision, the level and the module path.
///
/// # Returns
///
/// * `Err` if a logger was already installed.
pub fn init_logging(default_level: &str) -> Result<(), ::log::SetLoggerError> {
    Builder::from_env(Env::default().default_filter_or(default_level))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init()
}
