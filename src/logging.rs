use std::io::Write;

use chrono::Local;
use env_logger::{Builder, Env};
use log::SetLoggerError;

/// Installs the global logger. `default_level` is used unless `RUST_LOG`
/// is set. Lines carry a local timestamp, the level and the module path.
pub fn init(default_level: &str) -> Result<(), SetLoggerError> {
    Builder::from_env(Env::default().default_filter_or(default_level))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} [{}] {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or("-"),
                record.args()
            )
        })
        .try_init()
}
