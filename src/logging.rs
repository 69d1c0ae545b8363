use chrono::Local;
use env_logger::Builder;
use log::{LevelFilter, SetLoggerError};
use std::io::Write;

pub fn init_logger(level: LevelFilter) -> Result<(), SetLoggerError> {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}: {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .filter(None, level)
        .try_init()
}
