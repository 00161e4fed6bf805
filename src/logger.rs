use core::fmt;

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::config::LOG_LEVEL;

static LOGGER: Logger = Logger;

pub fn init() -> Result<(), SetLoggerError> {
    init_with_level(LOG_LEVEL)
}

pub fn init_with_level(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

fn color(level: Level) -> &'static str {
    match level {
        Level::Error => "31",
        Level::Warn => "33",
        Level::Info => "32",
        Level::Debug => "34",
        Level::Trace => "35",
    }
}

struct Tag(Level);

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\x1b[{}m{:<5}\x1b[0m", color(self.0), self.0)
    }
}

struct Logger;

impl Logger {
    fn log_message(&self, record: &Record) {
        let level = Tag(record.level());
        match (record.level(), record.file(), record.line()) {
            (Level::Debug, Some(file), Some(line)) => crate::console::write_fmt(format_args!(
                "[{}] {}: {}, {}:{}\n",
                level,
                record.target(),
                record.args(),
                file,
                line
            )),
            _ => crate::console::write_fmt(format_args!(
                "[{}] {}: {}\n",
                level,
                record.target(),
                record.args()
            )),
        }
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.log_message(record);
        }
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::tests::captured;

    fn emit(level: Level, line: Option<u32>) -> String {
        captured(|| {
            LOGGER.log(
                &Record::builder()
                    .level(level)
                    .target("kcore::timer")
                    .file(Some("src/core/interrupts/timer.rs"))
                    .line(line)
                    .args(format_args!("ticks {}", 42))
                    .build(),
            )
        })
    }

    #[test]
    fn info_records_are_coloured_without_location() {
        log::set_max_level(LevelFilter::Trace);
        let out = emit(Level::Info, Some(7));
        assert_eq!(out, "[\x1b[32mINFO \x1b[0m] kcore::timer: ticks 42\n");
    }

    #[test]
    fn debug_records_carry_file_and_line() {
        log::set_max_level(LevelFilter::Trace);
        let out = emit(Level::Debug, Some(7));
        assert!(out.starts_with("[\x1b[34mDEBUG\x1b[0m] kcore::timer: ticks 42"));
        assert!(out.ends_with(", src/core/interrupts/timer.rs:7\n"));
    }
}
