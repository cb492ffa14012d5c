//! Leveled logging to the console and an append-only log file.
//!
//! The level filter is set once at startup from the CLI; every formatted
//! line goes to stderr and is appended to the log file through a tee writer.

use env_logger::{Builder, Target};
use log::LevelFilter;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// Initializes the global logger. Must be called once, before any log line
/// is emitted.
pub fn init(level: LevelFilter, log_path: &Path) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(log_path)?;
    Builder::new()
        .filter_level(level)
        .target(Target::Pipe(Box::new(TeeWriter { file })))
        .init();
    Ok(())
}
