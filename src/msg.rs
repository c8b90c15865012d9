//! Module `msg` implement the diagnostics reporter.
//!
//! Output is line oriented and human readable; the format is not a
//! stable contract. Each participant owns a reporter; when a log file
//! is configured all reporters of a run share the same sink.

use chrono::Local;

use std::{
    fs,
    io::Write,
    sync::{Arc, Mutex},
};

use crate::{Error, Result};

/// Level gated diagnostics sink.
pub struct Reporter {
    name: String,
    level: i64,
    file_level: i64,
    file: Option<Arc<Mutex<fs::File>>>,
}

impl Reporter {
    /// Create a reporter for participant `name` printing messages at
    /// or below `level` to stdout.
    pub fn new(name: &str, level: i64) -> Reporter {
        Reporter {
            name: name.to_string(),
            level,
            file_level: 0,
            file: None,
        }
    }

    /// Quiet reporter, used by tests and sub-components.
    pub fn quiet() -> Reporter {
        Reporter::new("", 0)
    }

    /// Attach a log file; messages at or below `file_level` are
    /// appended to it.
    pub fn set_log_file(&mut self, loc: &str, file_level: i64) -> Result<()> {
        let mut opts = fs::OpenOptions::new();
        let fd = err_at!(IOError, opts.create(true).append(true).open(loc))?;
        self.file = Some(Arc::new(Mutex::new(fd)));
        self.file_level = file_level;
        Ok(())
    }

    /// Share this reporter's log file with another participant's
    /// reporter.
    pub fn derive(&self, name: &str, level: i64) -> Reporter {
        Reporter {
            name: name.to_string(),
            level,
            file_level: self.file_level,
            file: self.file.as_ref().map(Arc::clone),
        }
    }

    pub fn to_level(&self) -> i64 {
        self.level
    }

    /// Emit one line, subject to the level gates.
    pub fn log(&self, level: i64, text: &str) {
        if level <= self.level {
            match self.name.is_empty() {
                true => println!("{}", text),
                false => println!("[{}] {}", self.name, text),
            }
        }
        if level <= self.file_level {
            if let Some(file) = &self.file {
                if let Ok(mut fd) = file.lock() {
                    let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f");
                    writeln!(fd, "{} [{}] {}", ts, self.name, text).ok();
                }
            }
        }
    }
}
