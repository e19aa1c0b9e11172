// src/logging.rs

//! Log setup for the command-line binary.
//!
//! The library only emits records through the `log` facade. The CLI
//! installs `env_logger` and tees its output to stderr and an append-only
//! run log file.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Writer that copies everything into two sinks.
pub struct Tee<A, B> {
    primary: A,
    secondary: B,
}

impl<A: Write, B: Write> Tee<A, B> {
    pub fn new(primary: A, secondary: B) -> Self {
        Self { primary, secondary }
    }
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.primary.write_all(buf)?;
        // Run log failures never reach the caller.
        let _ = self.secondary.write_all(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = self.secondary.flush();
        self.primary.flush()
    }
}

/// Open the run log for appending, creating it and its directory.
pub fn open_run_log(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Initialize `env_logger`; `RUST_LOG` overrides the default level.
#[cfg(feature = "cli")]
pub fn init(verbose: bool, run_log: &Path) -> io::Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let file = open_run_log(run_log)?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .target(env_logger::Target::Pipe(Box::new(Tee::new(io::stderr(), file))))
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_tee_writes_both_sinks() {
        let mut tee = Tee::new(Vec::new(), Vec::new());
        tee.write_all(b"[INFO] downloaded: GEN-0.1\n").unwrap();
        tee.flush().unwrap();
        assert_eq!(tee.primary, tee.secondary);
        assert_eq!(tee.primary, b"[INFO] downloaded: GEN-0.1\n");
    }

    #[test]
    fn test_run_log_appends() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("logs").join("aip_mirror.log");

        open_run_log(&path).unwrap().write_all(b"first\n").unwrap();
        open_run_log(&path).unwrap().write_all(b"second\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }
}
