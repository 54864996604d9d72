//! Log setup: every line goes to stderr and to a per-run log file.

use anyhow::{Context, Result};
use chrono::Local;
use env_logger::{Env, Target};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Writes each buffer to stderr and the run's log file.
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

pub fn log_file_path(log_dir: &Path) -> PathBuf {
    log_dir.join(format!(
        "s3-exposure-guard-{}.log",
        Local::now().format("%Y%m%d-%H%M%S")
    ))
}

/// Initialize the global logger and return the log file path.
///
/// `RUST_LOG` overrides the default filter, which only lets our own crates through.
pub fn init(log_dir: &Path, verbose: bool) -> Result<PathBuf> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("cannot create log directory '{}'", log_dir.display()))?;
    let path = log_file_path(log_dir);
    let file = File::create(&path)
        .with_context(|| format!("cannot create log file '{}'", path.display()))?;

    let level = if verbose { "debug" } else { "info" };
    let default_filter =
        format!("warn,s3_exposure_guard={level},s3_exposure_guard_core={level}");

    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(TeeWriter { file })))
        .try_init()
        .context("logger already initialized")?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_name_carries_timestamp() {
        let path = log_file_path(Path::new("/var/log/guard"));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("s3-exposure-guard-"));
        assert!(name.ends_with(".log"));
        // s3-exposure-guard-YYYYmmdd-HHMMSS.log
        assert_eq!(name.len(), "s3-exposure-guard-".len() + 15 + ".log".len());
    }

    #[test]
    fn test_tee_writes_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tee.log");
        let mut tee = TeeWriter {
            file: File::create(&path).unwrap(),
        };
        tee.write_all(b"hello\n").unwrap();
        tee.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
    }
}
