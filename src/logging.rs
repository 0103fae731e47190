//! Log sink selection and tracing setup
//!
//! The `-log` flag selects where structured logs go: standard error
//! (default), a file opened in append mode, or the local syslog daemon
//! (facility LOCAL7, tag `dns-proxy`). `RUST_LOG` overrides the default
//! `info` level in every case.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::error::ProxyError;

/// Where log output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    /// Standard error (the default)
    Stderr,
    /// Local syslog, facility LOCAL7, tag `dns-proxy`
    Syslog,
    /// Append to the given file, created with mode 0644
    File(PathBuf),
}

impl LogSink {
    /// Interpret the `-log` flag value.
    pub fn from_flag(value: &str) -> Self {
        match value {
            "" => Self::Stderr,
            "syslog" => Self::Syslog,
            path => Self::File(PathBuf::from(path)),
        }
    }
}

fn default_filter() -> EnvFilter {
    EnvFilter::from_default_env().add_directive(Level::INFO.into())
}

/// Install the global tracing subscriber writing to `sink`.
///
/// # Errors
///
/// Returns `ProxyError::Logging` if a log file cannot be opened.
pub fn init(sink: &LogSink) -> Result<(), ProxyError> {
    match sink {
        LogSink::Stderr => {
            tracing_subscriber::fmt()
                .with_env_filter(default_filter())
                .with_writer(io::stderr)
                .init();
        }
        LogSink::File(path) => {
            let file = open_log_file(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(default_filter())
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        LogSink::Syslog => {
            syslog_open();
            tracing_subscriber::fmt()
                .with_env_filter(default_filter())
                .with_ansi(false)
                .without_time()
                .with_writer(|| SyslogWriter)
                .init();
        }
    }
    Ok(())
}

/// Append-open a log file with mode 0644.
fn open_log_file(path: &Path) -> Result<File, ProxyError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o644)
        .open(path)
        .map_err(|e| ProxyError::Logging(format!("unable to open log file {path:?}: {e}")))
}

// The ident pointer passed to openlog must stay valid for the process
// lifetime, hence the static byte string.
const SYSLOG_TAG: &[u8] = b"dns-proxy\0";
const SYSLOG_FORMAT: &[u8] = b"%s\0";

fn syslog_open() {
    unsafe {
        libc::openlog(
            SYSLOG_TAG.as_ptr().cast(),
            libc::LOG_PID,
            libc::LOG_LOCAL7,
        );
    }
}

/// `io::Write` adapter feeding formatted log lines to `syslog(3)`.
struct SyslogWriter;

impl io::Write for SyslogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for line in buf.split(|b| *b == b'\n').filter(|l| !l.is_empty()) {
            // syslog takes a C string; any interior NUL would truncate
            // the message, so replace them before conversion.
            let sanitized: Vec<u8> = line
                .iter()
                .map(|&b| if b == 0 { b' ' } else { b })
                .collect();
            if let Ok(message) = CString::new(sanitized) {
                unsafe {
                    libc::syslog(
                        libc::LOG_INFO,
                        SYSLOG_FORMAT.as_ptr().cast(),
                        message.as_ptr(),
                    );
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
