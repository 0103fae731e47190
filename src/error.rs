//! Error types for dns-proxy
//!
//! Errors are categorized by subsystem: configuration, PID-file handling,
//! and socket setup. Everything that can fail during startup surfaces as
//! one of these. Per-query transport failures never become errors; they
//! only feed the upstream scoring state.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Top-level error type for dns-proxy
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Configuration errors (file reading, parsing, validation, resolution)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// PID-file errors (conflict with a live process, I/O)
    #[error("PID file error: {0}")]
    PidFile(#[from] PidFileError),

    /// Listener socket setup errors
    #[error("Socket error: {0}")]
    Socket(#[from] SocketError),

    /// Log sink setup errors
    #[error("Logging error: {0}")]
    Logging(String),

    /// I/O errors not covered by other categories
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Configuration-related errors
///
/// All of these are startup-fatal; none are recoverable at runtime.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File not found or inaccessible
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// YAML parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Validation error (invalid values, missing required fields)
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// Upstream host could not be resolved to a socket address
    #[error("Cannot resolve upstream host: {host}")]
    UnresolvableHost { host: String },

    /// I/O error while reading the config file
    #[error("I/O error reading configuration: {0}")]
    IoError(#[from] io::Error),
}

impl ConfigError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Create an unresolvable-host error
    pub fn unresolvable(host: impl Into<String>) -> Self {
        Self::UnresolvableHost { host: host.into() }
    }
}

/// PID-file errors
#[derive(Debug, Error)]
pub enum PidFileError {
    /// The PID file names a process that is still alive
    #[error("process already running (PID {pid}), PID file {path}")]
    AlreadyRunning { pid: i32, path: String },

    /// I/O error reading or writing the PID file
    #[error("PID file I/O error at {path}: {source}")]
    IoError {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Listener socket setup errors
#[derive(Debug, Error)]
pub enum SocketError {
    /// Failed to create the socket
    #[error("Failed to create UDP socket: {0}")]
    SocketCreation(String),

    /// Failed to set a socket option (`SO_REUSEPORT`, etc.)
    #[error("Failed to set socket option {option}: {reason}")]
    SocketOption { option: String, reason: String },

    /// Failed to bind to the listen address
    #[error("Failed to bind to {addr}: {reason}")]
    BindError { addr: SocketAddr, reason: String },

    /// I/O error
    #[error("Socket I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl SocketError {
    /// Create a socket option error
    pub fn socket_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SocketOption {
            option: option.into(),
            reason: reason.into(),
        }
    }

    /// Create a bind error
    pub fn bind(addr: SocketAddr, reason: impl Into<String>) -> Self {
        Self::BindError {
            addr,
            reason: reason.into(),
        }
    }
}

/// Type alias for Result with `ProxyError`
pub type Result<T> = std::result::Result<T, ProxyError>;
