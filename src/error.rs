//! Error types for the OverDrive client
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are categorized by the stage that raised them so callers can decide
//! whether an operation must abort or can continue.
//!
//! ## Error Taxonomy
//!
//! ### Fatal to the whole operation
//! - `InvalidDescriptor` - malformed ODM document or missing id / acquisition URL
//! - `LicenseError` - handshake transport failure or vendor-reported error
//! - `NoDownloadUrl` - no format or no `download` protocol entry
//!
//! ### Isolated per job
//! - `PartError` - transport or filesystem failure for one part / cover art.
//!   The downloader collects these into a `DownloadReport` instead of aborting.
//!
//! ### Recoverable while extracting chapters
//! - `TimeParseError` - malformed marker time; the marker is skipped and logged
//!
//! ### Surfaced, never retried
//! - `ReturnError` - early return of the loan failed

use thiserror::Error;

/// Result type alias using our OdmError type
pub type Result<T> = std::result::Result<T, OdmError>;

/// Main error type for the OverDrive client
#[derive(Error, Debug)]
pub enum OdmError {
    // ===== Descriptor / License Errors =====

    /// The ODM document is malformed or lacks a required field
    #[error("Invalid ODM file: {0}")]
    InvalidDescriptor(String),

    /// License acquisition failed (network failure or vendor error message)
    #[error("License error: {0}")]
    LicenseError(String),

    /// No format carries a `download` protocol
    #[error("Could not get download url")]
    NoDownloadUrl,

    /// XML payload could not be read
    #[error("Invalid XML: {0}")]
    InvalidXml(String),

    // ===== Download Errors =====

    /// A single part (or the cover art) failed to download
    #[error("Download of {part} failed: {message}")]
    PartError {
        /// Part file name or "cover art"
        part: String,
        message: String,
    },

    /// Server returned a status other than 200
    #[error("Invalid status code received: {status_code} ({url})")]
    UnexpectedStatusCode {
        status_code: u16,
        url: String,
    },

    /// Early return of the loan failed
    #[error("Return failed: {0}")]
    ReturnError(String),

    // ===== Chapter Errors =====

    /// Marker time could not be normalized
    #[error("Cannot normalize time '{time}': {reason}")]
    TimeParseError {
        time: String,
        reason: String,
    },

    /// FFmpeg execution error
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// FFmpeg binary not found in PATH
    #[error("FFmpeg not found. Please install FFmpeg and ensure it's in your PATH.")]
    FfmpegNotFound,

    // ===== File Errors =====

    /// File or directory path is unusable
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Generic file I/O error with context
    #[error("File I/O error: {0}")]
    FileIoError(String),

    // ===== Configuration Errors =====

    /// Configuration is invalid or incomplete
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Internal error that should not normally occur
    #[error("Internal error: {0}")]
    InternalError(String),

    // ===== External Library Errors =====

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Zip archive error
    #[error("Archive error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<quick_xml::Error> for OdmError {
    fn from(err: quick_xml::Error) -> Self {
        OdmError::InvalidXml(err.to_string())
    }
}

// Helper methods for creating common errors
impl OdmError {
    /// Create an InvalidDescriptor error with a message
    pub fn invalid_descriptor<S: Into<String>>(message: S) -> Self {
        OdmError::InvalidDescriptor(message.into())
    }

    /// Create a LicenseError with a message
    pub fn license<S: Into<String>>(message: S) -> Self {
        OdmError::LicenseError(message.into())
    }

    /// Create a PartError for the named part
    pub fn part_failed<P: Into<String>, S: Into<String>>(part: P, message: S) -> Self {
        OdmError::PartError {
            part: part.into(),
            message: message.into(),
        }
    }

    /// Create a TimeParseError
    pub fn time_parse<T: Into<String>, S: Into<String>>(time: T, reason: S) -> Self {
        OdmError::TimeParseError {
            time: time.into(),
            reason: reason.into(),
        }
    }

    /// Create an InternalError with a message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        OdmError::InternalError(message.into())
    }

    /// Check if error must abort the whole download
    ///
    /// Descriptor, license and format errors stop everything; part and
    /// marker errors are isolated to the job or marker that raised them.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            OdmError::PartError { .. }
                | OdmError::TimeParseError { .. }
                | OdmError::UnexpectedStatusCode { .. }
        )
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            OdmError::FfmpegNotFound => {
                "FFmpeg is required but not found. Please install FFmpeg and ensure it's in your PATH.".to_string()
            }
            OdmError::LicenseError(message) => {
                format!(
                    "Could not acquire a license: {}. If the book was already downloaded on another device, keep the .license file next to the .odm file.",
                    message
                )
            }
            OdmError::NoDownloadUrl => {
                "This ODM file does not offer a downloadable format.".to_string()
            }
            _ => self.to_string(),
        }
    }
}
