//! Central error types for the GML reader.
//!
//! Recoverable parse-level oddities (unknown elements, properties missing
//! from a locked schema) are tolerated silently, because real-world GML is
//! messy. The variants here are the unrecoverable ones: they stop the
//! stream but leave the reader in a safe, queryable state.

use core::fmt;

/// All error conditions surfaced by the public reader API.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The source file (or schema sidecar) could not be opened.
    OpenFailed {
        /// Pfad der nicht lesbar war.
        path: String,
        /// Betriebssystem-Fehlertext.
        message: String,
    },
    /// The XML tokenizer reported malformed input (well-formedness or
    /// encoding violation). Reported once with position; afterwards the
    /// reader stays stopped until `reset_reading()`.
    XmlParse {
        /// Tokenizer error text.
        message: String,
        /// 1-basierte Zeile im Dokument.
        line: u64,
        /// 1-basierte Spalte in der Zeile.
        column: u64,
    },
    /// A schema sidecar file does not carry a `GMLFeatureClassList` root.
    /// No partial load happens.
    NotAFeatureClassList(String),
    /// A schema sidecar is structurally broken (bad XML, missing `Name`,
    /// unparseable numbers).
    SidecarParse(String),
    /// An IO error while writing the schema sidecar.
    IoError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenFailed { path, message } => {
                write!(f, "failed to open '{path}': {message}")
            }
            Self::XmlParse { message, line, column } => {
                write!(f, "XML parsing failed at line {line}, column {column}: {message}")
            }
            Self::NotAFeatureClassList(path) => {
                write!(f, "'{path}' does not contain a GMLFeatureClassList tree")
            }
            Self::SidecarParse(msg) => write!(f, "schema sidecar parse error: {msg}"),
            Self::IoError(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Erstellt einen `OpenFailed` Fehler aus einem `std::io::Error`.
    pub(crate) fn open_failed(path: &std::path::Path, err: &std::io::Error) -> Self {
        Self::OpenFailed {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

/// A convenience `Result` type alias using [`Error`].
pub type Result<T> = core::result::Result<T, Error>;
