//! Error types for taostd.
//!
//! Every failure surfaces as a [`TaosError`]. Schema resolution and SQL
//! synthesis errors have their own kinds; everything the wire driver reports
//! is carried through as [`TaosError::driver`] with its numeric code, so the
//! insert path can tell "table does not exist" apart from other failures.

use std::backtrace::Backtrace;
use std::fmt::{Display, Formatter};

/// Result alias used across the crate.
pub type Result<T, E = TaosError> = std::result::Result<T, E>;

/// 3.x codes for "table does not exist": 0x2603 from the parser, 0x2662
/// from the vnode. The native client may report them with the high bit set,
/// so only the low 16 bits are compared.
const TABLE_MISSING_CODES: [i32; 2] = [0x2603, 0x2662];

/// 2.x "invalid table id" (0x80000362), compared in full. On 3.x the low
/// half, 0x0362, means the supertable does not exist and must not trigger
/// a create.
const LEGACY_TABLE_MISSING: u32 = 0x8000_0362;

/// 2.x "table already exists" (0x80000360), compared in full. On 3.x 0x0360
/// is "stable already exists"; 3.x table conflicts are recognised by message.
const LEGACY_TABLE_EXISTS: u32 = 0x8000_0360;

/// Error type for taostd operations.
///
/// Carries the error kind plus a backtrace captured at construction, which
/// helps when errors cross the sync/async bridge.
#[derive(Debug)]
pub struct TaosError {
    kind: ErrorKind,
    backtrace: Backtrace,
}

impl TaosError {
    fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    /// Creates a connection error.
    pub(crate) fn connection(msg: String) -> Self {
        Self::new(ErrorKind::Connection(msg))
    }

    /// Creates a driver error from a numeric driver code and its message.
    ///
    /// Public so that custom [`Session`](crate::driver::Session)
    /// implementations can report driver failures the orchestrator understands.
    pub fn driver(code: i32, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Driver {
            code,
            message: message.into(),
        })
    }

    /// Creates a value conversion error.
    pub(crate) fn conversion(msg: String) -> Self {
        Self::new(ErrorKind::Conversion(msg))
    }

    /// Creates an invalid option error.
    pub(crate) fn invalid_option(msg: String) -> Self {
        Self::new(ErrorKind::InvalidOption(msg))
    }

    pub(crate) fn table_not_found(table: &str) -> Self {
        Self::new(ErrorKind::TableNotFound(table.to_string()))
    }

    pub(crate) fn stable_not_found(stable: &str) -> Self {
        Self::new(ErrorKind::StableNotFound(stable.to_string()))
    }

    pub(crate) fn stable_mismatch(table: &str, expected: &str, given: &str) -> Self {
        Self::new(ErrorKind::StableMismatch {
            table: table.to_string(),
            expected: expected.to_string(),
            given: given.to_string(),
        })
    }

    pub(crate) fn missing_tag(tags: Vec<String>) -> Self {
        Self::new(ErrorKind::MissingTag(tags))
    }

    pub(crate) fn multi_column(columns: usize) -> Self {
        Self::new(ErrorKind::MultiColumnResult(columns))
    }

    pub(crate) fn timestamp_format(input: &str) -> Self {
        Self::new(ErrorKind::TimestampFormat(input.to_string()))
    }

    pub(crate) fn missing_table_key() -> Self {
        Self::new(ErrorKind::MissingTableKey)
    }

    /// Returns the backtrace captured when this error was created.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Returns the driver code if this error came from the driver.
    pub fn driver_code(&self) -> Option<i32> {
        match &self.kind {
            ErrorKind::Driver { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if the driver reported that the target table does not exist.
    ///
    /// This is the only condition that triggers the create-and-insert fallback.
    pub fn is_table_missing(&self) -> bool {
        match &self.kind {
            ErrorKind::Driver { code, message } => {
                TABLE_MISSING_CODES.contains(&(code & 0xFFFF))
                    || *code as u32 == LEGACY_TABLE_MISSING
                    || message.contains("Table does not exist")
                    || message.contains("Table not exists")
            }
            _ => false,
        }
    }

    /// Returns true if the driver reported that the table already exists.
    pub fn is_table_exists(&self) -> bool {
        match &self.kind {
            ErrorKind::Driver { code, message } => {
                *code as u32 == LEGACY_TABLE_EXISTS || message.contains("Table already exists")
            }
            _ => false,
        }
    }

    /// Returns true if this error came from the driver.
    pub fn is_driver(&self) -> bool {
        matches!(self.kind, ErrorKind::Driver { .. })
    }

    /// Returns true if this is a connection error.
    pub fn is_connection(&self) -> bool {
        matches!(self.kind, ErrorKind::Connection(_))
    }

    /// Returns true if this is a conversion error.
    pub fn is_conversion(&self) -> bool {
        matches!(self.kind, ErrorKind::Conversion(_))
    }

    pub fn is_invalid_option(&self) -> bool {
        matches!(self.kind, ErrorKind::InvalidOption(_))
    }

    pub fn is_table_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::TableNotFound(_))
    }

    pub fn is_stable_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::StableNotFound(_))
    }

    pub fn is_stable_mismatch(&self) -> bool {
        matches!(self.kind, ErrorKind::StableMismatch { .. })
    }

    pub fn is_missing_tag(&self) -> bool {
        matches!(self.kind, ErrorKind::MissingTag(_))
    }

    pub fn is_multi_column(&self) -> bool {
        matches!(self.kind, ErrorKind::MultiColumnResult(_))
    }

    pub fn is_timestamp_format(&self) -> bool {
        matches!(self.kind, ErrorKind::TimestampFormat(_))
    }

    pub fn is_missing_table_key(&self) -> bool {
        matches!(self.kind, ErrorKind::MissingTableKey)
    }
}

impl Display for TaosError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.kind, f)
    }
}

impl std::error::Error for TaosError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

#[derive(Debug, thiserror::Error)]
enum ErrorKind {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Driver error [{code:#06x}]: {message}")]
    Driver { code: i32, message: String },
    #[error("Type conversion error: {0}")]
    Conversion(String),
    #[error("Invalid option: {0}")]
    InvalidOption(String),
    #[error("Table '{0}' does not exist, specify a stable to create it")]
    TableNotFound(String),
    #[error("Stable '{0}' does not exist")]
    StableNotFound(String),
    #[error("Table '{table}' belongs to stable '{expected}', but '{given}' was given")]
    StableMismatch {
        table: String,
        expected: String,
        given: String,
    },
    #[error("Row carries no tag value, expected at least one of: {}", .0.join(","))]
    MissingTag(Vec<String>),
    #[error("Expected a single column, query returned {0}")]
    MultiColumnResult(usize),
    #[error("Invalid timestamp format: '{0}'")]
    TimestampFormat(String),
    #[error("Row has no 'table' key")]
    MissingTableKey,
}

/// Converts `taos_client::Error` to `TaosError`, keeping the driver code.
impl From<taos_client::Error> for TaosError {
    fn from(err: taos_client::Error) -> Self {
        let code: i32 = err.code().into();
        Self::driver(code, err.to_string())
    }
}
