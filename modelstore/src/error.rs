//! `Error` and `Result` types arising out of query compilation and
//! document-store operations.
//!
//! The shape of this module mirrors a classic pattern for backtrace-aware,
//! chainable errors: a structured, machine-readable `ErrorKind`, a `Error`
//! struct carrying a message plus an optional boxed cause, and a
//! `ResultExt::chain` helper for prepending context while propagating.

use std::borrow::Cow;
use std::error;
use std::fmt;
use std::ops::Deref;
use std::result;

use backtrace::Backtrace;

/// Slightly augmented trait for backtrace-able errors.
pub trait ErrorExt: error::Error {
    /// Similar to `std::error::Error::source()`, but with richer type info.
    fn reason(&self) -> Option<&(dyn ErrorExt + 'static)> {
        None
    }

    /// Returns the deepest possible backtrace, if any.
    fn backtrace(&self) -> Option<&Backtrace> {
        self.reason().and_then(ErrorExt::backtrace)
    }

    /// Structured error kind.
    fn kind(&self) -> ErrorKind;

    /// Until subtrait coercions are implemented, this helper method
    /// returns the receiver as an `&std::error::Error` trait object.
    fn as_std_error(&self) -> &(dyn error::Error + 'static);
}

/// A trait for conveniently propagating errors up the call stack.
pub trait ResultExt<T>: Sized {
    /// If this `Result` is an `Err`, prepends the specified message
    /// to the front of the chain of causes.
    fn chain<M: ErrMsg>(self, message: M) -> Result<T>;
}

/// Values that can act as or generate an error message.
pub trait ErrMsg: Sized {
    /// Converts the value to an error message.
    fn into_message(self) -> Cow<'static, str>;
}

impl ErrMsg for &'static str {
    fn into_message(self) -> Cow<'static, str> {
        Cow::Borrowed(self)
    }
}

impl<F> ErrMsg for F
where
    F: FnOnce() -> String,
{
    fn into_message(self) -> Cow<'static, str> {
        Cow::Owned(self())
    }
}

/// Type alias for a `Result` containing a `modelstore` `Error`.
pub type Result<T> = result::Result<T, Error>;

impl<T, E> ResultExt<T> for result::Result<T, E>
where
    E: ErrorExt + 'static,
{
    fn chain<M: ErrMsg>(self, message: M) -> Result<T> {
        self.map_err(|cause| Error::with_cause(message.into_message(), cause))
    }
}

/// Stable, numeric-coded error taxonomy.
///
/// Each variant corresponds 1:1 to a row in the error table of the
/// specification; `code()` is the stable numeric identifier a caller
/// can match on without string comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No model descriptor was passed to a public operation.
    InvalidModel,
    /// Configuration value was not an object/mapping.
    InvalidConfig,
    /// A configuration field had the wrong scalar kind.
    InvalidSetting,
    /// A required configuration field (`database`) was missing.
    RequiredSetting,
    /// `items` was absent, empty, or the wrong kind for a bulk operation.
    InvalidItem,
    /// `distinct`'s key was missing or not a string.
    InvalidDistinctKey,
    /// The filter input was not an object or a sequence of objects.
    InvalidFilter,
    /// An unknown, non-`$`-prefixed filter type tag was used.
    InvalidFilterType,
    /// A malformed index specification.
    InvalidIndex,
    /// `increment`'s increment payload was empty or non-numeric.
    InvalidIncrementData,
    /// The model declares no unique indexes, but one is required.
    ModelEmptyUniqueIndexes,
    /// None of the model's unique indexes was satisfied by the item.
    EmptyUniqueIndexes,
    /// A failure originating in the document-store driver.
    MongoDbInternalError,
}

impl ErrorKind {
    /// The stable numeric code for this error kind.
    pub fn code(self) -> u32 {
        use ErrorKind::*;

        match self {
            InvalidModel => 1,
            InvalidConfig => 2,
            InvalidSetting => 3,
            RequiredSetting => 4,
            InvalidItem => 5,
            InvalidDistinctKey => 6,
            InvalidFilter => 7,
            InvalidFilterType => 8,
            InvalidIndex => 9,
            InvalidIncrementData => 10,
            ModelEmptyUniqueIndexes => 11,
            EmptyUniqueIndexes => 12,
            MongoDbInternalError => 13,
        }
    }

    /// Human-readable name, stable across releases (used in `Display`).
    pub fn as_str(self) -> &'static str {
        use ErrorKind::*;

        match self {
            InvalidModel => "INVALID_MODEL",
            InvalidConfig => "INVALID_CONFIG",
            InvalidSetting => "INVALID_SETTING",
            RequiredSetting => "REQUIRED_SETTING",
            InvalidItem => "INVALID_ITEM",
            InvalidDistinctKey => "INVALID_DISTINCT_KEY",
            InvalidFilter => "INVALID_FILTER",
            InvalidFilterType => "INVALID_FILTER_TYPE",
            InvalidIndex => "INVALID_INDEX",
            InvalidIncrementData => "INVALID_INCREMENT_DATA",
            ModelEmptyUniqueIndexes => "MODEL_EMPTY_UNIQUE_INDEXES",
            EmptyUniqueIndexes => "EMPTY_UNIQUE_INDEXES",
            MongoDbInternalError => "MONGODB_INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

/// The central error type for `modelstore`.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Cow<'static, str>,
    cause: Option<Box<dyn ErrorExt>>,
    backtrace: Option<Backtrace>,
}

impl Error {
    /// Creates an error with the specified kind, message, no cause,
    /// and a fresh backtrace.
    pub fn new<S>(kind: ErrorKind, message: S) -> Self
    where
        S: Into<Cow<'static, str>>,
    {
        Error {
            kind,
            message: message.into(),
            cause: None,
            backtrace: Some(Backtrace::new()),
        }
    }

    /// Creates an error with the specified message and cause, inheriting the
    /// cause's `ErrorKind`. If the cause has no backtrace, one is captured.
    pub fn with_cause<S, E>(message: S, cause: E) -> Self
    where
        S: Into<Cow<'static, str>>,
        E: ErrorExt + 'static,
    {
        let kind = cause.kind();
        let message = message.into();
        let backtrace = if cause.backtrace().is_none() {
            Some(Backtrace::new())
        } else {
            None
        };
        let cause: Option<Box<dyn ErrorExt>> = Some(Box::new(cause));

        Error {
            kind,
            message,
            cause,
            backtrace,
        }
    }

    /// The machine-readable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl ErrorExt for Error {
    fn reason(&self) -> Option<&(dyn ErrorExt + 'static)> {
        self.cause.as_ref().map(Deref::deref)
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.reason()
            .and_then(ErrorExt::backtrace)
            .or(self.backtrace.as_ref())
    }

    fn kind(&self) -> ErrorKind {
        self.kind
    }

    fn as_std_error(&self) -> &(dyn error::Error + 'static) {
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;

        if let Some(cause) = self.cause.as_ref() {
            write!(f, ", caused by: {}", cause)?;
        }

        Ok(())
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.reason().map(ErrorExt::as_std_error)
    }
}

impl From<mongodb::error::Error> for Error {
    fn from(error: mongodb::error::Error) -> Self {
        Self::with_cause("MongoDB driver error", error)
    }
}

impl ErrorExt for mongodb::error::Error {
    fn kind(&self) -> ErrorKind {
        ErrorKind::MongoDbInternalError
    }

    fn as_std_error(&self) -> &(dyn error::Error + 'static) {
        self
    }
}

impl From<bson::ser::Error> for Error {
    fn from(error: bson::ser::Error) -> Self {
        Self::with_cause("BSON encoding error", error)
    }
}

impl ErrorExt for bson::ser::Error {
    fn kind(&self) -> ErrorKind {
        ErrorKind::MongoDbInternalError
    }

    fn as_std_error(&self) -> &(dyn error::Error + 'static) {
        self
    }
}

impl From<bson::de::Error> for Error {
    fn from(error: bson::de::Error) -> Self {
        Self::with_cause("BSON decoding error", error)
    }
}

impl ErrorExt for bson::de::Error {
    fn kind(&self) -> ErrorKind {
        ErrorKind::MongoDbInternalError
    }

    fn as_std_error(&self) -> &(dyn error::Error + 'static) {
        self
    }
}
