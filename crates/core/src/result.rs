//! Result type definition and extension traits.

use crate::error::Error;

/// The standard Result type for store and object-model operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait providing combinators for store results.
pub trait ResultExt<T> {
    /// Treat `NotFound` as a regular branch instead of an error.
    ///
    /// # Errors
    ///
    /// Returns every error other than `NotFound` unchanged.
    fn found(self) -> Result<Option<T>>;

    /// Inspect the error without consuming the Result.
    #[must_use]
    fn inspect_error<F: FnOnce(&Error)>(self, f: F) -> Self;
}

impl<T> ResultExt<T> for Result<T> {
    fn found(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn inspect_error<F: FnOnce(&Error)>(self, f: F) -> Self {
        if let Err(ref e) = self {
            f(e);
        }
        self
    }
}
