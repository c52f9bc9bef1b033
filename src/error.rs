use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Error produced by a broken promise.
///
/// Carries a human-readable description of the failure. Errors are cloneable
/// so that a forked promise can hand an independent copy to every branch.
#[derive(Clone)]
pub struct Error {
    message: String,
}

impl Error {
    /// Create a new error from a description.
    pub fn new(message: impl Into<String>) -> Error {
        Error {
            message: message.into(),
        }
    }

    /// The description this error was created with.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Convert a caught panic payload into an error.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Error {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "promise callback panicked".to_string()
        };
        Error { message }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.message)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Error")
            .field("message", &self.message)
            .finish()
    }
}

impl StdError for Error {}

impl From<String> for Error {
    fn from(message: String) -> Error {
        Error { message }
    }
}

impl From<&str> for Error {
    fn from(message: &str) -> Error {
        Error::new(message)
    }
}

/// A result cell holding at most one value and any number of accumulated
/// errors.
///
/// Nodes deposit their outcome here during `get`. Errors discovered while
/// releasing dependencies are appended to whatever is already present;
/// consumers check errors first.
pub(crate) struct ResultSlot<T> {
    pub(crate) value: Option<T>,
    pub(crate) errors: Vec<Error>,
}

impl<T> ResultSlot<T> {
    pub(crate) fn new() -> ResultSlot<T> {
        ResultSlot {
            value: None,
            errors: Vec::new(),
        }
    }

    pub(crate) fn set_value(&mut self, value: T) {
        self.value = Some(value);
    }

    pub(crate) fn add_error(&mut self, error: Error) {
        self.errors.push(error);
    }

    pub(crate) fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Move the contents of `other` into `self`.
    pub(crate) fn absorb(&mut self, other: ResultSlot<T>) {
        if let Some(value) = other.value {
            self.value = Some(value);
        }
        self.errors.extend(other.errors);
    }

    /// Collapse the cell into a `Result`, keeping the first error.
    ///
    /// Additional accumulated errors are logged rather than dropped.
    ///
    /// # Panics
    ///
    /// Panics if the cell holds neither a value nor an error, which means
    /// `get` ran before readiness was signaled.
    pub(crate) fn into_result(self) -> Result<T, Error> {
        let mut errors = self.errors.into_iter();
        if let Some(first) = errors.next() {
            for extra in errors {
                log::warn!("promise produced an additional error after the first: {}", extra);
            }
            return Err(first);
        }
        match self.value {
            Some(value) => Ok(value),
            None => panic!("promise completed without a value or an error"),
        }
    }
}

impl<T> Default for ResultSlot<T> {
    fn default() -> ResultSlot<T> {
        ResultSlot::new()
    }
}

impl<T> fmt::Debug for ResultSlot<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("ResultSlot")
            .field("has_value", &self.value.is_some())
            .field("errors", &self.errors)
            .finish()
    }
}

/// Drop a value, converting a panicking destructor into an error.
pub(crate) fn drop_catching<V>(value: V) -> Option<Error> {
    panic::catch_unwind(AssertUnwindSafe(move || drop(value)))
        .err()
        .map(Error::from_panic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_error_wins() {
        let mut slot = ResultSlot::new();
        slot.set_value(1);
        slot.add_error(Error::new("first"));
        slot.add_error(Error::new("second"));
        let err = slot.into_result().unwrap_err();
        assert_eq!(err.message(), "first");
    }

    #[test]
    fn value_without_errors() {
        let mut slot = ResultSlot::new();
        slot.set_value("hello");
        assert_eq!(slot.into_result().unwrap(), "hello");
    }

    #[test]
    fn panicking_drop_is_captured() {
        struct Bomb;
        impl Drop for Bomb {
            fn drop(&mut self) {
                panic!("kaboom");
            }
        }
        let err = drop_catching(Bomb).expect("panic should be captured");
        assert_eq!(err.message(), "kaboom");
    }

    #[test]
    fn quiet_drop_is_not_an_error() {
        assert!(drop_catching(42).is_none());
    }
}
