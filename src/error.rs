use serde::{Deserialize, Serialize};

pub type Error = anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies a failure so that callers can decide whether to skip, fall back or report it.
///
/// The type is attached to an `anyhow::Error` as context, so it can be recovered with
/// `err.downcast_ref::<ErrorType>()` anywhere up the stack.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// A file could not be read or written.
    Persistence,
    /// A single row or record was malformed.
    Parse,
    /// The remote recommendation service failed or answered with something unusable.
    Remote,
    /// A caller-supplied value was rejected before it entered a store.
    Validation,
    /// An operation was called out of order, e.g. before `LedgerStore::initialize`.
    Usage,
    /// A generation cycle was already running.
    Busy,
}

serde_plain::derive_display_from_serialize!(ErrorType);
serde_plain::derive_fromstr_from_deserialize!(ErrorType);

/// Attaches an `ErrorType` to a `Result`'s error.
pub(crate) trait IntoResult<T> {
    fn typed(self, error_type: ErrorType) -> Result<T>;
}

impl<T, E> IntoResult<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn typed(self, error_type: ErrorType) -> Result<T> {
        self.map_err(|e| e.into().context(error_type))
    }
}

/// Returns the `ErrorType` attached to `e`, if any.
pub fn error_type(e: &Error) -> Option<ErrorType> {
    e.downcast_ref::<ErrorType>().copied()
}

/// Creates an error of the given type whose `Display` is `message`.
pub(crate) fn typed_error(error_type: ErrorType, message: impl Into<String>) -> Error {
    anyhow::Error::msg(error_type).context(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_type_survives_context() {
        let e: Result<()> = Err(anyhow::anyhow!("disk full")).typed(ErrorType::Persistence);
        let e = e.unwrap_err().context("Unable to save ledger");
        assert_eq!(error_type(&e), Some(ErrorType::Persistence));
    }

    #[test]
    fn test_error_type_display() {
        assert_eq!(ErrorType::Validation.to_string(), "validation");
        let e = typed_error(ErrorType::Usage, "not initialized");
        assert_eq!(e.to_string(), "not initialized");
        assert_eq!(error_type(&e), Some(ErrorType::Usage));
    }
}
