use std::error::Error as StdError;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io::Error as IoError;
use std::result::Result as StdResult;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(C)]
pub enum ErrorKind {
    EstimationFailure = 1,
    ImageError = 2,
    InconsistentState = 3,
    InvalidArgument = 4,
    IoError = 5,
    MalformedData = 6,
    ShapeMismatch = 7,
    UnsupportedFeature = 8,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub description: String,
    pub source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind, description: String) -> Error {
        Error {
            kind,
            description,
            source: None,
        }
    }

    pub fn with_source<E: StdError + Send + Sync + 'static>(
        kind: ErrorKind,
        description: String,
        source: E,
    ) -> Error {
        Error {
            kind,
            description,
            source: Some(Box::new(source)),
        }
    }

    // Recoverable errors skip the current item without failing it.
    pub fn is_recoverable(&self) -> bool {
        self.kind == ErrorKind::EstimationFailure
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.description)?;
        if let Some(source) = &self.source {
            write!(f, ": {}", source)?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<IoError> for Error {
    fn from(err: IoError) -> Error {
        Error::with_source(ErrorKind::IoError, "I/O failure".to_string(), err)
    }
}

pub type Result<T> = StdResult<T, Error>;

pub trait IntoResult<T> {
    fn into_result<F: FnOnce() -> String>(self, desc_fn: F) -> Result<T>;

    fn res<F: FnOnce() -> String>(self, desc_fn: F) -> Result<T>
    where
        Self: Sized,
    {
        self.into_result(desc_fn)
    }
}

impl<T> IntoResult<T> for StdResult<T, IoError> {
    fn into_result<F: FnOnce() -> String>(self, desc_fn: F) -> Result<T> {
        self.map_err(|e| Error::with_source(ErrorKind::IoError, desc_fn(), e))
    }
}

impl<T> IntoResult<T> for StdResult<T, serde_json::Error> {
    fn into_result<F: FnOnce() -> String>(self, desc_fn: F) -> Result<T> {
        self.map_err(|e| {
            Error::with_source(ErrorKind::MalformedData, desc_fn(), e)
        })
    }
}

#[macro_export]
macro_rules! assert_eq_f32 {
    ($left:expr, $right:expr) => {
        $crate::assert_eq_f32!($left, $right, 1E-5)
    };
    ($left:expr, $right:expr, $eps:expr) => {{
        let (left, right) = ($left as f64, $right as f64);
        assert!(
            (left - right).abs() <= $eps as f64,
            "assertion failed: `(left ~= right)`\n  left: `{:?}`,\
             \n right: `{:?}`",
            left,
            right
        );
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_into_result() {
        let res: StdResult<(), IoError> =
            Err(IoError::new(std::io::ErrorKind::NotFound, "gone"));
        let err = res.res(|| "failed to open file 'a.png'".to_string());
        let err = err.unwrap_err();
        assert_eq!(err.kind, ErrorKind::IoError);
        assert_eq!(&err.description, "failed to open file 'a.png'");
        assert_eq!(err.to_string(), "failed to open file 'a.png': gone");
    }

    #[test]
    fn test_recoverable_kinds() {
        let desc = String::new();
        assert!(Error::new(ErrorKind::EstimationFailure, desc.clone())
            .is_recoverable());
        assert!(!Error::new(ErrorKind::ShapeMismatch, desc).is_recoverable());
    }
}
