//! Error types for sl-lua.

use std::fmt;

use thiserror::Error;

/// Classification of a recoverable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// No error.
    None,
    /// A value did not have the type the host asked for.
    TypeMismatch,
    /// A global the runtime needed could not be created or found.
    VariableDoesntExist,
    /// A global that was called is not a function.
    NotFunction,
    /// A script function raised an error while running.
    FunctionError,
    /// The script file could not be loaded or executed.
    Load,
    /// The script engine rejected a primitive operation.
    Engine,
    /// I/O failure outside the engine.
    Io,
    /// Invalid configuration.
    Config,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::None => "none",
            ErrorCode::TypeMismatch => "type mismatch",
            ErrorCode::VariableDoesntExist => "variable doesn't exist",
            ErrorCode::NotFunction => "not a function",
            ErrorCode::FunctionError => "function error",
            ErrorCode::Load => "load error",
            ErrorCode::Engine => "engine error",
            ErrorCode::Io => "I/O error",
            ErrorCode::Config => "configuration error",
        };
        f.write_str(name)
    }
}

/// Common error type for sl-lua.
#[derive(Error, Debug)]
pub enum Error {
    /// The value did not have the requested type.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// A namespace table could not be created.
    #[error("variable doesn't exist: {0}")]
    VariableDoesntExist(String),

    /// The named global exists but cannot be called, or does not exist.
    #[error("not a function: {0}")]
    NotFunction(String),

    /// A script function failed; the message is the engine's error text.
    #[error("function error: {0}")]
    FunctionError(String),

    /// Script loading failed.
    #[error("load error: {0}")]
    Load(String),

    /// Engine-level failure (allocation, invalid state).
    #[error("engine error: {0}")]
    Engine(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// The code classifying this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::TypeMismatch(_) => ErrorCode::TypeMismatch,
            Error::VariableDoesntExist(_) => ErrorCode::VariableDoesntExist,
            Error::NotFunction(_) => ErrorCode::NotFunction,
            Error::FunctionError(_) => ErrorCode::FunctionError,
            Error::Load(_) => ErrorCode::Load,
            Error::Engine(_) => ErrorCode::Engine,
            Error::Io(_) => ErrorCode::Io,
            Error::Config(_) => ErrorCode::Config,
        }
    }

    /// The message attached to this error, without the code prefix.
    pub fn message(&self) -> String {
        match self {
            Error::TypeMismatch(msg)
            | Error::VariableDoesntExist(msg)
            | Error::NotFunction(msg)
            | Error::FunctionError(msg)
            | Error::Load(msg)
            | Error::Engine(msg)
            | Error::Config(msg) => msg.clone(),
            Error::Io(e) => e.to_string(),
        }
    }
}

impl From<mlua::Error> for Error {
    fn from(e: mlua::Error) -> Self {
        Error::Engine(e.to_string())
    }
}

/// Result type alias for sl-lua operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Extract the message a script supplied when raising an error.
///
/// Errors raised by host callables arrive wrapped with a traceback; only the
/// original cause is kept.
pub(crate) fn script_message(e: &mlua::Error) -> String {
    match e {
        mlua::Error::RuntimeError(msg) | mlua::Error::SyntaxError { message: msg, .. } => {
            msg.clone()
        }
        mlua::Error::CallbackError { cause, .. } => script_message(cause),
        mlua::Error::ExternalError(inner) => inner.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mismatch_display() {
        let err = Error::TypeMismatch("expected number, found table".to_string());
        assert_eq!(err.to_string(), "type mismatch: expected number, found table");
        assert_eq!(err.code(), ErrorCode::TypeMismatch);
        assert_eq!(err.message(), "expected number, found table");
    }

    #[test]
    fn test_function_error_keeps_message() {
        let err = Error::FunctionError("test.lua:3: boom".to_string());
        assert_eq!(err.code(), ErrorCode::FunctionError);
        assert_eq!(err.message(), "test.lua:3: boom");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.code(), ErrorCode::Io);
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_mlua_error_conversion() {
        let err: Error = mlua::Error::RuntimeError("bad".to_string()).into();
        assert_eq!(err.code(), ErrorCode::Engine);
    }

    #[test]
    fn test_script_message_unwraps_callback() {
        let cause = mlua::Error::RuntimeError("inner failure".to_string());
        let wrapped = mlua::Error::CallbackError {
            traceback: "stack traceback:".to_string(),
            cause: std::sync::Arc::new(cause),
        };
        assert_eq!(script_message(&wrapped), "inner failure");
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::NotFunction.to_string(), "not a function");
        assert_eq!(ErrorCode::None.to_string(), "none");
    }

    #[test]
    fn test_result_alias() {
        fn sample_ok() -> Result<i32> {
            Ok(42)
        }

        fn sample_err() -> Result<i32> {
            Err(Error::NotFunction("Missing".to_string()))
        }

        assert_eq!(sample_ok().unwrap(), 42);
        assert!(sample_err().is_err());
    }
}
