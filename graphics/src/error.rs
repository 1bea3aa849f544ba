use std::error::Error;
use std::fmt;

/// Errors raised by the graphics layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// A shader stage failed to compile. Carries the backend's info log.
    ShaderCompilation(String),

    /// Shader stages compiled but the program failed to link.
    ProgramLink(String),

    /// The backend cannot provide a required capability.
    FeatureNotSupported(String),

    /// A caller-supplied argument is out of contract.
    InvalidParameter(String),

    /// A resource was used with a context other than the one it was
    /// first bound to.
    ContextMismatch(String),

    /// The backend failed to allocate a device object.
    ResourceCreationFailed(String),

    /// Unexpected backend state.
    Internal(String),
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphicsError::ShaderCompilation(log) => {
                write!(f, "shader compilation failed: {}", log)
            }
            GraphicsError::ProgramLink(log) => write!(f, "program link failed: {}", log),
            GraphicsError::FeatureNotSupported(what) => {
                write!(f, "feature not supported: {}", what)
            }
            GraphicsError::InvalidParameter(what) => write!(f, "invalid parameter: {}", what),
            GraphicsError::ContextMismatch(what) => write!(f, "context mismatch: {}", what),
            GraphicsError::ResourceCreationFailed(what) => {
                write!(f, "resource creation failed: {}", what)
            }
            GraphicsError::Internal(what) => write!(f, "internal graphics error: {}", what),
        }
    }
}

impl Error for GraphicsError {}
