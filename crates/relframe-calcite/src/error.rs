use relframe_ir::IrError;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// A construct the compiler does not handle
    #[error("Unsupported operation in {node}: {message}")]
    UnsupportedOperation { node: &'static str, message: String },

    /// A structural precondition violated by the caller
    #[error("Invalid plan at {node}: {message}")]
    InvalidPlan { node: &'static str, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Ir(#[from] IrError),
}

impl CompileError {
    pub(crate) fn unsupported(node: &'static str, message: impl Into<String>) -> Self {
        CompileError::UnsupportedOperation {
            node,
            message: message.into(),
        }
    }

    pub(crate) fn invalid(node: &'static str, message: impl Into<String>) -> Self {
        CompileError::InvalidPlan {
            node,
            message: message.into(),
        }
    }
}
