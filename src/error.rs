use thiserror::Error;

pub type Result<T> = std::result::Result<T, VglError>;

/// Error kinds surfaced by the wrapper.
///
/// These never cross the C boundary as panics; the FFI layer converts each
/// into the neutral return documented for the entry point and logs it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VglError {
    #[error("library not initialized")]
    NotInitialized,

    #[error("no current rendering context")]
    ContextMissing,

    #[error("{resource} exhausted: requested {requested} bytes")]
    Exhausted {
        resource: &'static str,
        requested: usize,
    },

    #[error("device error 0x{code:04x}")]
    Device { code: u32 },

    #[error("corrupt {0}")]
    Corrupt(&'static str),

    #[error("fence wait timed out after {waited_ms} ms")]
    FenceTimeout { waited_ms: u64 },

    /// The underlying GLES surface lacks a required entry point or feature.
    /// Only produced while constructing a context; collapses
    /// `create_context` to failure.
    #[error("unsupported GLES surface: missing {0}")]
    Unsupported(&'static str),

    #[error("framebuffer incomplete: status 0x{0:04x}")]
    FramebufferIncomplete(u32),
}

/// Human-readable name for a `glGetError` code.
pub fn gl_error_name(code: u32) -> &'static str {
    match code {
        0 => "NO_ERROR",
        0x0500 => "INVALID_ENUM",
        0x0501 => "INVALID_VALUE",
        0x0502 => "INVALID_OPERATION",
        0x0505 => "OUT_OF_MEMORY",
        0x0506 => "INVALID_FRAMEBUFFER_OPERATION",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_error_message_carries_the_code() {
        let err = VglError::Device { code: 0x0502 };
        assert_eq!(err.to_string(), "device error 0x0502");
        assert_eq!(gl_error_name(0x0502), "INVALID_OPERATION");
    }

    #[test]
    fn unknown_codes_do_not_panic() {
        assert_eq!(gl_error_name(0x1234), "UNKNOWN");
    }
}
