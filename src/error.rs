use thiserror::Error;

pub type Result<T> = std::result::Result<T, MelexError>;

#[derive(Debug, Error)]
pub enum MelexError {
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
    #[error("{stage} failed with status {status}")]
    Processing { stage: &'static str, status: i32 },
    #[error("failed to allocate {requested} elements")]
    Memory { requested: usize },
    #[error("resampling failed: {0}")]
    Resample(String),
    #[error("failed to decode audio: {message}")]
    Decode { message: String },
    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl MelexError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn processing(stage: &'static str, status: i32) -> Self {
        Self::Processing { stage, status }
    }

    pub(crate) fn resample(err: impl std::fmt::Display) -> Self {
        Self::Resample(err.to_string())
    }

    pub(crate) fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode {
            message: err.to_string(),
        }
    }

    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}

/// Status reported when a numeric stage meets a NaN or infinite value.
pub const STATUS_NON_FINITE: i32 = 1;

/// Zero-filled buffer whose allocation failure surfaces as [`MelexError::Memory`].
pub(crate) fn zeroed(len: usize) -> Result<Vec<f32>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| MelexError::Memory { requested: len })?;
    buf.resize(len, 0.0);
    Ok(buf)
}

/// Reserve room for `additional` more elements without aborting on failure.
pub(crate) fn reserve<T>(buf: &mut Vec<T>, additional: usize) -> Result<()> {
    buf.try_reserve(additional).map_err(|_| MelexError::Memory {
        requested: buf.len().saturating_add(additional),
    })
}
