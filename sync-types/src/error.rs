//! Error types shared across focus-sync crates.

use thiserror::Error;

/// Errors produced by the length-prefixed framing layer.
///
/// An incomplete frame is not an error - the decoder just waits for
/// more bytes. Only a declared length beyond [`MAX_FRAME_SIZE`]
/// (a corrupt or hostile stream) is fatal to the connection.
///
/// [`MAX_FRAME_SIZE`]: crate::MAX_FRAME_SIZE
#[derive(Debug, Error)]
pub enum FrameError {
    /// Declared frame length exceeds the maximum.
    #[error("frame too large: {size} > {max}")]
    TooLarge {
        /// Declared payload length.
        size: usize,
        /// Maximum allowed payload length.
        max: usize,
    },
}

/// Errors produced while encoding or decoding wire messages.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON encoding failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// JSON decoding failed.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// A `type` discriminator this version does not understand.
    #[error("unknown message type: {0}")]
    UnknownType(String),
}

/// Errors produced by device identity persistence.
///
/// These never surface from [`DeviceIdentity::load_or_create`], which
/// degrades to a process-lifetime id instead; they exist for the
/// lower-level read/write helpers.
///
/// [`DeviceIdentity::load_or_create`]: crate::DeviceIdentity::load_or_create
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Reading or writing the identity file failed.
    #[error("identity storage: {0}")]
    Io(#[from] std::io::Error),

    /// The stored identity file is not valid.
    #[error("stored identity invalid: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_error_display() {
        let err = FrameError::TooLarge {
            size: 2_000_000,
            max: 1_048_576,
        };
        assert_eq!(err.to_string(), "frame too large: 2000000 > 1048576");
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FrameError>();
        assert_send_sync::<CodecError>();
        assert_send_sync::<IdentityError>();
    }
}
