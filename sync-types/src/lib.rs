//! # focus-sync-types
//!
//! Wire format and identity types shared by every focus-sync crate:
//! - [`DeviceId`], [`DeviceClass`], [`DeviceRecord`], [`SessionId`] - device identity
//! - [`TimerStateMessage`], [`SessionCompleteEvent`], [`WireMessage`] - wire messages
//! - [`encode_frame`], [`FrameDecoder`] - length-prefixed TCP framing
//! - [`DeviceIdentity`] - stable per-device identity with durable persistence

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod frame;
mod identity;
mod ids;
mod messages;

pub use error::{CodecError, FrameError, IdentityError};
pub use frame::{encode_frame, FrameDecoder, MAX_FRAME_SIZE};
pub use identity::DeviceIdentity;
pub use ids::{DeviceClass, DeviceId, DeviceRecord, SessionId};
pub use messages::{
    unix_now_seconds, Phase, SessionCompleteEvent, StopReason, TimerStateMessage, WireMessage,
};
