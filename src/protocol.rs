//! Wire protocol of the companion chat service
//!
//! The send endpoint answers with a line-delimited event stream. Each frame is
//! a `data: {json}` line whose `type` field selects the event kind.

pub mod frame;
pub mod stream;
pub mod types;

pub use frame::{FrameDecoder, FrameError, EVENT_MARKER, MAX_FRAME_BYTES};
pub use stream::{event_stream, StreamError};
pub use types::{
    ActiveConversation, ClearResponse, MetadataPayload, Phase, SendRequest, StreamEvent,
};
