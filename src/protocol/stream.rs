//! Lazy event stream over a response body

use super::frame::{FrameDecoder, FrameError};
use super::types::StreamEvent;
use crate::api::ApiError;
use futures::stream::{self, Stream, StreamExt};
use std::collections::VecDeque;
use thiserror::Error;

/// Failure that ends an event stream early
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Transport error: {0}")]
    Transport(#[from] ApiError),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

struct Pump<S> {
    body: S,
    decoder: FrameDecoder,
    pending: VecDeque<StreamEvent>,
    done: bool,
}

/// Decode a byte stream into events, in arrival order.
///
/// The returned stream is finite and not restartable. It stops polling `body`
/// as soon as `end` is decoded, and yields at most one error, after which it
/// is exhausted.
pub fn event_stream<S>(body: S) -> impl Stream<Item = Result<StreamEvent, StreamError>> + Send
where
    S: Stream<Item = Result<Vec<u8>, ApiError>> + Send + Unpin + 'static,
{
    let pump = Pump {
        body,
        decoder: FrameDecoder::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(pump, |mut pump| async move {
        loop {
            if let Some(event) = pump.pending.pop_front() {
                return Some((Ok(event), pump));
            }
            if pump.done || pump.decoder.is_terminated() {
                return None;
            }

            match pump.body.next().await {
                Some(Ok(fragment)) => match pump.decoder.feed(&fragment) {
                    Ok(events) => pump.pending.extend(events),
                    Err(e) => {
                        pump.done = true;
                        return Some((Err(StreamError::Frame(e)), pump));
                    }
                },
                Some(Err(e)) => {
                    pump.done = true;
                    return Some((Err(StreamError::Transport(e)), pump));
                }
                None => {
                    pump.decoder.finish();
                    pump.done = true;
                }
            }
        }
    })
}
