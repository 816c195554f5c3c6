//! Length-prefixed framing for bonded links.
//!
//! Every chunk crossing a link is framed as a 4-byte little-endian payload
//! length followed by the payload itself. There is no magic, no channel and
//! no sequence number: ordering is recovered by visiting links in a fixed
//! cyclic order, so the codec only has to guarantee that a frame is read
//! whole or not at all.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_length, encode_frame, Frame, FrameConfig, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::{read_exact_or_closed, FrameReader};
pub use writer::FrameWriter;
