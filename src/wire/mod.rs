//! # Wire protocol
//!
//! Versioned, length-prefixed binary framing for one message out and one
//! response byte back. Every length is checked against what's actually
//! there before anything is read, so decoding untrusted input is safe.

mod codec;
mod stream;

pub use codec::{
    decode_message, decode_response, encode_message, encode_response, try_decode_message,
    PROTOCOL_VERSION, RESPONSE_FAILURE, RESPONSE_SUCCESS,
};
pub use stream::{read_message, read_response, write_message, write_response};
