//! Companion app wire protocol
//!
//! Inbound frames are JSON objects discriminated by `type` ("state", "update");
//! outbound commands are `"set"` frames. Decoding is pure and stateless.

mod codec;
mod types;

pub use codec::{decode, decode_value, encode, CodecError};
pub use types::{BusPayload, Command, Envelope, StatePayload, StripPayload, Target, UpdatePayload};
