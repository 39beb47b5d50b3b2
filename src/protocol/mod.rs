//! Report wire codec and tracker message catalogue

pub mod codec;
pub mod messages;

pub use codec::{MAX_ENCODED_LEN, decode, decode_kind, encode, encode_to_vec, encoded_len};
pub use messages::{MessageIds, Request, delivery_class};
