mod codec;
mod hash;

pub use codec::{BlockEncoded, CodecError};
pub use hash::{ContentHash, PublicKeyHash, HASH_SIZE};
