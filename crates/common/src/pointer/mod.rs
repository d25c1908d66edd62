mod memory;
mod provider;
mod record;

pub use memory::MemoryPointerProvider;
pub use provider::{PointerError, PointerProvider};
pub use record::{HashCasPair, SignedCasRecord};
