#[allow(non_snake_case)]
pub mod Core {
    pub mod SharedMemory;
    pub use SharedMemory::{
        attach_shared_memory, create_anonymous_shared_memory, create_shared_memory, RawHandle,
        SharedMemoryBackend,
    };
    pub mod addr;
    pub use addr::{AddressTranslator, RelativeAddr, SegmentTable};
    pub mod alloc;
    pub use alloc::{FboxBlock, FboxPool, PeerCredits, ShmFboxPool};
}
#[allow(non_snake_case)]
pub mod FBox;
#[allow(non_snake_case)]
pub mod Debug {
    pub mod StructDebug;
}
pub mod error;
pub mod ffi;

pub use error::{FboxError, Result};
pub use FBox::{FboxConfig, FboxContext, FboxPolicy, PollStatus, SendPath};
