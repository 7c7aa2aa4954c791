use super::*;
use std::fmt;

// Debug proxy implementations that call the standalone debug functions
impl fmt::Debug for ShmFboxPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_fbox_pool(self, f)
    }
}

impl fmt::Debug for FboxBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_fbox_block(self, f)
    }
}

impl fmt::Debug for PeerCredits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerCredits")
            .field("available", &self.available())
            .finish()
    }
}

impl fmt::Debug for crate::FBox::Buffer::FboxBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_fbox_buffer(self, f)
    }
}

impl fmt::Debug for crate::FBox::endpoint::Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_endpoint(self, f)
    }
}
