mod builder;
mod consumer;
mod context;
mod producer;

pub mod dispatch;
pub mod endpoint;
pub mod overwrite;
pub mod promotion;
pub mod reliable;

pub use builder::{FboxConfig, FboxConfigBuilder, FboxPolicy};
pub use consumer::PollStatus;
pub use context::FboxContext;
pub use dispatch::{Delivery, DispatchTable, EndpointId, GenericPath};
pub use producer::SendPath;
pub use promotion::{FboxAnnouncement, PromotionGate, PromotionOutcome};

pub mod Buffer {
    pub mod Buffer;
    pub mod Buffer_impl;
    pub mod Header;
    pub mod layout;
    pub use Buffer::FboxBuffer; // re-export for stable path
    pub use Header::{FboxHeader, FenceMode, HeaderSlot};
}
