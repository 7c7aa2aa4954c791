//! Dispatch bridge: hands decoded records to tag handlers, or forwards escape
//! records to the generic path.

use std::fmt;
use std::ptr::NonNull;

use log::warn;

use crate::error::{FboxError, Result};
use crate::Core::addr::{AddressTranslator, RelativeAddr};
use crate::FBox::Buffer::layout::{TAG_FRAG, TAG_INVALID};
use crate::FBox::promotion::FboxAnnouncement;

/// Index of an endpoint inside its `FboxContext`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(pub usize);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One record read out of a fast box. `payload` stays valid only for the
/// duration of the callback it is passed to.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    pub tag: u16,
    pub seq: u16,
    pub payload: &'a [u8],
}

/// What a handler gets: one contiguous segment.
#[derive(Debug, Clone, Copy)]
pub struct Delivery<'a> {
    pub endpoint: EndpointId,
    pub tag: u16,
    pub seq: u16,
    pub segment: &'a [u8],
}

pub type Handler = Box<dyn Fn(&Delivery<'_>) + Send + Sync>;

/// Number of entries in the tag table.
pub const TAG_TABLE_SIZE: usize = 256;

/// Can `tag` be sent as an ordinary message?
#[inline]
pub const fn is_user_tag(tag: u16) -> bool {
    tag != TAG_INVALID && tag < TAG_FRAG
}

/// Tag-indexed handler table.
pub struct DispatchTable {
    handlers: Vec<Option<Handler>>,
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self {
            handlers: (0..TAG_TABLE_SIZE).map(|_| None).collect(),
        }
    }
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` for `tag`, replacing any previous one.
    pub fn register<F>(&mut self, tag: u16, handler: F) -> Result<()>
    where
        F: Fn(&Delivery<'_>) + Send + Sync + 'static,
    {
        if !is_user_tag(tag) {
            return Err(FboxError::InvalidTag(tag));
        }
        self.handlers[tag as usize] = Some(Box::new(handler));
        Ok(())
    }

    pub fn unregister(&mut self, tag: u16) -> bool {
        self.handlers
            .get_mut(tag as usize)
            .and_then(Option::take)
            .is_some()
    }

    pub fn lookup(&self, tag: u16) -> Option<&Handler> {
        self.handlers.get(tag as usize).and_then(Option::as_ref)
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: Vec<usize> = self
            .handlers
            .iter()
            .enumerate()
            .filter_map(|(tag, h)| h.as_ref().map(|_| tag))
            .collect();
        f.debug_struct("DispatchTable")
            .field("registered", &registered)
            .finish()
    }
}

/// The queued, fragmenting message path this fast path sits in front of.
pub trait GenericPath: Send + Sync {
    /// Carry a message the fast path declined. `announcement` is set when this
    /// send promoted the endpoint; the peer must map the new fast box.
    fn send(
        &self,
        endpoint: EndpointId,
        tag: u16,
        header: &[u8],
        payload: &[u8],
        announcement: Option<FboxAnnouncement>,
    ) -> Result<()>;

    /// Process a fragment descriptor referenced from a fast box.
    fn handle_frag(&self, endpoint: EndpointId, frag: NonNull<u8>, addr: RelativeAddr) -> Result<()>;
}

/// How a record left the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Delivered,
    Forwarded,
    /// Normal tag with nothing registered; the message is dropped.
    Unhandled,
}

pub struct DispatchBridge<'a> {
    pub table: &'a DispatchTable,
    pub translator: &'a dyn AddressTranslator,
    pub generic: &'a dyn GenericPath,
}

impl DispatchBridge<'_> {
    /// Deliver one record. Handlers run to completion before this returns.
    pub fn dispatch(&self, endpoint: EndpointId, record: Record<'_>) -> Result<Dispatched> {
        if record.tag == TAG_FRAG {
            let bytes: [u8; 8] = record
                .payload
                .get(..8)
                .and_then(|b| b.try_into().ok())
                .ok_or(FboxError::Corrupt {
                    offset: 0,
                    size: record.payload.len() as u32,
                    capacity: 8,
                })?;
            let addr = RelativeAddr::from_bits(u64::from_ne_bytes(bytes));
            let local = self
                .translator
                .to_local(addr)
                .and_then(NonNull::new)
                .ok_or(FboxError::BadRelativeAddress(addr.to_bits()))?;
            self.generic.handle_frag(endpoint, local, addr)?;
            return Ok(Dispatched::Forwarded);
        }

        match self.table.lookup(record.tag) {
            Some(handler) => {
                handler(&Delivery {
                    endpoint,
                    tag: record.tag,
                    seq: record.seq,
                    segment: record.payload,
                });
                Ok(Dispatched::Delivered)
            }
            None => {
                warn!(
                    "dropping fast-box message from endpoint {} with unregistered tag {}",
                    endpoint, record.tag
                );
                Ok(Dispatched::Unhandled)
            }
        }
    }
}
