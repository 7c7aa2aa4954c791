// Receive side of the fast path: map a peer's fast box when it is announced,
// and poll every mapped box for new records.

use std::ptr::NonNull;

use log::debug;

use crate::error::{FboxError, Result};
use crate::Core::addr::RelativeAddr;
use crate::FBox::builder::FboxPolicy;
use crate::FBox::context::FboxContext;
use crate::FBox::dispatch::{DispatchBridge, Dispatched, EndpointId};
use crate::FBox::endpoint::FboxReader;
use crate::FBox::overwrite::OverwriteReader;
use crate::FBox::reliable::ReliableReader;
use crate::FBox::Buffer::FboxBuffer;

/// What one `poll` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStatus {
    /// Records consumed, skip markers included.
    pub records: u32,
    /// Messages handed to a registered handler.
    pub delivered: u32,
    /// Escape records forwarded to the generic path.
    pub forwarded: u32,
    /// Messages with no registered handler.
    pub unhandled: u32,
    /// Overwrite policy only: messages overwritten before they were read.
    pub dropped: u64,
}

impl PollStatus {
    /// Did this poll consume anything?
    pub fn processed(&self) -> bool {
        self.records > 0
    }

    fn count(&mut self, how: Dispatched) {
        match how {
            Dispatched::Delivered => self.delivered += 1,
            Dispatched::Forwarded => self.forwarded += 1,
            Dispatched::Unhandled => self.unhandled += 1,
        }
    }
}

impl FboxContext {
    /// Map the fast box `base` that the peer behind `endpoint` announced.
    pub fn setup_fbox_recv(&mut self, endpoint: EndpointId, base: RelativeAddr) -> Result<()> {
        let fbox_size = self.config.fbox_size;
        let last = RelativeAddr::new(base.segment(), base.offset().wrapping_add(fbox_size - 1));

        let local = self
            .translator
            .to_local(base)
            .and_then(NonNull::new)
            .ok_or(FboxError::BadRelativeAddress(base.to_bits()))?;
        if base.offset().checked_add(fbox_size - 1).is_none() || self.translator.to_local(last).is_none() {
            return Err(FboxError::BadRelativeAddress(base.to_bits()));
        }

        let reader = {
            // the whole box resolved inside one mapped segment above
            let buffer = unsafe { FboxBuffer::new(local, fbox_size) };
            match self.config.policy {
                FboxPolicy::Reliable => FboxReader::Reliable(ReliableReader::new(buffer)),
                FboxPolicy::Overwrite => FboxReader::Overwrite(OverwriteReader::new(
                    buffer,
                    self.config.overwrite_slots,
                    self.config.overwrite_slot_size,
                    self.config.overwrite_fences,
                )),
            }
        };

        let ep = self.endpoint_mut(endpoint)?;
        if ep.inbound.is_some() {
            return Err(FboxError::AlreadyMapped(endpoint.0));
        }
        ep.inbound = Some(reader);
        self.fbox_in_endpoints.push(endpoint);

        debug!("endpoint {} receives through fast box at {:?}", endpoint, base);
        Ok(())
    }

    /// Poll every endpoint with an inbound fast box once.
    ///
    /// Reliable boxes yield up to `poll_count + 1` records per endpoint,
    /// overwrite boxes at most one. Handlers run synchronously, one at a time.
    pub fn poll(&mut self) -> Result<PollStatus> {
        let mut status = PollStatus::default();
        let poll_count = self.config.poll_count;
        let bridge = DispatchBridge {
            table: &self.table,
            translator: &*self.translator,
            generic: &*self.generic,
        };

        for &id in &self.fbox_in_endpoints {
            let Some(reader) = self.endpoints[id.0].inbound.as_mut() else {
                continue;
            };

            match reader {
                FboxReader::Reliable(r) => {
                    let consumed = r.poll(poll_count, |record| {
                        status.count(bridge.dispatch(id, record)?);
                        Ok(())
                    })?;
                    status.records += consumed;
                }
                FboxReader::Overwrite(r) => {
                    let mut how = None;
                    let read = r.poll(|record| {
                        how = Some(bridge.dispatch(id, record)?);
                        Ok(())
                    })?;
                    if let Some(dropped) = read {
                        status.records += 1;
                        status.dropped += dropped as u64;
                    }
                    if let Some(how) = how {
                        status.count(how);
                    }
                }
            }
        }

        Ok(status)
    }
}
