// Send side of the fast path: try the fast box, fall back to the generic
// path, and promote the endpoint once it has sent enough.

use std::ptr::NonNull;

use log::{debug, info, warn};

use crate::error::{FboxError, Result};
use crate::Core::addr::RelativeAddr;
use crate::FBox::builder::FboxPolicy;
use crate::FBox::context::FboxContext;
use crate::FBox::dispatch::{is_user_tag, EndpointId};
use crate::FBox::endpoint::{FboxWriter, Outbound};
use crate::FBox::overwrite::OverwriteWriter;
use crate::FBox::promotion::{FboxAnnouncement, PromotionOutcome};
use crate::FBox::reliable::ReliableWriter;
use crate::FBox::Buffer::layout::TAG_FRAG;
use crate::FBox::Buffer::FboxBuffer;

/// Which way a message went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPath {
    /// Written into the endpoint's fast box.
    Fast,
    /// Handed to the generic path. `announced` is true when this send also
    /// carried the announcement of a freshly promoted fast box.
    Generic { announced: bool },
}

impl FboxContext {
    /// Send `header || payload` with `tag` to `endpoint`.
    ///
    /// Never blocks. The fast box is tried first; a message it declines (no
    /// box yet, too large, or reliable ring full) goes to the generic path.
    pub fn send(
        &mut self,
        endpoint: EndpointId,
        tag: u16,
        header: &[u8],
        payload: &[u8],
    ) -> Result<SendPath> {
        if !is_user_tag(tag) {
            return Err(FboxError::InvalidTag(tag));
        }

        let ep = self.endpoint_mut(endpoint)?;
        if let Some(outbound) = ep.outbound.as_mut() {
            if outbound.writer.write(tag, header, payload) {
                return Ok(SendPath::Fast);
            }
            debug!(
                "fast box to endpoint {} declined {} bytes, using generic path",
                endpoint,
                header.len() + payload.len()
            );
        }

        let announcement = self.try_fbox_setup(endpoint)?;
        self.generic
            .send(endpoint, tag, header, payload, announcement)?;

        Ok(SendPath::Generic {
            announced: announcement.is_some(),
        })
    }

    /// Put a relocatable pointer to a generic-path fragment into the fast
    /// box. Returns false when there is no fast box or it has no room; the
    /// caller then queues the fragment itself.
    pub fn send_escape(&mut self, endpoint: EndpointId, frag: RelativeAddr) -> Result<bool> {
        let ep = self.endpoint_mut(endpoint)?;
        Ok(match ep.outbound.as_mut() {
            Some(outbound) => outbound
                .writer
                .write(TAG_FRAG, &frag.to_bits().to_ne_bytes(), &[]),
            None => false,
        })
    }

    /// Count a generic-path send and promote the endpoint if this is the
    /// threshold send. Returns the announcement to piggyback on that send.
    fn try_fbox_setup(&mut self, endpoint: EndpointId) -> Result<Option<FboxAnnouncement>> {
        let fbox_size = self.config.fbox_size;
        let policy = self.config.policy;
        let (slots, slot_size) = (self.config.overwrite_slots, self.config.overwrite_slot_size);
        let pool = self.pool.clone();
        let translator = self.translator.clone();

        let ep = self.endpoint_mut(endpoint)?;
        if ep.outbound.is_some() {
            return Ok(None);
        }

        let block = match ep.gate.try_promote(&ep.credits, &*pool) {
            PromotionOutcome::NotYet => return Ok(None),
            PromotionOutcome::PeerSaturated => {
                debug!("endpoint {} peer accepts no more fast boxes", endpoint);
                return Ok(None);
            }
            PromotionOutcome::PoolExhausted => {
                warn!("fast-box pool exhausted, endpoint {} stays on the generic path", endpoint);
                return Ok(None);
            }
            PromotionOutcome::Promoted(block) => block,
        };

        let Some(base) = translator.to_relocatable(block.as_ptr()) else {
            let local = block.as_ptr() as u64;
            pool.release(block);
            ep.credits.give_back();
            return Err(FboxError::BadRelativeAddress(local));
        };

        // block pointers come from the pool and are never null
        let buffer = unsafe { FboxBuffer::new(NonNull::new_unchecked(block.as_ptr()), fbox_size) };
        buffer.zero();

        let writer = match policy {
            FboxPolicy::Reliable => FboxWriter::Reliable(ReliableWriter::new(buffer)),
            FboxPolicy::Overwrite => FboxWriter::Overwrite(OverwriteWriter::new(buffer, slots, slot_size)),
        };
        ep.outbound = Some(Outbound { block, writer });

        info!(
            "endpoint {} promoted to a {:?} fast box at {:?} after {} sends",
            endpoint,
            policy,
            base,
            ep.gate.send_count()
        );

        Ok(Some(FboxAnnouncement { base }))
    }

    /// Teardown hook: give the outbound fast box back to the pool and return
    /// the peer's credit. Returns false when the endpoint had none.
    pub fn release_fbox(&mut self, endpoint: EndpointId) -> Result<bool> {
        let pool = self.pool.clone();
        let ep = self.endpoint_mut(endpoint)?;
        match ep.outbound.take() {
            Some(outbound) => {
                pool.release(outbound.block);
                ep.credits.give_back();
                debug!("endpoint {} released its fast box", endpoint);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
