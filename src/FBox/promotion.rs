//! Lazy fast-box promotion.
//!
//! An endpoint starts on the generic path. Every send it makes there is
//! counted, and the single send that brings the count to the configured
//! threshold tries to get a fast box: first a credit from the peer (how many
//! more fast boxes it will map), then a block from the pool. Either can fail
//! without error; the endpoint then simply stays on the generic path for the
//! rest of the run.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::Core::addr::RelativeAddr;
use crate::Core::alloc::{FboxBlock, FboxPool, PeerCredits};

/// Tells the peer where our new fast box lives. Travels in the header of a
/// generic-path message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FboxAnnouncement {
    pub base: RelativeAddr,
}

#[derive(Debug)]
pub enum PromotionOutcome {
    /// Threshold not reached on this send, or already attempted.
    NotYet,
    /// The peer will not map another fast box.
    PeerSaturated,
    /// No block left in the pool.
    PoolExhausted,
    /// This send won; the caller installs the block.
    Promoted(FboxBlock),
}

/// Per-endpoint send counter and terminal promoted flag. Safe to hit from
/// several sending threads at once: only the send whose increment lands
/// exactly on the threshold proceeds to the pool.
#[derive(Debug)]
pub struct PromotionGate {
    send_count: AtomicUsize,
    threshold: usize,
    promoted: AtomicBool,
}

impl PromotionGate {
    pub fn new(threshold: usize) -> Self {
        Self {
            send_count: AtomicUsize::new(0),
            threshold,
            promoted: AtomicBool::new(false),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn send_count(&self) -> usize {
        self.send_count.load(Ordering::Acquire)
    }

    pub fn is_promoted(&self) -> bool {
        self.promoted.load(Ordering::Acquire)
    }

    /// Count one generic-path send. Returns true for the send that reaches
    /// the threshold, and only that one.
    pub fn record_send(&self) -> bool {
        if self.is_promoted() {
            return false;
        }
        self.send_count.fetch_add(1, Ordering::AcqRel) + 1 == self.threshold
    }

    /// Count one send and, if it is the threshold send, try to promote.
    pub fn try_promote(&self, credits: &PeerCredits, pool: &dyn FboxPool) -> PromotionOutcome {
        if !self.record_send() {
            return PromotionOutcome::NotYet;
        }

        if !credits.try_take() {
            return PromotionOutcome::PeerSaturated;
        }

        match pool.acquire() {
            Some(block) => {
                self.promoted.store(true, Ordering::Release);
                PromotionOutcome::Promoted(block)
            }
            None => {
                credits.give_back();
                PromotionOutcome::PoolExhausted
            }
        }
    }
}
