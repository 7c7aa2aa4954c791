use crate::error::{FboxError, Result};
use crate::FBox::Buffer::layout::{
    FBOX_ALIGNMENT, FBOX_OFFSET_MASK, HEADER_SIZE, OVERWRITE_SLOTS, OVERWRITE_SLOT_SIZE, POLL_COUNT,
};
use crate::FBox::Buffer::Header::FenceMode;

/// What happens when the reader cannot keep up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FboxPolicy {
    /// Append ring with backpressure: no loss, strict order, sends are
    /// declined (generic path) when the ring is full.
    #[default]
    Reliable,
    /// Fixed slots indexed by sequence: sends never fail or wait, unread
    /// messages are overwritten.
    Overwrite,
}

/// Process-wide fast-box settings, fixed for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FboxConfig {
    pub fbox_size: u32,
    pub fbox_threshold: usize,
    pub fbox_max: i32,
    pub policy: FboxPolicy,
    pub poll_count: u32,
    pub overwrite_slots: u32,
    pub overwrite_slot_size: u32,
    pub overwrite_fences: FenceMode,
}

impl Default for FboxConfig {
    fn default() -> Self {
        Self {
            fbox_size: 4096,
            fbox_threshold: 16,
            fbox_max: 32,
            policy: FboxPolicy::Reliable,
            poll_count: POLL_COUNT,
            overwrite_slots: OVERWRITE_SLOTS,
            overwrite_slot_size: OVERWRITE_SLOT_SIZE,
            overwrite_fences: FenceMode::Relaxed,
        }
    }
}

impl FboxConfig {
    pub fn builder() -> FboxConfigBuilder {
        FboxConfigBuilder::new()
    }

    /// Largest header+payload a reliable send may carry.
    pub fn reliable_max_message(&self) -> u32 {
        self.fbox_size >> 2
    }

    /// Largest header+payload an overwrite slot holds.
    pub fn overwrite_max_message(&self) -> u32 {
        self.overwrite_slot_size - HEADER_SIZE
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(FboxError::InvalidConfig(msg));

        if self.fbox_size % FBOX_ALIGNMENT != 0 || self.fbox_size < 4 * FBOX_ALIGNMENT {
            return invalid(format!(
                "fbox_size {} must be a multiple of {} and at least {}",
                self.fbox_size,
                FBOX_ALIGNMENT,
                4 * FBOX_ALIGNMENT
            ));
        }
        if self.fbox_size > FBOX_OFFSET_MASK {
            return invalid(format!("fbox_size {} collides with the wrap flag", self.fbox_size));
        }
        // every record spans at least one alignment unit; a full ring must hold
        // fewer records than half the u16 sequence space or stale headers look new
        let reliable_limit = FBOX_ALIGNMENT + i16::MAX as u32 * FBOX_ALIGNMENT;
        if self.policy == FboxPolicy::Reliable && self.fbox_size > reliable_limit {
            return invalid(format!(
                "reliable fbox_size {} exceeds {} (sequence numbers would alias)",
                self.fbox_size, reliable_limit
            ));
        }
        if self.fbox_threshold == 0 {
            return invalid("fbox_threshold must be at least 1".into());
        }
        if self.fbox_max < 0 {
            return invalid(format!("fbox_max {} is negative", self.fbox_max));
        }

        if self.policy == FboxPolicy::Overwrite {
            let slots = self.overwrite_slots;
            // slot index is seq % slots; it must stay continuous across the u16 wrap
            if slots == 0 || !slots.is_power_of_two() || slots > 1 << 16 {
                return invalid(format!("overwrite_slots {} must be a power of two up to 65536", slots));
            }
            if self.overwrite_slot_size <= HEADER_SIZE || self.overwrite_slot_size % 8 != 0 {
                return invalid(format!(
                    "overwrite_slot_size {} must be a multiple of 8 larger than the header",
                    self.overwrite_slot_size
                ));
            }
            let needed = FBOX_ALIGNMENT as u64 + slots as u64 * self.overwrite_slot_size as u64;
            if needed > self.fbox_size as u64 {
                return invalid(format!(
                    "{} slots of {} bytes do not fit in a {} byte fast box",
                    slots, self.overwrite_slot_size, self.fbox_size
                ));
            }
        }

        Ok(())
    }
}

/// Consuming builder for `FboxConfig`.
pub struct FboxConfigBuilder {
    config: FboxConfig,
}

impl Default for FboxConfigBuilder {
    fn default() -> Self {
        Self {
            config: FboxConfig::default(),
        }
    }
}

impl FboxConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fbox_size(mut self, size: u32) -> Self {
        self.config.fbox_size = size;
        self
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.config.fbox_threshold = threshold;
        self
    }

    pub fn with_fbox_max(mut self, max: i32) -> Self {
        self.config.fbox_max = max;
        self
    }

    pub fn with_policy(mut self, policy: FboxPolicy) -> Self {
        self.config.policy = policy;
        self
    }

    pub fn with_poll_count(mut self, poll_count: u32) -> Self {
        self.config.poll_count = poll_count;
        self
    }

    pub fn with_overwrite_slots(mut self, slots: u32, slot_size: u32) -> Self {
        self.config.overwrite_slots = slots;
        self.config.overwrite_slot_size = slot_size;
        self
    }

    pub fn with_overwrite_fences(mut self, fences: FenceMode) -> Self {
        self.config.overwrite_fences = fences;
        self
    }

    pub fn build(self) -> Result<FboxConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(FboxConfig::default().validate().is_ok());
        assert!(FboxConfig::builder()
            .with_policy(FboxPolicy::Overwrite)
            .build()
            .is_ok());
    }

    #[test]
    fn rejects_unaligned_size() {
        assert!(matches!(
            FboxConfig::builder().with_fbox_size(4000).build(),
            Err(FboxError::InvalidConfig(_))
        ));
    }

    #[test]
    fn reliable_size_is_capped_by_the_sequence_space() {
        assert!(FboxConfig::builder().with_fbox_size(1 << 20).build().is_ok());
        assert!(matches!(
            FboxConfig::builder().with_fbox_size((1 << 20) + FBOX_ALIGNMENT).build(),
            Err(FboxError::InvalidConfig(_))
        ));
        assert!(matches!(
            FboxConfig::builder().with_fbox_size(2 << 20).build(),
            Err(FboxError::InvalidConfig(_))
        ));
        // slots are addressed by sequence, so the overwrite ring has no such cap
        assert!(FboxConfig::builder()
            .with_fbox_size(2 << 20)
            .with_policy(FboxPolicy::Overwrite)
            .build()
            .is_ok());
    }

    #[test]
    fn rejects_slots_that_do_not_divide_the_sequence_space() {
        assert!(FboxConfig::builder()
            .with_policy(FboxPolicy::Overwrite)
            .with_overwrite_slots(3, 32)
            .build()
            .is_err());
    }

    #[test]
    fn rejects_slots_larger_than_the_box() {
        assert!(FboxConfig::builder()
            .with_fbox_size(256)
            .with_policy(FboxPolicy::Overwrite)
            .with_overwrite_slots(8, 64)
            .build()
            .is_err());
    }
}
