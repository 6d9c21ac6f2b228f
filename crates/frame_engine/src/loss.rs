//! Modulo sequence loss estimation.
//!
//! Runs beside the assembler on every accepted packet and never influences
//! framing. Small forward gaps are counted as lost packets; anything larger
//! is treated as corruption and the estimator re-anchors.

/// Largest forward gap still attributed to packet loss
pub const DEFAULT_MAX_PLAUSIBLE_GAP: u8 = 4;

/// 丢包估计统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LossStats {
    /// 观测到的包数
    pub packets_observed: u64,
    /// 估计丢失的包数
    pub estimated_lost: u64,
    /// 重复包数
    pub duplicates: u64,
    /// 因跳变过大而重新锚定的次数
    pub resyncs: u64,
}

/// Sequence-gap loss estimator
#[derive(Debug)]
pub struct LossEstimator {
    frame_size: u16,
    max_gap: u16,
    expected: Option<u16>,
    stats: LossStats,
}

impl LossEstimator {
    pub fn new(frame_size: usize) -> Self {
        Self::with_max_gap(frame_size, DEFAULT_MAX_PLAUSIBLE_GAP)
    }

    pub fn with_max_gap(frame_size: usize, max_gap: u8) -> Self {
        Self {
            frame_size: frame_size.clamp(1, 256) as u16,
            max_gap: u16::from(max_gap),
            expected: None,
            stats: LossStats::default(),
        }
    }

    /// Observe the sequence of an accepted packet.
    ///
    /// Returns the number of packets estimated lost before this one.
    pub fn observe(&mut self, sequence: u8) -> u64 {
        self.stats.packets_observed += 1;
        let seq = u16::from(sequence) % self.frame_size;

        let Some(expected) = self.expected else {
            self.expected = Some(self.next(seq));
            return 0;
        };

        let gap = (seq + self.frame_size - expected) % self.frame_size;
        if gap == 0 {
            self.expected = Some(self.next(seq));
            0
        } else if self.frame_size > 1 && gap == self.frame_size - 1 {
            // repeat of the previous sequence
            self.stats.duplicates += 1;
            0
        } else if gap <= self.max_gap {
            self.stats.estimated_lost += u64::from(gap);
            self.expected = Some(self.next(seq));
            u64::from(gap)
        } else {
            self.stats.resyncs += 1;
            self.expected = None;
            0
        }
    }

    pub fn stats(&self) -> LossStats {
        self.stats
    }

    fn next(&self, seq: u16) -> u16 {
        (seq + 1) % self.frame_size
    }
}
