//! Anti-replay window for inbound records

const WINDOW_SIZE: u64 = 64;

/// Sliding window over the last 64 record sequence numbers of one epoch.
///
/// Bit `i` of `bitmap` marks `highest - i` as seen.
#[derive(Debug, Clone, Default)]
pub struct ReplayWindow {
    highest: Option<u64>,
    bitmap: u64,
}

impl ReplayWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `seq` would be rejected as a duplicate or as too old.
    pub fn is_replay(&self, seq: u64) -> bool {
        let Some(highest) = self.highest else {
            return false;
        };
        if seq > highest {
            return false;
        }
        let offset = highest - seq;
        offset >= WINDOW_SIZE || self.bitmap & (1u64 << offset) != 0
    }

    /// Records `seq` as seen. Call only after the record authenticated.
    pub fn mark(&mut self, seq: u64) {
        match self.highest {
            None => {
                self.highest = Some(seq);
                self.bitmap = 1;
            }
            Some(highest) if seq > highest => {
                let shift = seq - highest;
                self.bitmap = if shift >= WINDOW_SIZE {
                    0
                } else {
                    self.bitmap << shift
                };
                self.bitmap |= 1;
                self.highest = Some(seq);
            }
            Some(highest) => {
                let offset = highest - seq;
                if offset < WINDOW_SIZE {
                    self.bitmap |= 1u64 << offset;
                }
            }
        }
    }

    /// Returns true if `seq` is fresh, marking it as seen.
    pub fn check_and_update(&mut self, seq: u64) -> bool {
        if self.is_replay(seq) {
            return false;
        }
        self.mark(seq);
        true
    }

    /// Forgets everything; used when the read epoch changes.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
