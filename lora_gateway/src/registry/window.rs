// registry/window.rs: per-device duplicate-suppression ring
//
// A membership test over the last DEDUP_WINDOW accepted sequence numbers.
// It is not an ordered comparison: an old number still in the ring reads as a
// duplicate, and a retransmission older than the ring is accepted again.

pub const DEDUP_WINDOW: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeqWindow {
    slots: [Option<u16>; DEDUP_WINDOW],
    next: usize,
}

impl Default for SeqWindow {
    fn default() -> Self {
        Self { slots: [None; DEDUP_WINDOW], next: 0 }
    }
}

impl SeqWindow {
    /// Overwrites the oldest slot.
    pub fn push(&mut self, seq: u16) {
        self.slots[self.next] = Some(seq);
        self.next = (self.next + 1) % DEDUP_WINDOW;
    }

    pub fn contains(&self, seq: u16) -> bool {
        self.slots.contains(&Some(seq))
    }

    pub fn clear(&mut self) {
        self.slots = [None; DEDUP_WINDOW];
        self.next = 0;
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}
