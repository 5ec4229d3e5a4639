use super::PoolPos;

#[derive(Clone, Copy, Default)]
struct Slot {
    pins: u32,
    referenced: bool,
}

/// Picks which cached block gets replaced next, using the clock (second chance) policy.
/// A buffer is a candidate only while nobody has it pinned.
pub(in crate::buffer) struct ClockReplacer {
    hand: PoolPos,
    unpinned: usize,
    slots: Vec<Slot>,
}

impl ClockReplacer {
    pub fn new(pool_size: usize) -> Self {
        Self {
            hand: 0,
            unpinned: pool_size,
            slots: vec![Slot::default(); pool_size],
        }
    }

    pub fn pin(&mut self, pool_pos: PoolPos) {
        let slot = &mut self.slots[pool_pos];
        if slot.pins == 0 {
            self.unpinned -= 1;
        }
        slot.pins += 1;
        slot.referenced = true;
    }

    pub fn unpin(&mut self, pool_pos: PoolPos) {
        let slot = &mut self.slots[pool_pos];
        debug_assert!(slot.pins > 0, "unpinned buffer {pool_pos} more often than pinned");
        slot.pins -= 1;
        if slot.pins == 0 {
            self.unpinned += 1;
        }
    }

    /// Returns None if every buffer is pinned. Otherwise sweeps the hand around the pool,
    /// clearing reference bits, until it meets an unpinned buffer that was not referenced recently.
    pub fn find_free_buffer(&mut self) -> Option<PoolPos> {
        if self.unpinned == 0 {
            return None;
        }
        loop {
            let pool_pos = self.hand;
            self.hand = (self.hand + 1) % self.slots.len();
            let slot = &mut self.slots[pool_pos];
            if slot.pins > 0 {
                continue;
            }
            if slot.referenced {
                slot.referenced = false;
            } else {
                return Some(pool_pos);
            }
        }
    }
}

#[cfg(test)]
mod tests {

    use super::ClockReplacer;

    #[test]
    fn pinned_buffers_are_never_replaced() {
        let mut replacer = ClockReplacer::new(2);
        replacer.pin(0);
        replacer.pin(1);
        assert!(replacer.find_free_buffer().is_none());

        replacer.pin(1);
        replacer.unpin(1);
        assert!(
            replacer.find_free_buffer().is_none(),
            "buffer 1 is still pinned once"
        );

        replacer.unpin(1);
        assert_eq!(replacer.find_free_buffer(), Some(1));
    }

    #[test]
    fn fresh_pool_hands_out_buffers_in_order() {
        let mut replacer = ClockReplacer::new(3);
        assert_eq!(replacer.find_free_buffer(), Some(0));
        assert_eq!(replacer.find_free_buffer(), Some(1));
        assert_eq!(replacer.find_free_buffer(), Some(2));
        assert_eq!(replacer.find_free_buffer(), Some(0));
    }

    #[test]
    fn recently_used_buffers_get_a_second_chance() {
        let mut replacer = ClockReplacer::new(3);
        for pos in 0..3 {
            replacer.pin(pos);
            replacer.unpin(pos);
        }
        // every reference bit is set, the first sweep clears them all
        assert_eq!(replacer.find_free_buffer(), Some(0));

        replacer.pin(1);
        replacer.unpin(1);
        assert_eq!(replacer.find_free_buffer(), Some(2));
        assert_eq!(replacer.find_free_buffer(), Some(0));
        assert_eq!(replacer.find_free_buffer(), Some(1));
    }
}
