//! Read/write role assignment over two interchangeable resources.

/// Two owned resources and the index of the one currently read from.
///
/// The write index is always the other slot, so the two roles can never
/// name the same resource. [`RoleBuffer::swap`] exchanges the roles without
/// touching the resources.
#[derive(Debug)]
pub struct RoleBuffer<T> {
    slots: [T; 2],
    read: usize,
    swaps: u64,
}

impl<T> RoleBuffer<T> {
    /// Slot 0 starts as the read side.
    pub const fn new(first: T, second: T) -> Self {
        Self {
            slots: [first, second],
            read: 0,
            swaps: 0,
        }
    }

    pub const fn read_index(&self) -> usize {
        self.read
    }

    pub const fn write_index(&self) -> usize {
        1 - self.read
    }

    pub fn read(&self) -> &T {
        &self.slots[self.read_index()]
    }

    pub fn write(&self) -> &T {
        &self.slots[self.write_index()]
    }

    pub fn read_mut(&mut self) -> &mut T {
        &mut self.slots[self.read]
    }

    pub fn write_mut(&mut self) -> &mut T {
        let index = self.write_index();
        &mut self.slots[index]
    }

    /// Both sides at once, as `(read, write)`.
    pub fn pair_mut(&mut self) -> (&mut T, &mut T) {
        let [first, second] = &mut self.slots;
        if self.read == 0 {
            (first, second)
        } else {
            (second, first)
        }
    }

    /// Exchange the roles. O(1), no data moves.
    pub fn swap(&mut self) {
        self.read = self.write_index();
        self.swaps += 1;
        tracing::trace!(read = self.read, swaps = self.swaps, "Roles swapped");
    }

    /// Number of swaps since creation.
    pub const fn swap_count(&self) -> u64 {
        self.swaps
    }

    /// Both resources in slot order, regardless of role.
    pub fn slots(&self) -> &[T; 2] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [T; 2] {
        &mut self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_always_distinct() {
        let mut roles = RoleBuffer::new('a', 'b');
        for _ in 0..5 {
            assert_ne!(roles.read_index(), roles.write_index());
            roles.swap();
        }
    }

    #[test]
    fn write_of_one_pass_is_read_of_the_next() {
        let mut roles = RoleBuffer::new("ping", "pong");

        let read_0 = *roles.read();
        let write_0 = *roles.write();
        roles.swap();
        let read_1 = *roles.read();
        let write_1 = *roles.write();

        assert_eq!(read_1, write_0);
        assert_eq!(write_1, read_0);
        assert_eq!(roles.swap_count(), 1);
    }

    #[test]
    fn two_swaps_restore_frame_start_roles() {
        let mut roles = RoleBuffer::new(0u8, 1u8);
        let start = roles.read_index();

        roles.swap();
        roles.swap();

        assert_eq!(roles.read_index(), start);
        assert_eq!(roles.swap_count(), 2);
    }

    #[test]
    fn swap_does_not_touch_contents() {
        let mut roles = RoleBuffer::new(vec![1, 2], vec![3]);
        roles.write_mut().push(4);

        roles.swap();

        assert_eq!(roles.slots(), &[vec![1, 2], vec![3, 4]]);
        assert_eq!(roles.read(), &vec![3, 4]);
    }

    #[test]
    fn pair_mut_follows_roles() {
        let mut roles = RoleBuffer::new(10, 20);
        roles.swap();

        let (read, write) = roles.pair_mut();
        *write += 1;
        assert_eq!(*read, 20);

        assert_eq!(roles.slots(), &[11, 20]);
        assert_eq!(roles.write_index(), 0);
    }
}
