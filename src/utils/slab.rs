use crate::reactor::Token;

/// A generational slab allocator.
///
/// A `Slab` stores values of type `T` in a contiguous array and hands out
/// [`Token`]s that pair a slot index with the slot's generation. Removing a
/// value bumps the generation, so a token issued for an earlier occupant of
/// the same slot no longer resolves.
///
/// Internally, it keeps track of:
/// - the slots themselves, occupied or vacant,
/// - a stack of free indices that can be reused,
/// - the number of occupied slots.
pub(crate) struct Slab<T> {
    /// Storage for slots.
    slots: Vec<Slot<T>>,
    /// Stack of free indices that can be reused.
    free: Vec<u32>,
    /// Number of occupied slots.
    len: usize,
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

impl<T> Slab<T> {
    /// Creates an empty `Slab` with room for `capacity` values.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let slab = Slab::<i32>::with_capacity(16);
    /// ```
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Inserts a value into the slab and returns its token.
    ///
    /// A free slot is reused if one exists; its generation was already
    /// advanced when its previous occupant was removed.
    ///
    /// # Panics
    ///
    /// Panics if the slab would need more than `u32::MAX - 1` slots.
    pub(crate) fn insert(&mut self, value: T) -> Token {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = self.slots.len();
                assert!(index < u32::MAX as usize, "slab is full");

                self.slots.push(Slot {
                    generation: 0,
                    value: None,
                });

                index as u32
            }
        };

        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.value.is_none(), "free list pointed to an occupied slot");

        slot.value = Some(value);
        self.len += 1;

        Token::new(index, slot.generation)
    }

    /// Removes and returns the value `token` refers to.
    ///
    /// Returns `None` if the token is stale or was never issued by this slab.
    pub(crate) fn remove(&mut self, token: Token) -> Option<T> {
        let slot = self.slots.get_mut(token.index() as usize)?;

        if slot.generation != token.generation() {
            return None;
        }

        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);

        self.free.push(token.index());
        self.len -= 1;

        Some(value)
    }

    /// Returns a reference to the value `token` refers to, if it is live.
    pub(crate) fn get(&self, token: Token) -> Option<&T> {
        let slot = self.slots.get(token.index() as usize)?;

        if slot.generation != token.generation() {
            return None;
        }

        slot.value.as_ref()
    }

    /// Returns a mutable reference to the value `token` refers to, if it is live.
    pub(crate) fn get_mut(&mut self, token: Token) -> Option<&mut T> {
        let slot = self.slots.get_mut(token.index() as usize)?;

        if slot.generation != token.generation() {
            return None;
        }

        slot.value.as_mut()
    }

    /// Returns `true` if `token` refers to a live value.
    pub(crate) fn contains(&self, token: Token) -> bool {
        self.get(token).is_some()
    }

    /// Number of live values.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Iterates over live values with their tokens.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (Token, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (Token::new(index as u32, slot.generation), value))
        })
    }
}
