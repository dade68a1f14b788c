/// Handle to a live registration.
///
/// A token is an index into the queue's registry plus the generation of the
/// slot at the time the registration was made. The packed form is what the
/// kernel stores as the registration's user data and hands back in every
/// batch entry, so a slot that was forgotten and reused can never be
/// mistaken for the registration an older entry was fetched for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Token {
    index: u32,
    generation: u32,
}

impl Token {
    /// Packed value of a batch entry that has been cancelled.
    ///
    /// Never produced by [`Token::pack`] because the slab never hands out
    /// index `u32::MAX`.
    pub(crate) const CANCELLED: u64 = u64::MAX;

    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the registry.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when this token was issued.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Packs the token into kernel user data.
    pub(crate) const fn pack(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Unpacks kernel user data. Returns `None` for cancelled entries.
    pub(crate) const fn unpack(data: u64) -> Option<Self> {
        if data == Self::CANCELLED {
            return None;
        }

        Some(Self {
            index: data as u32,
            generation: (data >> 32) as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing_keeps_index_and_generation_apart() {
        let token = Token::new(7, 3);
        let packed = token.pack();

        assert_eq!(packed, (3 << 32) | 7);
        assert_eq!(Token::unpack(packed), Some(token));
    }

    #[test]
    fn cancelled_entries_do_not_unpack() {
        assert_eq!(Token::unpack(Token::CANCELLED), None);
    }
}
