//! Single-bit manipulation of unsigned status words
//!
//! Status words shared with interrupt context (e.g. the receive mailbox flags) are updated with
//! these helpers inside a critical section.

/// Set, clear, toggle and test single bits of an unsigned integer
///
/// All operations take the bit position counted from the least significant bit and return a new
/// value; the receiver is never modified in place.
pub trait BitField: Copy {
    /// Return `self` with `bit` set
    fn set_bit(self, bit: u32) -> Self;
    /// Return `self` with `bit` cleared
    fn clear_bit(self, bit: u32) -> Self;
    /// Return `self` with `bit` inverted
    fn toggle_bit(self, bit: u32) -> Self;
    /// Return true if `bit` is set
    fn bit(self, bit: u32) -> bool;
}

macro_rules! impl_bitfield {
    ($($t: ty),*) => {
        $(
            impl BitField for $t {
                fn set_bit(self, bit: u32) -> Self {
                    self | (1 << bit)
                }

                fn clear_bit(self, bit: u32) -> Self {
                    self & !(1 << bit)
                }

                fn toggle_bit(self, bit: u32) -> Self {
                    self ^ (1 << bit)
                }

                fn bit(self, bit: u32) -> bool {
                    (self >> bit) & 1 != 0
                }
            }
        )*
    };
}

impl_bitfield!(u8, u16, u32);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bit_ops() {
        let x = 0u32.set_bit(1).set_bit(2);
        assert_eq!(0b110, x);
        assert!(x.bit(1));
        assert!(!x.bit(0));
        assert_eq!(0b100, x.clear_bit(1));
        assert_eq!(0b111, x.toggle_bit(0));
        assert_eq!(0b010, x.toggle_bit(2));
        // Clearing a bit which is not set is a no-op
        assert_eq!(x, x.clear_bit(5));
    }

    #[test]
    fn test_bit_ops_u8_high_bit() {
        let flags = 0u8.set_bit(7);
        assert_eq!(0x80, flags);
        assert!(flags.bit(7));
        assert_eq!(0, flags.toggle_bit(7));
    }
}
