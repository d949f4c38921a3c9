//! Ordered-set codec.
//!
//! Maps protocol framing symbols to and from the fixed 20-bit K-code
//! sequences on the wire. Both ends of the cable decode these
//! independently, so the values are bit-exact protocol constants.

/// K-code symbols, 5 bits each.
pub const SYNC1: u8 = 0x18;
pub const SYNC2: u8 = 0x11;
pub const SYNC3: u8 = 0x06;
pub const RST1: u8 = 0x07;
pub const RST2: u8 = 0x19;
/// End of packet, transmitted by hardware after the CRC.
pub const EOP: u8 = 0x0d;

/// Ordered sets the transmitter can frame and the receiver can detect.
///
/// The discriminant doubles as the bit position in the receiver
/// ordered-set enable mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OrderedSet {
    Sop = 0,
    SopPrime = 1,
    SopDoublePrime = 2,
    HardReset = 3,
    CableReset = 4,
    SopPrimeDebug = 5,
    SopDoublePrimeDebug = 6,
    /// Reserved extension sequence, detectable but carries no defined
    /// message framing.
    Ext1 = 7,
    /// Reserved extension sequence.
    Ext2 = 8,
}

/// Four symbols per ordered set, indexed by discriminant. First symbol
/// goes on the wire first and sits in bits 0..5 of the packed form.
const SYMBOLS: [[u8; 4]; 9] = [
    [SYNC1, SYNC1, SYNC1, SYNC2], // SOP
    [SYNC1, SYNC1, SYNC3, SYNC3], // SOP'
    [SYNC1, SYNC3, SYNC1, SYNC3], // SOP''
    [RST1, RST1, RST1, RST2],     // Hard Reset
    [RST1, SYNC1, RST1, SYNC3],   // Cable Reset
    [SYNC1, RST2, RST2, SYNC3],   // SOP' Debug
    [SYNC1, RST2, SYNC3, SYNC2],  // SOP'' Debug
    [RST1, SYNC3, RST1, SYNC3],   // Ext1
    [SYNC3, SYNC1, SYNC3, SYNC1], // Ext2
];

const ALL: [OrderedSet; 9] = [
    OrderedSet::Sop,
    OrderedSet::SopPrime,
    OrderedSet::SopDoublePrime,
    OrderedSet::HardReset,
    OrderedSet::CableReset,
    OrderedSet::SopPrimeDebug,
    OrderedSet::SopDoublePrimeDebug,
    OrderedSet::Ext1,
    OrderedSet::Ext2,
];

const fn pack(symbols: [u8; 4]) -> u32 {
    symbols[0] as u32
        | (symbols[1] as u32) << 5
        | (symbols[2] as u32) << 10
        | (symbols[3] as u32) << 15
}

impl OrderedSet {
    /// The four K-code symbols of this set, transmit order.
    pub const fn encode(self) -> [u8; 4] {
        SYMBOLS[self as usize]
    }

    /// The 20-bit packed form programmed into the framing registers.
    pub const fn bits(self) -> u32 {
        pack(SYMBOLS[self as usize])
    }

    /// Recognize a detected 20-bit sequence. Unknown codes yield `None`
    /// and must not stall the receive pipeline.
    pub fn decode(bits: u32) -> Option<OrderedSet> {
        ALL.iter().copied().find(|set| set.bits() == bits)
    }

    /// Bit in the receiver ordered-set enable mask.
    pub const fn mask(self) -> u16 {
        1 << self as u8
    }

    /// Reset sequences terminate transfers instead of framing a message.
    pub const fn is_reset(self) -> bool {
        matches!(self, OrderedSet::HardReset | OrderedSet::CableReset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_defined_set() {
        for set in ALL {
            assert_eq!(OrderedSet::decode(set.bits()), Some(set), "{:?}", set);
        }
    }

    #[test]
    fn round_trips_every_valid_code() {
        for set in ALL {
            let bits = set.bits();
            let decoded = OrderedSet::decode(bits).unwrap();
            assert_eq!(decoded.bits(), bits);
        }
    }

    #[test]
    fn sequences_are_pairwise_distinct() {
        for a in ALL {
            for b in ALL {
                if a != b {
                    assert_ne!(a.bits(), b.bits(), "{:?} vs {:?}", a, b);
                }
            }
        }
    }

    #[test]
    fn wire_values_match_the_protocol_tables() {
        // SYNC-1 SYNC-1 SYNC-1 SYNC-2
        assert_eq!(OrderedSet::Sop.bits(), 0x8e318);
        // RST-1 RST-1 RST-1 RST-2
        assert_eq!(OrderedSet::HardReset.bits(), 0xc9ce7);
        assert_eq!(OrderedSet::Sop.encode(), [SYNC1, SYNC1, SYNC1, SYNC2]);
    }

    #[test]
    fn unknown_codes_decode_to_none() {
        assert_eq!(OrderedSet::decode(0), None);
        assert_eq!(OrderedSet::decode(0xf_ffff), None);
        // One symbol off a valid sequence.
        assert_eq!(OrderedSet::decode(OrderedSet::Sop.bits() ^ 1), None);
    }
}
