//! CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF, no reflect, no xorout) over
//! a message's bytes excluding its own trailing checksum field.

use crc::{Crc, CRC_16_IBM_3740};

const CCITT: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

pub fn crc16_ccitt(bytes: &[u8]) -> u16 {
    CCITT.checksum(bytes)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn known_check_value() {
        // The crc-catalog reference "123456789" check value for this algorithm.
        assert_eq!(crc16_ccitt(b"123456789"), 0x29b1);
    }

    #[test]
    fn single_byte_mutation_changes_crc() {
        let a = crc16_ccitt(&[1, 2, 3, 4, 5]);
        let b = crc16_ccitt(&[1, 2, 3, 4, 6]);
        assert_ne!(a, b);
    }
}
