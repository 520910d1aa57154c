//! Frame and navigation word integrity checks
use crc::{Algorithm, Crc};

/// 32 bit CRC used by OEM binary receivers:
/// reflected 0x04C11DB7 polynomial, without final inversion.
pub const CRC_32_OEM: Algorithm<u32> = Algorithm {
    width: 32,
    poly: 0x04c11db7,
    init: 0,
    refin: true,
    refout: true,
    xorout: 0,
    check: 0x2dfd2d88,
    residue: 0,
};

/// Qualcomm 24 bit CRC protecting SBAS (and RTCM3) messages
pub const CRC_24Q: Algorithm<u32> = Algorithm {
    width: 24,
    poly: 0x864cfb,
    init: 0,
    refin: false,
    refout: false,
    xorout: 0,
    check: 0xcde703,
    residue: 0,
};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_OEM);
const CRC24Q: Crc<u32> = Crc::<u32>::new(&CRC_24Q);

/// Supported integrity functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checksum {
    /// Running checksum, rotated left by 2 before each XOR
    RotXor,
    /// Running XOR
    Xor,
    /// 8 bit additive sum, carries dropped
    Sum8,
    Crc32,
    Crc24q,
}

impl Checksum {
    /// Width of the checksum value, in bytes
    pub const fn width(&self) -> usize {
        match self {
            Self::RotXor | Self::Xor | Self::Sum8 => 1,
            Self::Crc24q => 3,
            Self::Crc32 => 4,
        }
    }

    pub fn compute(&self, data: &[u8]) -> u32 {
        match self {
            Self::RotXor => rot_xor(data) as u32,
            Self::Xor => xor(data) as u32,
            Self::Sum8 => sum8(data) as u32,
            Self::Crc32 => CRC32.checksum(data),
            Self::Crc24q => CRC24Q.checksum(data),
        }
    }
}

pub fn rot_xor(data: &[u8]) -> u8 {
    let cs = data
        .iter()
        .fold(0u8, |cs, b| cs.rotate_left(2) ^ b);
    cs.rotate_right(2)
}

pub fn xor(data: &[u8]) -> u8 {
    data.iter().fold(0, |cs, b| cs ^ b)
}

pub fn sum8(data: &[u8]) -> u8 {
    data.iter().fold(0, |cs: u8, b| cs.wrapping_add(*b))
}

pub fn crc24q(data: &[u8]) -> u32 {
    CRC24Q.checksum(data)
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{rngs::SmallRng, Rng, SeedableRng};
    use rstest::*;

    const CHECK: &[u8] = b"123456789";

    #[test]
    fn check_values() {
        assert_eq!(Checksum::Crc32.compute(CHECK), 0x2dfd2d88);
        assert_eq!(Checksum::Crc24q.compute(CHECK), 0xcde703);
        assert_eq!(crc24q(CHECK), 0xcde703);
        assert_eq!(Checksum::Xor.compute(&[0x01, 0x02, 0x04]), 0x07);
        assert_eq!(Checksum::Sum8.compute(&[0xF0, 0x20, 0x01]), 0x11);
        assert_eq!(Checksum::Crc32.compute(&[]), 0);
    }

    #[test]
    fn rotate_xor() {
        assert_eq!(rot_xor(&[]), 0);
        // single byte: only the final right rotation applies
        assert_eq!(rot_xor(&[0x5A]), 0x96);
        // (0x01 <<< 2) ^ 0x02 = 0x06, >>> 2 = 0x81
        assert_eq!(rot_xor(&[0x01, 0x02]), 0x81);
        // GREIS "~~" receiver time message, 7200000 ms
        let msg = [0x7E, 0x7E, 0x30, 0x30, 0x35, 0x00, 0xDD, 0x6D, 0x00];
        assert_eq!(rot_xor(&msg), 0xDF);
        assert_eq!(Checksum::RotXor.compute(&msg), 0xDF);
    }

    #[rstest]
    #[case(Checksum::RotXor)]
    #[case(Checksum::Xor)]
    #[case(Checksum::Sum8)]
    #[case(Checksum::Crc32)]
    #[case(Checksum::Crc24q)]
    fn single_bit_errors(#[case] checksum: Checksum) {
        let mut rng = SmallRng::seed_from_u64(42);
        let data: Vec<u8> = (0..64).map(|_| rng.random()).collect();
        let reference = checksum.compute(&data);
        assert!(u64::from(reference) < 1u64 << (8 * checksum.width()));

        for bit in 0..data.len() * 8 {
            let mut corrupt = data.clone();
            corrupt[bit / 8] ^= 1 << (bit % 8);
            assert_ne!(
                checksum.compute(&corrupt),
                reference,
                "{:?}: bit {} flip not detected",
                checksum,
                bit
            );
        }
    }
}
