use gnss::prelude::{Constellation, SV};
use hifitime::Epoch;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::{
    checksum::crc24q,
    codec::{getbitu, setbitu},
    orbit::{Keplerian, Perturbations},
};

/// Broadcast ephemeris (GPS, QZSS, Galileo, BeiDou)
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Ephemeris {
    pub sv: SV,
    /// Issue of data, ephemeris
    pub iode: u32,
    /// Issue of data, clock
    pub iodc: u32,
    /// Full week counter
    pub week: u32,
    /// Time of issue of ephemeris
    pub toe: Epoch,
    /// Time of clock
    pub toc: Epoch,
    /// SV clock bias [s], drift [s/s] and drift rate [s/s^2]
    pub clock: (f64, f64, f64),
    /// Total group delay [s]
    pub tgd: f64,
    pub health: u32,
    pub keplerian: Keplerian,
    pub perturbations: Perturbations,
}

impl Ephemeris {
    /// True when `rhs` carries the same issue of data and reference epoch
    pub fn unchanged(&self, rhs: &Self) -> bool {
        self.iode == rhs.iode && self.iodc == rhs.iodc && self.toe == rhs.toe
    }
}

/// GLONASS broadcast ephemeris
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct GloEphemeris {
    pub sv: SV,
    /// Issue of data, derived from tb
    pub iode: u32,
    /// Frequency channel number
    pub frq: i8,
    /// Reference epoch (tb)
    pub toe: Epoch,
    /// Frame time (tk)
    pub tof: Epoch,
    pub health: u32,
    /// PZ-90 position [m]
    pub position: (f64, f64, f64),
    /// PZ-90 velocity [m/s]
    pub velocity: (f64, f64, f64),
    /// Luni solar acceleration [m/s^2]
    pub acceleration: (f64, f64, f64),
    /// SV clock bias [s]
    pub taun: f64,
    /// Relative frequency bias
    pub gamn: f64,
}

impl GloEphemeris {
    pub fn unchanged(&self, rhs: &Self) -> bool {
        self.iode == rhs.iode && self.toe == rhs.toe
    }
}

/// Almanac (reduced precision orbit)
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Almanac {
    pub sv: SV,
    /// Full week counter
    pub week: u32,
    /// Time of almanac, in week [s]
    pub toa: f64,
    pub health: u32,
    pub keplerian: Keplerian,
    /// Clock bias [s] and drift [s/s]
    pub clock: (f64, f64),
}

/// Klobuchar Model
#[derive(Clone, Copy, Default, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct KbModel {
    /// alpha coefficients
    pub alpha: (f64, f64, f64, f64),
    /// beta coefficients
    pub beta: (f64, f64, f64, f64),
}

/// System time to UTC parameters
#[derive(Clone, Copy, Default, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct UtcParams {
    /// Bias [s]
    pub a0: f64,
    /// Drift [s/s]
    pub a1: f64,
    /// Reference time of week [s]
    pub tot: u32,
    /// Reference week
    pub wnt: u32,
    /// Current leap seconds
    pub dt_ls: i32,
    /// Week of the future leap second
    pub wn_lsf: u32,
    /// Day of the future leap second
    pub dn: u32,
    /// Future leap seconds
    pub dt_lsf: i32,
}

/// Ionosphere and UTC parameters of one constellation.
/// Both are not necessarily broadcast in the same message.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct IonUtc {
    pub constellation: Constellation,
    pub klobuchar: Option<KbModel>,
    pub utc: Option<UtcParams>,
}

impl IonUtc {
    pub fn new(constellation: Constellation) -> Self {
        Self {
            constellation,
            klobuchar: None,
            utc: None,
        }
    }

    pub fn with_klobuchar(mut self, model: KbModel) -> Self {
        self.klobuchar = Some(model);
        self
    }

    pub fn with_utc(mut self, utc: UtcParams) -> Self {
        self.utc = Some(utc);
        self
    }

    /// Merges `rhs`, whose parameters prevail
    pub(crate) fn merge(&mut self, rhs: &Self) {
        if rhs.klobuchar.is_some() {
            self.klobuchar = rhs.klobuchar;
        }
        if rhs.utc.is_some() {
            self.utc = rhs.utc;
        }
    }
}

/// SBAS message: 226 bits (preamble, type, data) without parity
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SbasMessage {
    /// SBAS PRN
    pub prn: u16,
    /// Reception time
    pub epoch: Option<Epoch>,
    pub msg: [u8; 29],
}

impl SbasMessage {
    /// Builds a message from its 226 first bits
    pub fn new(prn: u16, epoch: Option<Epoch>, bits: &[u8]) -> Option<Self> {
        let mut msg = [0u8; 29];
        msg.copy_from_slice(bits.get(..29)?);
        msg[28] &= 0xC0;
        Some(Self { prn, epoch, msg })
    }

    /// Message type
    pub fn message_type(&self) -> u8 {
        getbitu(&self.msg, 8, 6).map_or(0, |t| t as u8)
    }

    /// Verifies the CRC-24Q of a 250 bit message (226 bits + 24 parity bits)
    pub fn parity(bits: &[u8]) -> bool {
        Self::crc(bits).is_some_and(|(transmitted, computed)| transmitted == computed)
    }

    /// Transmitted and computed CRC-24Q of a 250 bit message
    pub(crate) fn crc(bits: &[u8]) -> Option<(u32, u32)> {
        if bits.len() < 32 {
            return None;
        }
        // 6 bit zero padding aligns the 226 bits on bytes
        let mut padded = [0u8; 29];
        for i in 0..226 {
            let bit = getbitu(bits, i, 1).ok()?;
            setbitu(&mut padded, i + 6, 1, bit).ok()?;
        }
        let transmitted = getbitu(bits, 226, 24).ok()?;
        Some((transmitted, crc24q(&padded)))
    }
}
