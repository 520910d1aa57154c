//! Navigation messages: fragment routing, decoding and storage
use log::{debug, trace};
use std::collections::HashMap;

use gnss::prelude::{Constellation, SV};

use crate::{
    codec::getbitu,
    ephemerides::{Almanac, Ephemeris, GloEphemeris, IonUtc, SbasMessage},
    error::Error,
    session::{Context, Status},
};

pub mod assembler;

pub use assembler::{fragments, Assembler, Assembly};

/// Legacy (LNAV) subframe length, parity bits removed [bytes]
pub const LNAV_SUBFRAME_LEN: usize = 30;

/// GLONASS string length (85 bits) [bytes]
pub const GLONASS_STRING_LEN: usize = 11;

/// BeiDou D1/D2 subframe length, parity bits removed (224 bits) [bytes]
pub const BDS_SUBFRAME_LEN: usize = 28;

/// Ephemeris (subframes 1 to 3), subframe 4 and subframe 5 pages
pub(crate) const LNAV_UNITS: &[u32] = &[fragments(1, 3), fragments(4, 4), fragments(5, 5)];

/// Immediate data (strings 1 to 4)
pub(crate) const GLONASS_UNITS: &[u32] = &[fragments(1, 4)];

/// D1: ephemeris (subframes 1 to 3), subframe 4 and subframe 5 pages
pub(crate) const BDS_D1_UNITS: &[u32] = &[fragments(1, 3), fragments(4, 4), fragments(5, 5)];

/// D2: ephemeris, carried by pages 1 to 10 of subframe 1
pub(crate) const BDS_D2_UNITS: &[u32] = &[fragments(1, 10)];

/// BeiDou frames (D1) and subframe 1 page cycles (D2) span 30 s
const BDS_FRAME_PERIOD: u32 = 30;

/// TOW count rolls over every week (6 s units)
const LNAV_TOW_COUNTS: u32 = 100800;

/// Navigation message decoding errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NavError {
    #[error("unsupported navigation message")]
    Unsupported,
    #[error("parity error")]
    Parity,
    #[error("malformed navigation message: {0}")]
    Malformed(&'static str),
}

/// Decoded navigation message
#[derive(Debug, Clone, PartialEq)]
pub enum NavRecord {
    Ephemeris(Ephemeris),
    Glonass(GloEphemeris),
    Almanac(Almanac),
    IonUtc(IonUtc),
}

/// Bit level navigation message interpretation.
/// Implement this trait to obtain ephemerides from assembled
/// navigation messages: default implementations reject everything.
pub trait NavDecoder {
    /// Decodes GPS / QZSS legacy subframes: either subframes 1 to 3
    /// (ephemeris), or one subframe 4 or 5 page.
    /// Each subframe is 30 bytes (10 words of 24 bits, parity removed).
    fn lnav(&self, sv: SV, subframes: &[u8]) -> Result<NavRecord, NavError> {
        let _ = (sv, subframes);
        Err(NavError::Unsupported)
    }

    /// Decodes BeiDou navigation data, 28 bytes per subframe.
    /// D1 (MEO/IGSO): either subframes 1 to 3, or one subframe 4 or 5 page.
    /// D2 (GEO): pages 1 to 10 of subframe 1.
    fn beidou(&self, sv: SV, subframes: &[u8]) -> Result<NavRecord, NavError> {
        let _ = (sv, subframes);
        Err(NavError::Unsupported)
    }

    /// Decodes GLONASS strings 1 to 4 (11 bytes each).
    fn glonass(&self, sv: SV, frq: i8, strings: &[u8]) -> Result<NavRecord, NavError> {
        let _ = (sv, frq, strings);
        Err(NavError::Unsupported)
    }
}

/// [NavDecoder] that does not decode anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDecoder;

impl NavDecoder for NoDecoder {}

/// Latest navigation data
#[derive(Debug, Clone, Default)]
pub struct Navigation {
    ephemerides: HashMap<SV, Ephemeris>,
    glonass: HashMap<SV, GloEphemeris>,
    almanacs: HashMap<SV, Almanac>,
    ion_utc: HashMap<Constellation, IonUtc>,
    sbas: Option<SbasMessage>,
}

impl Navigation {
    pub fn ephemeris(&self, sv: SV) -> Option<&Ephemeris> {
        self.ephemerides.get(&sv)
    }

    pub fn glonass(&self, sv: SV) -> Option<&GloEphemeris> {
        self.glonass.get(&sv)
    }

    pub fn almanac(&self, sv: SV) -> Option<&Almanac> {
        self.almanacs.get(&sv)
    }

    pub fn ion_utc(&self, constellation: Constellation) -> Option<&IonUtc> {
        self.ion_utc.get(&constellation)
    }

    /// Latest SBAS message
    pub fn sbas(&self) -> Option<&SbasMessage> {
        self.sbas.as_ref()
    }

    /// Stores a new record. Ephemerides are replaced only when their
    /// issue of data or reference epoch changed, unless `force` is set.
    pub fn update(&mut self, record: NavRecord, force: bool) -> Status {
        match record {
            NavRecord::Ephemeris(eph) => {
                let sv = eph.sv;
                if !force && self.ephemerides.get(&sv).is_some_and(|prev| prev.unchanged(&eph)) {
                    trace!("({}) - ephemeris unchanged (iode={})", sv, eph.iode);
                    return Status::None;
                }
                debug!("({}) - new ephemeris (iode={}, toe={:?})", sv, eph.iode, eph.toe);
                self.ephemerides.insert(sv, eph);
                Status::Ephemeris(sv)
            },
            NavRecord::Glonass(eph) => {
                let sv = eph.sv;
                if !force && self.glonass.get(&sv).is_some_and(|prev| prev.unchanged(&eph)) {
                    trace!("({}) - ephemeris unchanged (iode={})", sv, eph.iode);
                    return Status::None;
                }
                debug!("({}) - new ephemeris (iode={}, toe={:?})", sv, eph.iode, eph.toe);
                self.glonass.insert(sv, eph);
                Status::Ephemeris(sv)
            },
            NavRecord::Almanac(alm) => {
                let sv = alm.sv;
                self.almanacs.insert(sv, alm);
                Status::Almanac(sv)
            },
            NavRecord::IonUtc(params) => {
                self.ion_utc
                    .entry(params.constellation)
                    .and_modify(|stored| stored.merge(&params))
                    .or_insert(params);
                Status::IonUtc
            },
        }
    }

    pub(crate) fn update_sbas(&mut self, msg: SbasMessage) -> Status {
        trace!("sbas prn {} - message type {}", msg.prn, msg.message_type());
        self.sbas = Some(msg);
        Status::Sbas
    }
}

impl Context {
    /// Routes one legacy subframe (30 bytes) to the subframe assembler.
    /// The generation is the frame count, derived from the HOW time of week.
    pub(crate) fn lnav_subframe(&mut self, sv: SV, id: u8, subframe: &[u8]) -> Result<Status, Error> {
        let subframe = subframe
            .get(..LNAV_SUBFRAME_LEN)
            .ok_or(Error::Malformed("subframe length"))?;
        let tow = getbitu(subframe, 24, 17)?;
        let generation = (tow + LNAV_TOW_COUNTS - 1) % LNAV_TOW_COUNTS / 5;

        let Some(assembly) = self.subframes.push(sv, id, generation, subframe, LNAV_UNITS)? else {
            return Ok(Status::None);
        };
        let decoded = self.decoder.lnav(sv, &assembly.bytes);
        self.publish(sv, decoded)
    }

    /// Routes one BeiDou subframe (28 bytes) to the BeiDou assembler.
    /// GEO satellites (`d2`) broadcast their ephemeris over the pages of
    /// subframe 1, other subframes are not routed. The generation is
    /// derived from the seconds of week of the subframe.
    pub(crate) fn beidou_subframe(
        &mut self,
        sv: SV,
        id: u8,
        d2: bool,
        subframe: &[u8],
    ) -> Result<Status, Error> {
        let subframe = subframe
            .get(..BDS_SUBFRAME_LEN)
            .ok_or(Error::Malformed("subframe length"))?;
        let sow = getbitu(subframe, 18, 20)?;
        let generation = sow / BDS_FRAME_PERIOD;

        let (id, units) = if d2 {
            if id != 1 {
                trace!("({}) - D2 subframe {} not routed", sv, id);
                return Ok(Status::None);
            }
            (getbitu(subframe, 38, 4)? as u8, BDS_D2_UNITS)
        } else {
            if id > 5 {
                return Err(Error::FragmentId(id));
            }
            (id, BDS_D1_UNITS)
        };

        let Some(assembly) = self.beidou.push(sv, id, generation, subframe, units)? else {
            return Ok(Status::None);
        };
        let decoded = self.decoder.beidou(sv, &assembly.bytes);
        self.publish(sv, decoded)
    }

    /// Routes one GLONASS string (11 bytes) to the string assembler.
    pub(crate) fn glonass_string(
        &mut self,
        sv: SV,
        frq: i8,
        generation: u32,
        string: &[u8],
    ) -> Result<Status, Error> {
        let string = string
            .get(..GLONASS_STRING_LEN)
            .ok_or(Error::Malformed("string length"))?;
        let id = getbitu(string, 1, 4)? as u8;

        let Some(assembly) = self.strings.push(sv, id, generation, string, GLONASS_UNITS)? else {
            return Ok(Status::None);
        };
        let decoded = self.decoder.glonass(sv, frq, &assembly.bytes);
        self.publish(sv, decoded)
    }

    fn publish(&mut self, sv: SV, decoded: Result<NavRecord, NavError>) -> Result<Status, Error> {
        match decoded {
            Ok(record) => {
                let force = self.cfg.has_option("-EPHALL");
                Ok(self.nav.update(record, force))
            },
            Err(NavError::Unsupported) => {
                trace!("({}) - no navigation decoder", sv);
                Ok(Status::None)
            },
            Err(e) => {
                debug!("({}) - navigation message rejected: {}", sv, e);
                Err(Error::Navigation(e))
            },
        }
    }
}
