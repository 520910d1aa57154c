//! Trimble RT17 packets
use log::{debug, trace};

use gnss::prelude::{Constellation, SV};
use hifitime::Epoch;

use crate::{
    checksum::Checksum,
    codec::{Endianness, Fields},
    dispatch::{Handler, Protocol},
    ephemerides::{Ephemeris, IonUtc, KbModel, UtcParams},
    error::Error,
    framing::{ChecksumRule, FieldKind, Frame, FrameLayout, HeaderLen, SyncPattern},
    lock::LliFlags,
    navigation::{fragments, Assembler, NavRecord},
    orbit::{Keplerian, Perturbations},
    receiver::{satellite, select},
    session::{Context, Status},
    sv::resolve,
    time::{adjust_week, gpst},
};

pub const RETSVDATA: u16 = 0x55;
pub const RAWDATA: u16 = 0x57;

const STX: u8 = 0x02;
const ETX: u8 = 0x03;

/// Header, 255 data bytes, checksum and ETX
const MAX_LEN: usize = 4 + 255 + 2;

/// Maximal number of pages of one record
const MAX_PAGES: u8 = 15;

/// Real time survey data record
const SURVEY_DATA: u8 = 7;

const BLOCK_LEN: usize = 24;

const EPHEMERIS_LEN: usize = 176;
const ION_UTC_LEN: usize = 96;

/// Trimble receivers, RT17 streaming format
#[derive(Debug, Clone)]
pub struct Rt17 {
    /// Pages of the records being received, per record type
    pages: Assembler<u8>,
}

impl Default for Rt17 {
    fn default() -> Self {
        Self {
            pages: Assembler::new(MAX_PAGES),
        }
    }
}

impl Protocol for Rt17 {
    const NAME: &'static str = "rt17";

    const LAYOUT: FrameLayout = FrameLayout {
        sync: SyncPattern::Bytes(&[STX]),
        prefix: 4,
        header: HeaderLen::Fixed(4),
        length: (3, FieldKind::U8),
        trailer: 2,
        code: (2, FieldKind::U8),
        max_len: MAX_LEN,
        checksum: ChecksumRule {
            checksum: Checksum::Sum8,
            start: 1,
            tail: 2,
            endianness: Endianness::Big,
        },
    };

    fn handlers() -> Vec<(u16, &'static str, Handler<Self>)> {
        vec![
            (RETSVDATA, "RETSVDATA", sv_data as Handler<Self>),
            (RAWDATA, "RAWDATA", raw_data as Handler<Self>),
        ]
    }

    fn label(code: u16) -> String {
        format!("{:#04x}", code)
    }

    fn on_header(&mut self, frame: &Frame, _: &mut Context) -> Result<(), Error> {
        if frame.bytes().last() != Some(&ETX) {
            return Err(Error::Malformed("missing ETX"));
        }
        Ok(())
    }
}

/// RAWDATA page: record type, page number and count,
/// reply number and flags, followed by record data.
fn raw_data(rt17: &mut Rt17, frame: &Frame, ctx: &mut Context) -> Result<Status, Error> {
    let fields = frame.be();
    let rtype = fields.u8(0)?;
    let page = fields.u8(1)?;
    let reply = fields.u8(2)?;
    let _flags = fields.u8(3)?;
    let data = fields.slice(4, fields.len() - 4)?;

    let (id, total) = (page >> 4, page & 0x0F);
    if total == 0 || id > total {
        return Err(Error::FragmentId(id));
    }
    let units = [fragments(1, total)];
    let Some(assembly) = rt17.pages.push(rtype, id, reply as u32, data, &units)? else {
        trace!("rt17 - record {} page {}/{}", rtype, id, total);
        return Ok(Status::None);
    };
    match rtype {
        SURVEY_DATA => survey_data(&assembly.bytes, ctx),
        _ => {
            trace!("rt17 - record type {} ignored", rtype);
            Ok(Status::None)
        },
    }
}

/// Frequency slot and signal code of an observation block
fn signal(constellation: Constellation, kind: u8) -> Option<(usize, &'static str)> {
    match (constellation, kind) {
        (Constellation::BeiDou, 0) => Some((0, "2I")),
        (Constellation::BeiDou, 1) => Some((1, "7I")),
        (_, 0) => Some((0, "1C")),
        (Constellation::GPS | Constellation::QZSS, 1) => Some((1, "2W")),
        (Constellation::GPS | Constellation::QZSS, 2) => Some((1, "2L")),
        (Constellation::Glonass, 1) => Some((1, "2P")),
        (Constellation::Glonass, 2) => Some((1, "2C")),
        (Constellation::GPS | Constellation::QZSS | Constellation::Galileo, 3) => {
            Some((2, "5Q"))
        },
        (Constellation::SBAS, 3) => Some((2, "5I")),
        _ => None,
    }
}

fn constellation(system: u8) -> Option<Constellation> {
    match system {
        0 => Some(Constellation::GPS),
        1 => Some(Constellation::SBAS),
        2 => Some(Constellation::Glonass),
        3 => Some(Constellation::Galileo),
        4 => Some(Constellation::QZSS),
        5 => Some(Constellation::BeiDou),
        _ => None,
    }
}

/// Survey data: receive time [ms], clock offset [ms] and satellite count,
/// followed by satellite headers and their observation blocks.
fn survey_data(bytes: &[u8], ctx: &mut Context) -> Result<Status, Error> {
    let fields = Fields::be(bytes);
    let tow = fields.f64(0)? / 1.0E3;
    let nsv = fields.u8(16)? as usize;

    let t = match ctx.time {
        Some(reference) => adjust_week(reference, tow),
        None => gpst(ctx.reference_week().ok_or(Error::NoTime)?, tow),
    };
    ctx.time = Some(t);
    let l2c = ctx.cfg.has_option("-L2C");

    let mut offset = 17;
    let mut decoded = 0;
    for _ in 0..nsv {
        let prn = fields.u8(offset)?;
        let system = fields.u8(offset + 1)?;
        let nblk = fields.u8(offset + 2)? as usize;
        offset += 3;

        let sv = constellation(system).and_then(|c| resolve(c, prn as u16));
        for k in 0..nblk {
            let block = fields.offset(offset + k * BLOCK_LEN)?;
            let Some(sv) = sv else {
                continue;
            };
            match observation_block(&block, sv, t, l2c, ctx) {
                Ok(true) => decoded += 1,
                Ok(false) => {},
                Err(e @ Error::OutOfBounds { .. }) => return Err(e),
                Err(e) => debug!("{:?} ({}) - block skipped: {}", t, sv, e),
            }
        }
        if sv.is_none() {
            debug!("rt17 - unresolved satellite: system {} prn {}", system, prn);
        }
        offset += nblk * BLOCK_LEN;
    }
    if decoded == 0 {
        return Ok(Status::None);
    }
    Ok(Status::Observation)
}

fn observation_block(
    block: &Fields,
    sv: SV,
    t: Epoch,
    l2c: bool,
    ctx: &mut Context,
) -> Result<bool, Error> {
    let kind = block.u8(0)?;
    let flags = block.u8(1)?;
    let snr = block.u16(2)?;
    let pseudorange = block.f64(4)?;
    let phase = block.real8(12)?;
    let doppler = block.real4(20)?;

    let Some((slot, code)) = signal(sv.constellation, kind) else {
        trace!("({}) - signal type {} ignored", sv, kind);
        return Ok(false);
    };
    if !select(ctx.signal_mut(sv, slot, t)?, code, l2c) {
        return Ok(false);
    }

    let phase_valid = flags & 0x01 != 0;
    let resolved = flags & 0x02 != 0;
    let mut lli = LliFlags::empty();
    if phase_valid {
        if ctx.locks.update_half_cycle(sv, slot, code, resolved) {
            lli |= LliFlags::SLIP;
        }
        if !resolved {
            lli |= LliFlags::HALF_CYCLE;
        }
    }

    let signal = ctx.signal_mut(sv, slot, t)?;
    if pseudorange != 0.0 {
        signal.pseudorange = Some(pseudorange);
    }
    if phase_valid {
        if let Some(phase) = phase {
            signal.phase = Some(phase);
        }
    }
    if let Some(doppler) = doppler {
        signal.doppler = Some(doppler as f64);
    }
    if snr != u16::MAX {
        signal.snr = Some(snr as f64 * 0.1);
    }
    signal.lli = lli;
    Ok(true)
}

/// Satellite data, by subtype
fn sv_data(_: &mut Rt17, frame: &Frame, ctx: &mut Context) -> Result<Status, Error> {
    let fields = frame.be();
    match fields.u8(0)? {
        1 => ephemeris(&fields, ctx),
        3 => ion_utc(&fields, ctx),
        subtype => {
            trace!("rt17 - satellite data subtype {} ignored", subtype);
            Ok(Status::None)
        },
    }
}

/// GPS ephemeris, angles in radians
fn ephemeris(fields: &Fields, ctx: &mut Context) -> Result<Status, Error> {
    if fields.len() < EPHEMERIS_LEN {
        return Err(Error::OutOfBounds {
            offset: 0,
            width: EPHEMERIS_LEN,
            len: fields.len(),
        });
    }
    let sv = satellite(Constellation::GPS, fields.u8(1)? as u32)?;
    let week = fields.u16(2)? as u32;
    let iodc = fields.u16(4)? as u32;
    let iode = fields.u8(7)? as u32;
    let toc = fields.u32(12)? as f64;
    let toe = fields.u32(16)? as f64;
    let real = |i: usize| fields.f64(20 + 8 * i);

    let eph = Ephemeris {
        sv,
        iode,
        iodc,
        week,
        toe: gpst(week, toe),
        toc: gpst(week, toc),
        clock: (real(3)?, real(2)?, real(1)?),
        tgd: real(0)?,
        // raw ephemeris flags
        health: fields.u32(172)?,
        keplerian: Keplerian {
            a: real(10)?.powi(2),
            e: real(8)?,
            i_0: real(14)?,
            omega_0: real(12)?,
            m_0: real(6)?,
            omega: real(16)?,
        },
        perturbations: Perturbations {
            dn: real(5)?,
            i_dot: real(18)?,
            omega_dot: real(17)?,
            cus: real(9)?,
            cuc: real(7)?,
            cis: real(13)?,
            cic: real(11)?,
            crs: real(4)?,
            crc: real(15)?,
        },
    };
    trace!("rt17 ({}) - ephemeris iode={} toe={:?}", sv, iode, eph.toe);
    let force = ctx.cfg.has_option("-EPHALL");
    Ok(ctx.nav.update(NavRecord::Ephemeris(eph), force))
}

/// GPS ionosphere and UTC parameters
fn ion_utc(fields: &Fields, ctx: &mut Context) -> Result<Status, Error> {
    if fields.len() < ION_UTC_LEN {
        return Err(Error::OutOfBounds {
            offset: 0,
            width: ION_UTC_LEN,
            len: fields.len(),
        });
    }
    let real = |offset: usize| fields.f64(offset);
    let klobuchar = KbModel {
        alpha: (real(2)?, real(10)?, real(18)?, real(26)?),
        beta: (real(34)?, real(42)?, real(50)?, real(58)?),
    };
    let utc = UtcParams {
        a0: real(66)?,
        a1: real(74)?,
        tot: fields.u32(82)?,
        wnt: fields.u16(86)? as u32,
        dt_ls: fields.i16(88)? as i32,
        wn_lsf: fields.u16(90)? as u32,
        dn: fields.u16(92)? as u32,
        dt_lsf: fields.i16(94)? as i32,
    };
    let record = IonUtc::new(Constellation::GPS)
        .with_klobuchar(klobuchar)
        .with_utc(utc);
    Ok(ctx.nav.update(NavRecord::IonUtc(record), false))
}

/// Builds a sealed packet
pub fn encode(ptype: u8, data: &[u8]) -> Result<Vec<u8>, Error> {
    if data.is_empty() || data.len() > 255 {
        return Err(Error::FrameLength(data.len()));
    }
    let mut frame = vec![STX, 0x00, ptype, data.len() as u8];
    frame.extend_from_slice(data);
    frame.extend_from_slice(&[0, ETX]);
    Rt17::LAYOUT.seal(&mut frame)?;
    Ok(frame)
}
