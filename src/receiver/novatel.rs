//! NovAtel OEM binary format (long headers)
use log::{debug, trace};

use gnss::prelude::Constellation;
use hifitime::Epoch;

use crate::{
    checksum::Checksum,
    codec::{Endianness, Fields},
    dispatch::{Handler, Protocol},
    ephemerides::{IonUtc, KbModel, SbasMessage, UtcParams},
    error::Error,
    framing::{ChecksumRule, FieldKind, Frame, FrameLayout, HeaderLen, SyncPattern},
    lock::{LliFlags, LockParams},
    navigation::{NavRecord, LNAV_SUBFRAME_LEN},
    receiver::{satellite, select},
    session::{Context, Status},
    time::gpst,
};

pub const IONUTC: u16 = 8;
pub const RAWEPHEM: u16 = 41;
pub const RANGE: u16 = 43;
pub const RAWWAASFRAME: u16 = 287;

/// Long binary header length
pub const HEADER_LEN: usize = 28;

const SYNC: [u8; 3] = [0xAA, 0x44, 0x12];

const MAX_LEN: usize = 16384;

const RANGE_RECORD_LEN: usize = 44;

/// NovAtel OEM4 / OEM6 / OEM7 receivers.
///
/// Supported options:
/// - `-INVCP`: inverts the carrier phase polarity
/// - `-L2C`: prefers L2C over L2 P(Y)
#[derive(Debug, Clone, Copy, Default)]
pub struct Novatel;

impl Protocol for Novatel {
    const NAME: &'static str = "novatel";

    const LAYOUT: FrameLayout = FrameLayout {
        sync: SyncPattern::Bytes(&SYNC),
        prefix: 10,
        header: HeaderLen::Field(3),
        length: (8, FieldKind::U16Le),
        trailer: 4,
        code: (4, FieldKind::U16Le),
        max_len: MAX_LEN,
        checksum: ChecksumRule {
            checksum: Checksum::Crc32,
            start: 0,
            tail: 4,
            endianness: Endianness::Little,
        },
    };

    /// Lock time counter saturates at 65535.968 s
    const LOCK: LockParams = LockParams::new(0.05, Some(65535.968));

    fn handlers() -> Vec<(u16, &'static str, Handler<Self>)> {
        vec![
            (RANGE, "RANGE", range as Handler<Self>),
            (RAWEPHEM, "RAWEPHEM", rawephem as Handler<Self>),
            (RAWWAASFRAME, "RAWWAASFRAME", rawwaasframe as Handler<Self>),
            (IONUTC, "IONUTC", ionutc as Handler<Self>),
        ]
    }

    /// Every header carries the receiver time
    fn on_header(&mut self, frame: &Frame, ctx: &mut Context) -> Result<(), Error> {
        let header = Fields::le(frame.header());
        let week = header.u16(14)?;
        let ms = header.u32(16)?;
        if week == 0 {
            trace!("novatel - receiver time unknown");
            return Ok(());
        }
        ctx.time = Some(gpst(week as u32, ms as f64 / 1.0E3));
        Ok(())
    }
}

/// Channel tracking status word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TrackingStatus(u32);

impl TrackingStatus {
    fn phase_lock(&self) -> bool {
        self.0 & (1 << 10) != 0
    }

    fn parity_known(&self) -> bool {
        self.0 & (1 << 11) != 0
    }

    fn code_lock(&self) -> bool {
        self.0 & (1 << 12) != 0
    }

    fn system(&self) -> u32 {
        (self.0 >> 16) & 0x07
    }

    fn signal_type(&self) -> u32 {
        (self.0 >> 21) & 0x1F
    }

    fn half_cycle_added(&self) -> bool {
        self.0 & (1 << 28) != 0
    }
}

/// Constellation, frequency slot and code of a tracked signal
fn signal(system: u32, signal_type: u32) -> Option<(Constellation, usize, &'static str)> {
    let (constellation, slot, code) = match (system, signal_type) {
        (0, 0) => (Constellation::GPS, 0, "1C"),
        (0, 5) => (Constellation::GPS, 1, "2P"),
        (0, 9) => (Constellation::GPS, 1, "2W"),
        (0, 14) => (Constellation::GPS, 2, "5Q"),
        (0, 17) => (Constellation::GPS, 1, "2L"),
        (1, 0) => (Constellation::Glonass, 0, "1C"),
        (1, 1) => (Constellation::Glonass, 1, "2C"),
        (1, 5) => (Constellation::Glonass, 1, "2P"),
        (2, 0) => (Constellation::SBAS, 0, "1C"),
        (2, 6) => (Constellation::SBAS, 2, "5I"),
        (3, 2) => (Constellation::Galileo, 0, "1C"),
        (3, 12) => (Constellation::Galileo, 2, "5Q"),
        (3, 17) => (Constellation::Galileo, 1, "7Q"),
        (4, 0) | (4, 4) => (Constellation::BeiDou, 0, "2I"),
        (4, 1) | (4, 5) => (Constellation::BeiDou, 1, "7I"),
        (5, 0) => (Constellation::QZSS, 0, "1C"),
        (5, 14) => (Constellation::QZSS, 2, "5Q"),
        (5, 17) => (Constellation::QZSS, 1, "2L"),
        _ => return None,
    };
    Some((constellation, slot, code))
}

fn range(_: &mut Novatel, frame: &Frame, ctx: &mut Context) -> Result<Status, Error> {
    let t = ctx.time.ok_or(Error::NoTime)?;
    let fields = frame.le();
    let nobs = fields.u32(0)? as usize;
    if fields.len() < 4 + nobs * RANGE_RECORD_LEN {
        return Err(Error::RecordCount {
            len: fields.len(),
            count: nobs,
        });
    }
    let invert = ctx.cfg.has_option("-INVCP");
    let l2c = ctx.cfg.has_option("-L2C");

    let mut decoded = 0;
    for i in 0..nobs {
        let record = fields.offset(4 + i * RANGE_RECORD_LEN)?;
        match range_record(&record, t, invert, l2c, ctx) {
            Ok(true) => decoded += 1,
            Ok(false) => {},
            Err(e) => debug!("{:?} - range record #{} skipped: {}", t, i, e),
        }
    }
    if decoded == 0 {
        return Ok(Status::None);
    }
    Ok(Status::Observation)
}

fn range_record(
    record: &Fields,
    t: Epoch,
    invert: bool,
    l2c: bool,
    ctx: &mut Context,
) -> Result<bool, Error> {
    let status = TrackingStatus(record.u32(40)?);
    let Some((constellation, slot, code)) = signal(status.system(), status.signal_type()) else {
        trace!("{:?} - unknown signal, status={:#x}", t, status.0);
        return Ok(false);
    };

    let mut prn = record.u16(0)? as u32;
    if constellation == Constellation::Glonass {
        // slot numbers 38..=61
        prn = prn.saturating_sub(37);
    }
    let sv = satellite(constellation, prn)?;

    let psr = record.f64(4)?;
    let adr = record.f64(16)?;
    let doppler = record.f32(28)? as f64;
    let cno = record.f32(32)? as f64;
    let lock = record.f32(36)? as f64;

    if !select(ctx.signal_mut(sv, slot, t)?, code, l2c) {
        trace!("{:?} ({}) - {} dropped (slot #{})", t, sv, code, slot);
        return Ok(false);
    }

    let mut lli = LliFlags::empty();
    if status.phase_lock() {
        if ctx.locks.update_lock(sv, slot, code, lock, t) {
            lli |= LliFlags::SLIP;
        }
        if !status.parity_known() {
            lli |= LliFlags::HALF_CYCLE;
        }
        if status.half_cycle_added() {
            lli |= LliFlags::HALF_ADDED;
        }
    }

    let signal = ctx.signal_mut(sv, slot, t)?;
    if status.code_lock() {
        signal.pseudorange = Some(psr);
    }
    if status.phase_lock() {
        signal.phase = Some(if invert { adr } else { -adr });
        signal.doppler = Some(doppler);
    }
    if cno > 0.0 {
        signal.snr = Some(cno);
    }
    signal.lli = lli;
    Ok(true)
}

/// GPS subframes 1 to 3
fn rawephem(_: &mut Novatel, frame: &Frame, ctx: &mut Context) -> Result<Status, Error> {
    let fields = frame.le();
    let sv = satellite(Constellation::GPS, fields.u32(0)?)?;

    let mut status = Status::None;
    for id in 1..=3u8 {
        let offset = 12 + (id as usize - 1) * LNAV_SUBFRAME_LEN;
        let subframe = fields.slice(offset, LNAV_SUBFRAME_LEN)?;
        match ctx.lnav_subframe(sv, id, subframe)? {
            Status::None => {},
            decoded => status = decoded,
        }
    }
    Ok(status)
}

fn rawwaasframe(_: &mut Novatel, frame: &Frame, ctx: &mut Context) -> Result<Status, Error> {
    let fields = frame.le();
    let prn = fields.u32(4)?;
    satellite(Constellation::SBAS, prn)?;
    let bits = fields.slice(12, 29)?;
    let msg = SbasMessage::new(prn as u16, ctx.time, bits).ok_or(Error::Malformed("sbas frame"))?;
    Ok(ctx.nav.update_sbas(msg))
}

fn ionutc(_: &mut Novatel, frame: &Frame, ctx: &mut Context) -> Result<Status, Error> {
    let f = frame.le();
    let klobuchar = KbModel {
        alpha: (f.f64(0)?, f.f64(8)?, f.f64(16)?, f.f64(24)?),
        beta: (f.f64(32)?, f.f64(40)?, f.f64(48)?, f.f64(56)?),
    };
    let utc = UtcParams {
        wnt: f.u32(64)?,
        tot: f.u32(68)?,
        a0: f.f64(72)?,
        a1: f.f64(80)?,
        wn_lsf: f.u32(88)?,
        dn: f.u32(92)?,
        dt_ls: f.i32(96)?,
        dt_lsf: f.i32(100)?,
    };
    let params = IonUtc::new(Constellation::GPS)
        .with_klobuchar(klobuchar)
        .with_utc(utc);
    Ok(ctx.nav.update(NavRecord::IonUtc(params), false))
}

/// Builds a sealed message, with a long header time tagged
/// by `week` and `ms` (milliseconds of week).
pub fn encode(id: u16, week: u16, ms: u32, payload: &[u8]) -> Result<Vec<u8>, Error> {
    let total = HEADER_LEN + payload.len() + 4;
    if total > MAX_LEN {
        return Err(Error::FrameLength(total));
    }
    let mut frame = vec![0u8; total];
    frame[..3].copy_from_slice(&SYNC);
    frame[3] = HEADER_LEN as u8;
    frame[4..6].copy_from_slice(&id.to_le_bytes());
    frame[8..10].copy_from_slice(&(payload.len() as u16).to_le_bytes());
    frame[14..16].copy_from_slice(&week.to_le_bytes());
    frame[16..20].copy_from_slice(&ms.to_le_bytes());
    frame[HEADER_LEN..HEADER_LEN + payload.len()].copy_from_slice(payload);
    Novatel::LAYOUT.seal(&mut frame)?;
    Ok(frame)
}
