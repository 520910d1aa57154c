//! Javad GREIS format
//!
//! Observations are staged: the satellite list (`SI`) announces the
//! ordinals that the following measurement arrays refer to, the epoch
//! being released by the epoch time message (`::`).
use itertools::Itertools;
use log::{debug, trace, warn};

use gnss::prelude::{Constellation, SV};
use hifitime::{Epoch, TimeScale, Unit};

use crate::{
    checksum::Checksum,
    codec::{setbitu, Endianness},
    dispatch::{Handler, Protocol},
    ephemerides::{IonUtc, KbModel, SbasMessage, UtcParams},
    error::Error,
    framing::{ChecksumRule, FieldKind, Frame, FrameLayout, HeaderLen, SyncPattern},
    lock::{LliFlags, LockParams},
    navigation::{NavRecord, GLONASS_STRING_LEN},
    observation::Signal,
    receiver::{satellite, SPEED_OF_LIGHT},
    session::{Context, Status},
    sv::resolve,
    time::adjust_day,
};

/// Message identifier
pub const fn id(chars: &[u8; 2]) -> u16 {
    ((chars[0] as u16) << 8) | chars[1] as u16
}

const MAX_BODY_LEN: usize = 0xFFF;

/// GLONASS navigation frame period [ms]
const GLONASS_FRAME_MS: u32 = 30_000;

/// Two message id characters, then three hexadecimal digits
fn is_sync(window: &[u8]) -> bool {
    window.len() == 5
        && window[..2].iter().all(|c| (b'0'..=b'~').contains(c))
        && window[2..].iter().all(|c| c.is_ascii_hexdigit())
}

/// Javad receivers, GREIS binary messages.
///
/// Supported options:
/// - `-L1P`: L1 P code measurements replace L1 C/A ones
#[derive(Debug, Clone, Default)]
pub struct Javad {
    /// Receiver time of day [ms]
    tod: Option<u32>,
    /// Start of the receiver day, in the receiver time scale
    date: Option<Epoch>,
}

type H = Handler<Javad>;

impl Protocol for Javad {
    const NAME: &'static str = "javad";

    const LAYOUT: FrameLayout = FrameLayout {
        sync: SyncPattern::Predicate {
            len: 5,
            test: is_sync,
        },
        prefix: 5,
        header: HeaderLen::Fixed(5),
        length: (2, FieldKind::AsciiHex3),
        trailer: 0,
        code: (0, FieldKind::Ascii2),
        max_len: 5 + MAX_BODY_LEN,
        checksum: ChecksumRule {
            checksum: Checksum::RotXor,
            start: 0,
            tail: 1,
            endianness: Endianness::Little,
        },
    };

    /// Lock times are integer seconds
    const LOCK: LockParams = LockParams::new(1.0, Some(65534.0));

    fn handlers() -> Vec<(u16, &'static str, Handler<Self>)> {
        vec![
            (id(b"~~"), "receiver time", receiver_time as H),
            (id(b"RD"), "receiver date", receiver_date as H),
            (id(b"SI"), "satellite indices", satellite_indices as H),
            (id(b"RC"), "pseudoranges", pseudoranges::<b'C'> as H),
            (id(b"R1"), "pseudoranges", pseudoranges::<b'1'> as H),
            (id(b"R2"), "pseudoranges", pseudoranges::<b'2'> as H),
            (id(b"R5"), "pseudoranges", pseudoranges::<b'5'> as H),
            (id(b"PC"), "carrier phases", phases::<b'C'> as H),
            (id(b"P1"), "carrier phases", phases::<b'1'> as H),
            (id(b"P2"), "carrier phases", phases::<b'2'> as H),
            (id(b"P5"), "carrier phases", phases::<b'5'> as H),
            (id(b"DC"), "doppler", dopplers::<b'C'> as H),
            (id(b"D1"), "doppler", dopplers::<b'1'> as H),
            (id(b"D2"), "doppler", dopplers::<b'2'> as H),
            (id(b"D5"), "doppler", dopplers::<b'5'> as H),
            (id(b"EC"), "snr", snrs::<b'C'> as H),
            (id(b"E1"), "snr", snrs::<b'1'> as H),
            (id(b"E2"), "snr", snrs::<b'2'> as H),
            (id(b"E5"), "snr", snrs::<b'5'> as H),
            (id(b"TC"), "lock times", lock_times::<b'C'> as H),
            (id(b"T1"), "lock times", lock_times::<b'1'> as H),
            (id(b"T2"), "lock times", lock_times::<b'2'> as H),
            (id(b"T5"), "lock times", lock_times::<b'5'> as H),
            (id(b"::"), "epoch time", epoch_time as H),
            (id(b"IO"), "gps ionosphere", ionosphere as H),
            (id(b"UO"), "gps utc", utc as H),
            (id(b"lD"), "glonass raw navigation", glonass_string as H),
            (id(b"WD"), "sbas raw navigation", sbas_data as H),
        ]
    }

    fn label(code: u16) -> String {
        let [a, b] = code.to_be_bytes();
        format!("[{}{}]", a as char, b as char)
    }
}

impl Javad {
    /// Resolves a receiver time of day [ms] against the receiver date
    /// and the `previous` receiver time. The day rolls over before the
    /// date message is refreshed.
    fn resolve(&self, tod: u32, previous: Option<Epoch>) -> Option<Epoch> {
        let seconds = tod as f64 / 1.0E3;
        match (self.date, previous) {
            (Some(date), previous) => {
                let t = (date + seconds * Unit::Second).to_time_scale(TimeScale::GPST);
                let (day, half_day) = (1.0 * Unit::Day, 0.5 * Unit::Day);
                match previous {
                    Some(previous) if t < previous - half_day => Some(t + day),
                    Some(previous) if t > previous + half_day => Some(t - day),
                    _ => Some(t),
                }
            },
            (None, Some(previous)) => Some(adjust_day(previous, seconds)),
            (None, None) => None,
        }
    }
}

/// Resolves a Javad universal satellite index
fn usi(usi: u8) -> Option<SV> {
    let usi = usi as u16;
    match usi {
        1..=37 => resolve(Constellation::GPS, usi),
        38..=69 => resolve(Constellation::Glonass, usi - 37),
        70..=119 => resolve(Constellation::Galileo, usi - 69),
        120..=142 => resolve(Constellation::SBAS, usi),
        193..=197 => resolve(Constellation::QZSS, usi),
        211..=247 => resolve(Constellation::BeiDou, usi - 210),
        _ => None,
    }
}

/// Frequency slot of a measurement kind: C/A (C), L1 P (1), L2 (2), L5 (5)
fn slot(kind: u8, ctx: &Context) -> Option<usize> {
    let l1p = ctx.cfg.has_option("-L1P");
    match kind {
        b'C' if !l1p => Some(0),
        b'1' if l1p => Some(0),
        b'2' => Some(1),
        b'5' => Some(2),
        _ => None,
    }
}

fn code(constellation: Constellation, kind: u8) -> Option<&'static str> {
    match (constellation, kind) {
        (Constellation::GPS | Constellation::QZSS, b'C') => Some("1C"),
        (Constellation::GPS | Constellation::QZSS, b'1') => Some("1W"),
        (Constellation::GPS, b'2') => Some("2W"),
        (Constellation::QZSS, b'2') => Some("2L"),
        (Constellation::GPS | Constellation::QZSS, b'5') => Some("5Q"),
        (Constellation::Glonass, b'C') => Some("1C"),
        (Constellation::Glonass, b'1') => Some("1P"),
        (Constellation::Glonass, b'2') => Some("2P"),
        (Constellation::Galileo, b'C') => Some("1C"),
        (Constellation::Galileo, b'2') => Some("7Q"),
        (Constellation::Galileo, b'5') => Some("5Q"),
        (Constellation::BeiDou, b'C') => Some("2I"),
        (Constellation::BeiDou, b'2') => Some("7I"),
        (Constellation::SBAS, b'C') => Some("1C"),
        (Constellation::SBAS, b'5') => Some("5I"),
        _ => None,
    }
}

/// Staged signal of satellite #ordinal, tagged with its code
fn staged(ctx: &mut Context, ordinal: usize, slot: usize, kind: u8) -> Option<&mut Signal> {
    let tag = ctx
        .staging
        .sv(ordinal)
        .and_then(|sv| code(sv.constellation, kind));
    let signal = ctx.staging.signal_mut(ordinal, slot)?;
    if tag.is_some() {
        signal.code = tag;
    }
    Some(signal)
}

/// `~~` receiver time of day, starts a new epoch
fn receiver_time(javad: &mut Javad, frame: &Frame, ctx: &mut Context) -> Result<Status, Error> {
    let tod = frame.le().u32(0)?;
    if !ctx.staging.is_empty() {
        warn!("javad - unterminated epoch, dropping {} satellites", ctx.staging.len());
        ctx.staging.clear();
    }
    javad.tod = Some(tod);
    ctx.time = javad.resolve(tod, ctx.time);
    if ctx.time.is_none() {
        trace!("javad - receiver date unknown");
    }
    Ok(Status::None)
}

/// `RD` receiver date
fn receiver_date(javad: &mut Javad, frame: &Frame, ctx: &mut Context) -> Result<Status, Error> {
    let fields = frame.le();
    let year = fields.u16(0)? as i32;
    let month = fields.u8(2)?;
    let day = fields.u8(3)?;
    let (scale, offset) = match fields.u8(4)? {
        0 => (TimeScale::GPST, 0.0),
        1 => (TimeScale::UTC, 0.0),
        // UTC + 3h
        2 => (TimeScale::UTC, -3.0),
        3 => (TimeScale::BDT, 0.0),
        _ => return Err(Error::Malformed("receiver date base")),
    };
    let date = Epoch::maybe_from_gregorian(year, month, day, 0, 0, 0, 0, scale)
        .map_err(|_| Error::Malformed("receiver date"))?;
    javad.date = Some(date + offset * Unit::Hour);
    if let Some(tod) = javad.tod {
        ctx.time = javad.resolve(tod, ctx.time);
    }
    Ok(Status::None)
}

/// `SI` satellite indices, stages the epoch
fn satellite_indices(_: &mut Javad, frame: &Frame, ctx: &mut Context) -> Result<Status, Error> {
    let svs = frame.payload().iter().map(|index| usi(*index)).collect::<Vec<_>>();
    trace!("javad - satellites: {}", svs.iter().flatten().join(", "));
    let (epoch, max_sv) = (ctx.time, ctx.max_sv());
    ctx.staging.stage(epoch, &svs, max_sv)?;
    Ok(Status::None)
}

/// `R?` pseudoranges [s]
fn pseudoranges<const K: u8>(_: &mut Javad, frame: &Frame, ctx: &mut Context) -> Result<Status, Error> {
    let n = ctx.staging.expect(frame.len(), 8)?;
    let Some(slot) = slot(K, ctx) else {
        return Ok(Status::None);
    };
    let fields = frame.le();
    for i in 0..n {
        let Some(seconds) = fields.real8(8 * i)?.filter(|s| *s != 0.0) else {
            continue;
        };
        if let Some(signal) = staged(ctx, i, slot, K) {
            signal.pseudorange = Some(seconds * SPEED_OF_LIGHT);
        }
    }
    Ok(Status::None)
}

/// `P?` carrier phases [cycles]
fn phases<const K: u8>(_: &mut Javad, frame: &Frame, ctx: &mut Context) -> Result<Status, Error> {
    let n = ctx.staging.expect(frame.len(), 8)?;
    let Some(slot) = slot(K, ctx) else {
        return Ok(Status::None);
    };
    let fields = frame.le();
    for i in 0..n {
        let Some(cycles) = fields.real8(8 * i)?.filter(|c| *c != 0.0) else {
            continue;
        };
        if let Some(signal) = staged(ctx, i, slot, K) {
            signal.phase = Some(cycles);
        }
    }
    Ok(Status::None)
}

/// `D?` doppler [1E-4 Hz]
fn dopplers<const K: u8>(_: &mut Javad, frame: &Frame, ctx: &mut Context) -> Result<Status, Error> {
    let n = ctx.staging.expect(frame.len(), 4)?;
    let Some(slot) = slot(K, ctx) else {
        return Ok(Status::None);
    };
    let fields = frame.le();
    for i in 0..n {
        let raw = fields.i32(4 * i)?;
        if raw == i32::MAX {
            continue;
        }
        if let Some(signal) = staged(ctx, i, slot, K) {
            signal.doppler = Some(raw as f64 * 1.0E-4);
        }
    }
    Ok(Status::None)
}

/// `E?` signal to noise ratios [dB.Hz]
fn snrs<const K: u8>(_: &mut Javad, frame: &Frame, ctx: &mut Context) -> Result<Status, Error> {
    let n = ctx.staging.expect(frame.len(), 1)?;
    let Some(slot) = slot(K, ctx) else {
        return Ok(Status::None);
    };
    let fields = frame.le();
    for i in 0..n {
        let raw = fields.u8(i)?;
        if raw == u8::MAX {
            continue;
        }
        if let Some(signal) = staged(ctx, i, slot, K) {
            signal.snr = Some(raw as f64);
        }
    }
    Ok(Status::None)
}

/// `T?` carrier phase lock times [s]
fn lock_times<const K: u8>(_: &mut Javad, frame: &Frame, ctx: &mut Context) -> Result<Status, Error> {
    let n = ctx.staging.expect(frame.len(), 2)?;
    let Some(slot) = slot(K, ctx) else {
        return Ok(Status::None);
    };
    let fields = frame.le();
    let epoch = ctx.staging.epoch();
    for i in 0..n {
        let raw = fields.u16(2 * i)?;
        if raw == u16::MAX {
            continue;
        }
        let (Some(sv), Some(t)) = (ctx.staging.sv(i), epoch) else {
            continue;
        };
        let tag = code(sv.constellation, K).unwrap_or_default();
        let slip = ctx.locks.update_lock(sv, slot, tag, raw as f64, t);
        if let Some(signal) = staged(ctx, i, slot, K) {
            signal.lli.set(LliFlags::SLIP, slip);
        }
    }
    Ok(Status::None)
}

/// `::` epoch time, releases the staged epoch
fn epoch_time(javad: &mut Javad, frame: &Frame, ctx: &mut Context) -> Result<Status, Error> {
    let tod = frame.le().u32(0)?;
    if javad.tod != Some(tod) {
        warn!(
            "javad - epoch time {} does not match receiver time {:?}",
            tod, javad.tod
        );
        ctx.staging.clear();
        return Err(Error::EpochMismatch);
    }
    Ok(ctx.flush())
}

/// `IO` GPS ionospheric parameters
fn ionosphere(_: &mut Javad, frame: &Frame, ctx: &mut Context) -> Result<Status, Error> {
    let f = frame.le();
    let klobuchar = KbModel {
        alpha: (
            f.f32(6)? as f64,
            f.f32(10)? as f64,
            f.f32(14)? as f64,
            f.f32(18)? as f64,
        ),
        beta: (
            f.f32(22)? as f64,
            f.f32(26)? as f64,
            f.f32(30)? as f64,
            f.f32(34)? as f64,
        ),
    };
    let params = IonUtc::new(Constellation::GPS).with_klobuchar(klobuchar);
    Ok(ctx.nav.update(NavRecord::IonUtc(params), false))
}

/// `UO` GPS UTC parameters
fn utc(_: &mut Javad, frame: &Frame, ctx: &mut Context) -> Result<Status, Error> {
    let f = frame.le();
    let utc = UtcParams {
        a0: f.f64(0)?,
        a1: f.f32(8)? as f64,
        tot: f.u32(12)?,
        wnt: f.u16(16)? as u32,
        dt_ls: f.i8(18)? as i32,
        dn: f.u8(19)? as u32,
        wn_lsf: f.u16(20)? as u32,
        dt_lsf: f.i8(22)? as i32,
    };
    let params = IonUtc::new(Constellation::GPS).with_utc(utc);
    Ok(ctx.nav.update(NavRecord::IonUtc(params), false))
}

/// `lD` GLONASS string, as 32 bit words
fn glonass_string(_: &mut Javad, frame: &Frame, ctx: &mut Context) -> Result<Status, Error> {
    let f = frame.le();
    let sv = satellite(Constellation::Glonass, f.u8(0)? as u32)?;
    let frq = f.i8(1)?;
    let time = f.u32(2)?;
    let nwords = f.u8(7)? as usize;
    if nwords < 3 {
        return Err(Error::Malformed("glonass string length"));
    }
    let mut string = [0u8; 12];
    for i in 0..3 {
        setbitu(&mut string, 32 * i, 32, f.u32(8 + 4 * i)?)?;
    }
    ctx.glonass_string(sv, frq, time / GLONASS_FRAME_MS, &string[..GLONASS_STRING_LEN])
}

/// `WD` SBAS message, as 32 bit words
fn sbas_data(_: &mut Javad, frame: &Frame, ctx: &mut Context) -> Result<Status, Error> {
    let f = frame.le();
    let prn = f.u8(0)? as u32;
    let nwords = f.u8(6)? as usize;
    if nwords < 8 {
        return Err(Error::Malformed("sbas message length"));
    }
    let mut bits = [0u8; 32];
    for i in 0..8 {
        setbitu(&mut bits, 32 * i, 32, f.u32(7 + 4 * i)?)?;
    }
    match SbasMessage::crc(&bits) {
        Some((expected, computed)) if expected != computed => {
            debug!("javad - sbas prn {}: parity error", prn);
            return Err(Error::Checksum { expected, computed });
        },
        Some(_) => {},
        None => return Err(Error::Malformed("sbas message")),
    }
    satellite(Constellation::SBAS, prn)?;
    let msg = SbasMessage::new(prn as u16, ctx.time, &bits).ok_or(Error::Malformed("sbas message"))?;
    Ok(ctx.nav.update_sbas(msg))
}

/// Builds a sealed message
pub fn encode(id: &[u8; 2], body: &[u8]) -> Result<Vec<u8>, Error> {
    let len = body.len() + 1;
    if len > MAX_BODY_LEN {
        return Err(Error::FrameLength(len));
    }
    let mut frame = Vec::with_capacity(5 + len);
    frame.extend_from_slice(id);
    frame.extend_from_slice(format!("{:03X}", len).as_bytes());
    frame.extend_from_slice(body);
    frame.push(0);
    Javad::LAYOUT.seal(&mut frame)?;
    Ok(frame)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        cfg::Config,
        codec::getbitu,
        ephemerides::GloEphemeris,
        navigation::{NavDecoder, NavError},
        session::Session,
        tests::sbas_bits,
        time::gpst,
    };

    const G05: SV = SV {
        constellation: Constellation::GPS,
        prn: 5,
    };

    const R08: SV = SV {
        constellation: Constellation::Glonass,
        prn: 8,
    };

    /// 2022-01-03 00:00:00 GPST
    const WEEK: u32 = 2191;
    const MONDAY: f64 = 86400.0;

    fn rd() -> Vec<u8> {
        let mut body = 2022u16.to_le_bytes().to_vec();
        body.extend_from_slice(&[1, 3, 0]);
        encode(b"RD", &body).unwrap()
    }

    fn u32_msg(id: &[u8; 2], value: u32) -> Vec<u8> {
        encode(id, &value.to_le_bytes()).unwrap()
    }

    fn f64s(id: &[u8; 2], values: &[f64]) -> Vec<u8> {
        let body = values.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>();
        encode(id, &body).unwrap()
    }

    fn i32s(id: &[u8; 2], values: &[i32]) -> Vec<u8> {
        let body = values.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>();
        encode(id, &body).unwrap()
    }

    fn u16s(id: &[u8; 2], values: &[u16]) -> Vec<u8> {
        let body = values.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>();
        encode(id, &body).unwrap()
    }

    /// One epoch: G05, R08 and an unknown satellite
    fn epoch(tod: u32, locks: [u16; 3]) -> Vec<u8> {
        [
            u32_msg(b"~~", tod),
            rd(),
            encode(b"SI", &[5, 45, 250]).unwrap(),
            f64s(b"RC", &[0.07, f64::NAN, 0.072]),
            f64s(b"PC", &[1.1E8, 1.0E8, 0.0]),
            i32s(b"DC", &[-12005, i32::MAX, 100]),
            encode(b"EC", &[45, 0xFF, 40]).unwrap(),
            u16s(b"TC", &locks),
            u32_msg(b"::", tod),
        ]
        .concat()
    }

    fn feed(session: &mut Session<Javad>, bytes: &[u8]) -> Vec<Result<Status, Error>> {
        session.feed_block(bytes).collect()
    }

    #[test]
    fn sync_pattern() {
        assert!(is_sync(b"RT00A"));
        assert!(is_sync(b"~~005"));
        assert!(!is_sync(b"RT0G0"));
        assert!(!is_sync(b"\x02T00A"));
        assert_eq!(Javad::label(id(b"SI")), "[SI]");
    }

    #[test]
    fn wire_format() {
        let expected = [0x7E, 0x7E, 0x30, 0x30, 0x35, 0x00, 0xDD, 0x6D, 0x00, 0xDF];
        assert_eq!(u32_msg(b"~~", 7_200_000), expected);

        let mut session = Session::<Javad>::default();
        assert!(feed(&mut session, &expected).is_empty());
        let mut corrupt = expected;
        corrupt[9] = 0xDE;
        let results = feed(&mut session, &corrupt);
        assert!(matches!(results[..], [Err(Error::Checksum { .. })]));
    }

    #[test]
    fn staged_epoch() {
        let mut session = Session::<Javad>::default();
        let results = feed(&mut session, &epoch(3_600_500, [10, 5, 0xFFFF]));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap(), &Status::Observation);

        let t = gpst(WEEK, MONDAY + 3600.5);
        assert_eq!(session.time(), Some(t));

        let obs = session.observations();
        assert_eq!(obs.epoch(), Some(t));
        assert_eq!(obs.len(), 2);

        let l1 = obs.signal(G05, 0).unwrap();
        assert_eq!(l1.code, Some("1C"));
        assert_eq!(l1.pseudorange, Some(0.07 * SPEED_OF_LIGHT));
        assert_eq!(l1.phase, Some(1.1E8));
        assert!((l1.doppler.unwrap() + 1.2005).abs() < 1.0E-9);
        assert_eq!(l1.snr, Some(45.0));
        assert!(l1.lli.is_empty());

        // missing values
        let l1 = obs.signal(R08, 0).unwrap();
        assert_eq!(l1.pseudorange, None);
        assert_eq!(l1.doppler, None);
        assert_eq!(l1.snr, None);
        assert_eq!(l1.phase, Some(1.0E8));
    }

    #[test]
    fn lock_time_slips() {
        let mut session = Session::<Javad>::default();
        feed(&mut session, &epoch(3_600_000, [10, 5, 0]));
        feed(&mut session, &epoch(3_601_000, [11, 2, 0]));
        let obs = session.observations();
        assert!(obs.signal(G05, 0).unwrap().lli.is_empty());
        assert_eq!(obs.signal(R08, 0).unwrap().lli, LliFlags::SLIP);

        feed(&mut session, &epoch(3_602_000, [12, 3, 0]));
        let obs = session.observations();
        assert!(obs.signal(R08, 0).unwrap().lli.is_empty());
    }

    #[test]
    fn epoch_mismatch() {
        let mut session = Session::<Javad>::default();
        let mut stream = epoch(3_600_000, [1, 1, 1]);
        let end = u32_msg(b"::", 3_600_000);
        stream.truncate(stream.len() - end.len());
        stream.extend(u32_msg(b"::", 3_599_000));

        let results = feed(&mut session, &stream);
        assert!(matches!(results[..], [Err(Error::EpochMismatch)]));
        assert!(session.observations().is_empty());
    }

    #[test]
    fn record_count() {
        let mut session = Session::<Javad>::default();
        let mut stream = [u32_msg(b"~~", 1000), rd(), encode(b"SI", &[5, 6, 7]).unwrap()].concat();
        stream.extend(f64s(b"RC", &[0.07, 0.071]));
        let results = feed(&mut session, &stream);
        assert!(matches!(
            results[..],
            [Err(Error::RecordCount { len: 16, count: 3 })]
        ));
        // no satellites staged: measurements are rejected
        let mut session = Session::<Javad>::default();
        let results = feed(&mut session, &f64s(b"RC", &[0.07]));
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn unknown_date() {
        let mut session = Session::<Javad>::default();
        let stream = [
            u32_msg(b"~~", 1000),
            encode(b"SI", &[5]).unwrap(),
            f64s(b"RC", &[0.07]),
            u32_msg(b"::", 1000),
        ]
        .concat();
        assert!(feed(&mut session, &stream).is_empty());
        assert_eq!(session.time(), None);
        assert!(session.observations().is_empty());
    }

    #[test]
    fn day_rollover() {
        let mut session = Session::<Javad>::default();
        feed(&mut session, &epoch(86_399_000, [1, 1, 1]));
        assert_eq!(session.time(), Some(gpst(WEEK, 2.0 * MONDAY - 1.0)));

        // date message not refreshed yet
        feed(&mut session, &u32_msg(b"~~", 500));
        assert_eq!(session.time(), Some(gpst(WEEK, 2.0 * MONDAY + 0.5)));
    }

    #[test]
    fn l1p_selection() {
        let cfg = Config::default().with_options("-L1P");
        let mut session = Session::new(Javad::default(), cfg);
        let stream = [
            u32_msg(b"~~", 1000),
            rd(),
            encode(b"SI", &[5]).unwrap(),
            f64s(b"RC", &[0.07]),
            f64s(b"R1", &[0.0701]),
            f64s(b"R2", &[0.0702]),
            u32_msg(b"::", 1000),
        ]
        .concat();
        feed(&mut session, &stream);
        let obs = session.observations();
        let l1 = obs.signal(G05, 0).unwrap();
        assert_eq!(l1.code, Some("1W"));
        assert_eq!(l1.pseudorange, Some(0.0701 * SPEED_OF_LIGHT));
        assert_eq!(obs.signal(G05, 1).unwrap().code, Some("2W"));
    }

    #[test]
    fn corrupt_message() {
        let mut session = Session::<Javad>::default();
        let mut msg = u32_msg(b"~~", 1000);
        msg[6] ^= 0x01;
        let results = feed(&mut session, &msg);
        assert!(matches!(results[..], [Err(Error::Checksum { .. })]));
        assert_eq!(session.time(), None);
    }

    #[test]
    fn ion_utc() {
        let mut session = Session::<Javad>::default();
        let mut io = 61440u32.to_le_bytes().to_vec();
        io.extend_from_slice(&2190u16.to_le_bytes());
        for v in [1.0E-8_f32, 0.0, -6.0E-8, 0.0, 90112.0, 0.0, -196608.0, 0.0] {
            io.extend_from_slice(&v.to_le_bytes());
        }
        let results = feed(&mut session, &encode(b"IO", &io).unwrap());
        assert_eq!(results[0].as_ref().unwrap(), &Status::IonUtc);

        let mut uo = (-9.3E-10_f64).to_le_bytes().to_vec();
        uo.extend_from_slice(&0.0_f32.to_le_bytes());
        uo.extend_from_slice(&61440u32.to_le_bytes());
        uo.extend_from_slice(&2190u16.to_le_bytes());
        uo.extend_from_slice(&[18, 7]);
        uo.extend_from_slice(&2185u16.to_le_bytes());
        uo.push(18);
        let results = feed(&mut session, &encode(b"UO", &uo).unwrap());
        assert_eq!(results[0].as_ref().unwrap(), &Status::IonUtc);

        let params = session.navigation().ion_utc(Constellation::GPS).unwrap();
        assert_eq!(params.klobuchar.unwrap().beta.2, -196608.0);
        let utc = params.utc.unwrap();
        assert_eq!((utc.wnt, utc.dt_ls, utc.dn, utc.wn_lsf), (2190, 18, 7, 2185));
    }

    fn wd(prn: u8, bits: &[u8]) -> Vec<u8> {
        let mut body = vec![prn];
        body.extend_from_slice(&1000u32.to_le_bytes());
        body.extend_from_slice(&[0, 8]);
        for word in bits.chunks(4) {
            let word = u32::from_be_bytes([word[0], word[1], word[2], word[3]]);
            body.extend_from_slice(&word.to_le_bytes());
        }
        encode(b"WD", &body).unwrap()
    }

    #[test]
    fn sbas_data() {
        let mut session = Session::<Javad>::default();
        let bits = sbas_bits(9);
        let results = feed(&mut session, &wd(133, &bits));
        assert_eq!(results[0].as_ref().unwrap(), &Status::Sbas);
        let sbas = session.navigation().sbas().unwrap();
        assert_eq!((sbas.prn, sbas.message_type()), (133, 9));

        let mut corrupt = bits.clone();
        corrupt[10] ^= 0x04;
        let results = feed(&mut session, &wd(134, &corrupt));
        assert!(matches!(results[..], [Err(Error::Checksum { .. })]));
        assert_eq!(session.navigation().sbas().unwrap().prn, 133);
    }

    /// Reads the frame time from string 1
    struct Strings;

    impl NavDecoder for Strings {
        fn glonass(&self, sv: SV, frq: i8, strings: &[u8]) -> Result<NavRecord, NavError> {
            if strings.len() != 4 * GLONASS_STRING_LEN {
                return Err(NavError::Malformed("strings"));
            }
            let tk = getbitu(strings, 9, 12).map_err(|_| NavError::Parity)?;
            let t = gpst(2190, tk as f64);
            Ok(NavRecord::Glonass(GloEphemeris {
                sv,
                iode: tk,
                frq,
                toe: t,
                tof: t,
                health: 0,
                position: (1.0E7, 2.0E7, 0.0),
                velocity: (0.0, 0.0, 3.0E3),
                acceleration: (0.0, 0.0, 0.0),
                taun: 0.0,
                gamn: 0.0,
            }))
        }
    }

    fn ld(svn: u8, frq: i8, time: u32, n: u32, tk: u32) -> Vec<u8> {
        let mut string = [0u8; 12];
        setbitu(&mut string, 1, 4, n).unwrap();
        setbitu(&mut string, 9, 12, tk).unwrap();
        let mut body = vec![svn, frq as u8];
        body.extend_from_slice(&time.to_le_bytes());
        body.extend_from_slice(&[0, 3]);
        for word in string.chunks(4) {
            let word = u32::from_be_bytes([word[0], word[1], word[2], word[3]]);
            body.extend_from_slice(&word.to_le_bytes());
        }
        encode(b"lD", &body).unwrap()
    }

    #[test]
    fn glonass_strings() {
        let mut session = Session::<Javad>::default().with_decoder(Strings);
        let mut stream = Vec::new();
        for n in 1..=4 {
            stream.extend(ld(8, -3, 60_000 + n * 2000, n, 120));
        }
        let results = feed(&mut session, &stream);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap(), &Status::Ephemeris(R08));
        let eph = session.navigation().glonass(R08).unwrap();
        assert_eq!((eph.frq, eph.iode), (-3, 120));

        // same frame content, next frame: unchanged
        let mut stream = Vec::new();
        for n in 1..=4 {
            stream.extend(ld(8, -3, 90_000 + n * 2000, n, 120));
        }
        assert!(feed(&mut session, &stream).is_empty());

        // string 4 is not paired with strings of a previous frame
        let mut stream = Vec::new();
        for n in 1..=3 {
            stream.extend(ld(8, -3, 120_000 + n * 2000, n, 150));
        }
        stream.extend(ld(8, -3, 150_000, 4, 150));
        assert!(feed(&mut session, &stream).is_empty());
        assert_eq!(session.navigation().glonass(R08).unwrap().iode, 120);
    }
}
