//! SkyTraq binary format (raw measurement extensions)
use log::{debug, trace, warn};

use gnss::prelude::{Constellation, SV};
use hifitime::Epoch;

use crate::{
    checksum::Checksum,
    codec::{Endianness, Fields},
    dispatch::{Handler, Protocol},
    error::Error,
    framing::{ChecksumRule, FieldKind, Frame, FrameLayout, HeaderLen, SyncPattern},
    lock::LliFlags,
    navigation::{BDS_SUBFRAME_LEN, LNAV_SUBFRAME_LEN},
    receiver::satellite,
    session::{Context, Status},
    sv::resolve,
    time::{extend_week, gpst},
};

pub const MEAS_TIME: u16 = 0xDC;
pub const RAW_MEAS: u16 = 0xDD;
pub const GPS_SUBFRAME: u16 = 0xE0;
pub const BDS_D1_SUBFRAME: u16 = 0xE2;
pub const BDS_D2_SUBFRAME: u16 = 0xE3;

const SYNC: [u8; 2] = [0xA0, 0xA1];

const TERMINATOR: [u8; 2] = [0x0D, 0x0A];

const MAX_LEN: usize = 4096;

const RAW_RECORD_LEN: usize = 23;

/// SkyTraq Venus receivers
#[derive(Debug, Clone, Copy, Default)]
pub struct SkyTraq {
    /// Issue of data of the latest measurement time
    iod: Option<u8>,
}

impl Protocol for SkyTraq {
    const NAME: &'static str = "skytraq";

    const LAYOUT: FrameLayout = FrameLayout {
        sync: SyncPattern::Bytes(&SYNC),
        prefix: 4,
        header: HeaderLen::Fixed(4),
        length: (2, FieldKind::U16Be),
        trailer: 3,
        code: (4, FieldKind::U8),
        max_len: MAX_LEN,
        checksum: ChecksumRule {
            checksum: Checksum::Xor,
            start: 4,
            tail: 3,
            endianness: Endianness::Big,
        },
    };

    fn handlers() -> Vec<(u16, &'static str, Handler<Self>)> {
        vec![
            (MEAS_TIME, "MEAS_TIME", measurement_time as Handler<Self>),
            (RAW_MEAS, "RAW_MEAS", raw_measurements as Handler<Self>),
            (GPS_SUBFRAME, "GPS_SUBFRAME", gps_subframe as Handler<Self>),
            (BDS_D1_SUBFRAME, "BDS_D1_SUBFRAME", bds_subframe::<false> as Handler<Self>),
            (BDS_D2_SUBFRAME, "BDS_D2_SUBFRAME", bds_subframe::<true> as Handler<Self>),
        ]
    }

    fn label(code: u16) -> String {
        format!("{:#04x}", code)
    }

    fn on_header(&mut self, frame: &Frame, _: &mut Context) -> Result<(), Error> {
        if !frame.bytes().ends_with(&TERMINATOR) {
            return Err(Error::Malformed("frame terminator"));
        }
        Ok(())
    }
}

/// Satellite and signal code of a receiver satellite id
fn signal(svid: u8) -> Option<(SV, &'static str)> {
    let svid = svid as u16;
    match svid {
        1..=32 => resolve(Constellation::GPS, svid).map(|sv| (sv, "1C")),
        65..=88 => resolve(Constellation::Glonass, svid - 64).map(|sv| (sv, "1C")),
        120..=158 => resolve(Constellation::SBAS, svid).map(|sv| (sv, "1C")),
        193..=197 => resolve(Constellation::QZSS, svid).map(|sv| (sv, "1C")),
        201..=237 => resolve(Constellation::BeiDou, svid - 200).map(|sv| (sv, "2I")),
        _ => None,
    }
}

/// Measurement time: truncated week and time of week [ms]
fn measurement_time(
    skytraq: &mut SkyTraq,
    frame: &Frame,
    ctx: &mut Context,
) -> Result<Status, Error> {
    let fields = frame.be();
    let iod = fields.u8(1)?;
    let week = fields.u16(2)? as u32;
    let ms = fields.u32(4)?;
    let week = match ctx.reference_week() {
        Some(reference) => extend_week(week, 10, reference),
        None => week,
    };
    ctx.time = Some(gpst(week, ms as f64 / 1.0E3));
    skytraq.iod = Some(iod);
    Ok(Status::None)
}

fn raw_measurements(
    skytraq: &mut SkyTraq,
    frame: &Frame,
    ctx: &mut Context,
) -> Result<Status, Error> {
    let fields = frame.be();
    let iod = fields.u8(1)?;
    let n = fields.u8(2)? as usize;
    if fields.len() != 3 + n * RAW_RECORD_LEN {
        return Err(Error::RecordCount {
            len: fields.len(),
            count: n,
        });
    }
    if skytraq.iod != Some(iod) {
        warn!("skytraq - measurements (iod={}) without time (iod={:?})", iod, skytraq.iod);
        return Err(Error::EpochMismatch);
    }
    let t = ctx.time.ok_or(Error::NoTime)?;

    let mut decoded = 0;
    for i in 0..n {
        let record = fields.offset(3 + i * RAW_RECORD_LEN)?;
        match raw_record(&record, t, ctx) {
            Ok(()) => decoded += 1,
            Err(e) => debug!("{:?} - raw record #{} skipped: {}", t, i, e),
        }
    }
    if decoded == 0 {
        return Ok(Status::None);
    }
    Ok(Status::Observation)
}

fn raw_record(record: &Fields, t: Epoch, ctx: &mut Context) -> Result<(), Error> {
    let svid = record.u8(0)?;
    let (sv, code) = signal(svid).ok_or(Error::UnknownSatellite(svid as u32))?;
    let cn0 = record.u8(1)?;
    let pseudorange = record.f64(2)?;
    let phase = record.f64(10)?;
    let doppler = record.f32(18)? as f64;
    let indicator = record.u8(22)?;

    let signal = ctx.signal_mut(sv, 0, t)?;
    signal.code = Some(code);
    if indicator & 0x01 != 0 {
        signal.pseudorange = Some(pseudorange);
    }
    if indicator & 0x02 != 0 {
        signal.doppler = Some(doppler);
    }
    if indicator & 0x04 != 0 {
        signal.phase = Some(phase);
    }
    if cn0 > 0 {
        signal.snr = Some(cn0 as f64);
    }
    signal.lli = if indicator & 0x08 != 0 {
        LliFlags::SLIP
    } else {
        LliFlags::empty()
    };
    Ok(())
}

/// GPS / QZSS subframe, parity removed
fn gps_subframe(_: &mut SkyTraq, frame: &Frame, ctx: &mut Context) -> Result<Status, Error> {
    let fields = frame.be();
    let svid = fields.u8(1)?;
    let id = fields.u8(2)?;
    let constellation = if svid >= 193 {
        Constellation::QZSS
    } else {
        Constellation::GPS
    };
    let sv = satellite(constellation, svid as u32)?;
    trace!("skytraq ({}) - subframe #{}", sv, id);
    ctx.lnav_subframe(sv, id, fields.slice(3, LNAV_SUBFRAME_LEN)?)
}

/// BeiDou subframes, D2 being broadcast by GEO satellites
fn bds_subframe<const D2: bool>(
    _: &mut SkyTraq,
    frame: &Frame,
    ctx: &mut Context,
) -> Result<Status, Error> {
    let fields = frame.be();
    let svid = fields.u8(1)? as u32;
    let id = fields.u8(2)?;
    let prn = svid.checked_sub(200).ok_or(Error::UnknownSatellite(svid))?;
    let sv = satellite(Constellation::BeiDou, prn)?;
    trace!("skytraq ({}) - subframe #{} (d2={})", sv, id, D2);
    ctx.beidou_subframe(sv, id, D2, fields.slice(3, BDS_SUBFRAME_LEN)?)
}

/// Builds a sealed message. The payload starts with the message id.
pub fn encode(payload: &[u8]) -> Result<Vec<u8>, Error> {
    let total = 4 + payload.len() + 3;
    if payload.is_empty() || total > MAX_LEN {
        return Err(Error::FrameLength(total));
    }
    let mut frame = Vec::with_capacity(total);
    frame.extend_from_slice(&SYNC);
    frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    frame.extend_from_slice(payload);
    frame.push(0);
    frame.extend_from_slice(&TERMINATOR);
    SkyTraq::LAYOUT.seal(&mut frame)?;
    Ok(frame)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        cfg::Config,
        session::Session,
        tests::{bds_subframe, subframe, IodeDecoder},
    };

    const G12: SV = SV {
        constellation: Constellation::GPS,
        prn: 12,
    };

    fn meas_time(iod: u8, week: u16, ms: u32) -> Vec<u8> {
        let mut payload = vec![0xDC, iod];
        payload.extend_from_slice(&week.to_be_bytes());
        payload.extend_from_slice(&ms.to_be_bytes());
        payload.extend_from_slice(&1000u16.to_be_bytes());
        encode(&payload).unwrap()
    }

    fn record(svid: u8, pr: f64, cp: f64, doppler: f32, indicator: u8) -> Vec<u8> {
        let mut rec = vec![svid, 42];
        rec.extend_from_slice(&pr.to_be_bytes());
        rec.extend_from_slice(&cp.to_be_bytes());
        rec.extend_from_slice(&doppler.to_be_bytes());
        rec.push(indicator);
        rec
    }

    fn raw_meas(iod: u8, records: &[Vec<u8>]) -> Vec<u8> {
        let mut payload = vec![0xDD, iod, records.len() as u8];
        for rec in records {
            payload.extend_from_slice(rec);
        }
        encode(&payload).unwrap()
    }

    fn session() -> Session<SkyTraq> {
        Session::new(SkyTraq::default(), Config::default().with_week_hint(2190))
    }

    fn feed(session: &mut Session<SkyTraq>, bytes: &[u8]) -> Vec<Result<Status, Error>> {
        session.feed_block(bytes).collect()
    }

    #[test]
    fn raw_measurements() {
        let mut session = session();
        // 10 bit week
        let week = (2190 % 1024) as u16;
        let stream = [
            meas_time(7, week, 345_600_500),
            raw_meas(
                7,
                &[
                    record(12, 22_000_000.25, 115_000_000.5, -2500.25, 0x07),
                    record(70, 20_000_000.0, 0.0, 100.0, 0x03),
                    record(99, 20_000_000.0, 0.0, 100.0, 0x07),
                ],
            ),
        ]
        .concat();
        let results = feed(&mut session, &stream);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap(), &Status::Observation);

        let t = gpst(2190, 345_600.5);
        let obs = session.observations();
        assert_eq!(obs.epoch(), Some(t));
        assert_eq!(obs.len(), 2);

        let l1 = obs.signal(G12, 0).unwrap();
        assert_eq!(l1.code, Some("1C"));
        assert_eq!(l1.pseudorange, Some(22_000_000.25));
        assert_eq!(l1.phase, Some(115_000_000.5));
        assert_eq!(l1.doppler, Some(-2500.25));
        assert_eq!(l1.snr, Some(42.0));

        // invalid carrier phase is missing, not null
        let r06 = SV {
            constellation: Constellation::Glonass,
            prn: 6,
        };
        assert_eq!(obs.signal(r06, 0).unwrap().phase, None);
    }

    #[test]
    fn slip_indicator() {
        let mut session = session();
        let stream = [
            meas_time(1, 142, 1000),
            raw_meas(1, &[record(12, 2.2E7, 1.15E8, 0.0, 0x0F)]),
        ]
        .concat();
        feed(&mut session, &stream);
        let l1 = session.observations().signal(G12, 0).unwrap();
        assert_eq!(l1.lli, LliFlags::SLIP);
        assert_eq!(l1.doppler, Some(0.0));
    }

    #[test]
    fn epoch_consistency() {
        let mut session = session();
        let results = feed(&mut session, &raw_meas(3, &[record(12, 2.2E7, 0.0, 0.0, 0x01)]));
        assert!(matches!(results[..], [Err(Error::EpochMismatch)]));

        let stream = [
            meas_time(3, 142, 1000),
            raw_meas(4, &[record(12, 2.2E7, 0.0, 0.0, 0x01)]),
        ]
        .concat();
        let results = feed(&mut session, &stream);
        assert!(matches!(results[..], [Err(Error::EpochMismatch)]));

        // declared count does not match the payload
        let mut payload = vec![0xDD, 3, 2];
        payload.extend(record(12, 2.2E7, 0.0, 0.0, 0x01));
        let results = feed(&mut session, &encode(&payload).unwrap());
        assert!(matches!(
            results[..],
            [Err(Error::RecordCount { count: 2, .. })]
        ));
    }

    #[test]
    fn frame_terminator() {
        let mut session = session();
        let mut msg = meas_time(1, 142, 1000);
        let len = msg.len();
        msg[len - 1] = 0x00;
        let results = feed(&mut session, &msg);
        assert!(matches!(results[..], [Err(Error::Malformed(_))]));
        assert_eq!(session.time(), None);
    }

    #[test]
    fn subframes() {
        let mut session = session().with_decoder(IodeDecoder);
        let mut stream = Vec::new();
        for id in 1..=3u8 {
            let mut payload = vec![0xE0, 12, id];
            payload.extend(subframe(id, 5000 + id as u32, 33));
            stream.extend(encode(&payload).unwrap());
        }
        let results = feed(&mut session, &stream);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap(), &Status::Ephemeris(G12));
        assert_eq!(session.navigation().ephemeris(G12).unwrap().iode, 33);
    }

    #[test]
    fn beidou_subframes() {
        let mut session = session().with_decoder(IodeDecoder);
        let c14 = SV {
            constellation: Constellation::BeiDou,
            prn: 14,
        };
        let mut stream = Vec::new();
        for id in 1..=3u8 {
            let mut payload = vec![0xE2, 214, id];
            payload.extend(bds_subframe(id, 90 + 6 * (id as u32 - 1), 0, 17));
            stream.extend(encode(&payload).unwrap());
        }
        let results = feed(&mut session, &stream);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap(), &Status::Ephemeris(c14));
        assert_eq!(session.navigation().ephemeris(c14).unwrap().iode, 17);
        assert!(session.descriptor().contains("BDS_D1_SUBFRAME"));

        // D2 pages of a GEO satellite
        let c03 = SV {
            constellation: Constellation::BeiDou,
            prn: 3,
        };
        let mut stream = Vec::new();
        for page in 1..=10u8 {
            let mut payload = vec![0xE3, 203, 1];
            payload.extend(bds_subframe(1, 90 + 3 * (page as u32 - 1), page, 4));
            stream.extend(encode(&payload).unwrap());
        }
        let results = feed(&mut session, &stream);
        assert!(matches!(results[..], [Ok(Status::Ephemeris(sv))] if sv == c03));

        // not a BeiDou satellite id
        let mut payload = vec![0xE2, 12, 1];
        payload.extend(bds_subframe(1, 90, 0, 4));
        let results = feed(&mut session, &encode(&payload).unwrap());
        assert!(matches!(results[..], [Err(Error::UnknownSatellite(12))]));
    }
}
