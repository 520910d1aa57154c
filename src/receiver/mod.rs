//! Receiver families
use gnss::prelude::{Constellation, SV};

use crate::{error::Error, observation::Signal, sv::resolve};

pub mod javad;
pub mod novatel;
pub mod rt17;
pub mod skytraq;

pub use javad::Javad;
pub use novatel::Novatel;
pub use rt17::Rt17;
pub use skytraq::SkyTraq;

/// Speed of light [m/s]
pub(crate) const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Resolves a satellite number, as found on the wire
pub(crate) fn satellite(constellation: Constellation, prn: u32) -> Result<SV, Error> {
    u16::try_from(prn)
        .ok()
        .and_then(|prn| resolve(constellation, prn))
        .ok_or(Error::UnknownSatellite(prn))
}

/// Priority of a signal within its frequency slot.
/// L2 P(Y) prevails unless L2C was requested.
fn priority(code: &str, l2c: bool) -> u8 {
    match code {
        "2L" | "2S" | "2X" if l2c => 1,
        "2W" | "2P" if !l2c => 1,
        _ => 0,
    }
}

/// Selects the signal stored in a frequency slot that several signals
/// may be tracked on. Returns false when `code` should be dropped;
/// otherwise the slot is reset if it held a different signal.
pub(crate) fn select(signal: &mut Signal, code: &'static str, l2c: bool) -> bool {
    match signal.code {
        None => {},
        Some(prev) if prev == code => return true,
        Some(prev) => {
            if priority(code, l2c) <= priority(prev, l2c) {
                return false;
            }
            *signal = Signal::default();
        },
    }
    signal.code = Some(code);
    true
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tied_slot() {
        let mut signal = Signal::default();
        assert!(select(&mut signal, "2L", false));
        signal.pseudorange = Some(1.0);
        // P(Y) prevails
        assert!(select(&mut signal, "2W", false));
        assert_eq!(signal.code, Some("2W"));
        assert_eq!(signal.pseudorange, None);
        assert!(!select(&mut signal, "2L", false));
        assert!(select(&mut signal, "2W", false));

        let mut signal = Signal::default();
        assert!(select(&mut signal, "2W", true));
        assert!(select(&mut signal, "2L", true));
        assert!(!select(&mut signal, "2W", true));
        assert_eq!(signal.code, Some("2L"));
    }
}
