#![doc = include_str!("../README.md")]
#![cfg_attr(docrs, feature(doc_cfg))]

extern crate gnss_rs as gnss;

pub mod cfg;
pub mod checksum;
pub mod codec;
pub mod dispatch;
pub mod ephemerides;
pub mod error;
pub mod framing;
pub mod lock;
pub mod navigation;
pub mod observation;
pub mod orbit;
pub mod receiver;
pub mod session;
pub mod sv;
pub mod time;


// prelude
pub mod prelude {
    pub use crate::cfg::Config;
    pub use crate::checksum::Checksum;
    pub use crate::codec::{Endianness, Fields};
    pub use crate::dispatch::{Dispatcher, Handler, Protocol};
    pub use crate::ephemerides::{
        Almanac, Ephemeris, GloEphemeris, IonUtc, KbModel, SbasMessage, UtcParams,
    };
    pub use crate::error::Error;
    pub use crate::framing::{Frame, FrameLayout, Synchronizer};
    pub use crate::lock::{LliFlags, LockParams, LockTracker};
    pub use crate::navigation::{
        Assembler, Assembly, NavDecoder, NavError, NavRecord, Navigation, NoDecoder,
    };
    pub use crate::observation::{EpochSet, Observation, Signal, StagingBuffer};
    pub use crate::orbit::{Keplerian, Perturbations};
    pub use crate::receiver::{Javad, Novatel, Rt17, SkyTraq};
    pub use crate::session::{Context, Session, Status};
    // re-export
    pub use gnss::prelude::{Constellation, SV};
    pub use hifitime::{Duration, Epoch, TimeScale};
}
