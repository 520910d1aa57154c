//! Decoding session
use log::{debug, warn};
use std::io::{ErrorKind, Read};

use gnss::prelude::SV;
use hifitime::Epoch;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::{
    cfg::Config,
    dispatch::{Dispatcher, Protocol},
    error::Error,
    framing::Synchronizer,
    lock::{LockParams, LockTracker},
    navigation::{Assembler, NavDecoder, Navigation, NoDecoder},
    observation::{EpochSet, Signal, StagingBuffer},
    time::week_tow,
};

/// [Session::read_from] block size [bytes]
const READ_BLOCK_LEN: usize = 4096;

/// Outcome of an ingestion call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Status {
    /// No message, or no update
    #[default]
    None,
    /// New epoch of observations
    Observation,
    /// New ephemeris for this satellite
    Ephemeris(SV),
    /// New SBAS message
    Sbas,
    /// New almanac for this satellite
    Almanac(SV),
    /// New ionosphere / UTC parameters
    IonUtc,
}

impl Status {
    /// Numerical status code
    pub fn code(&self) -> i32 {
        match self {
            Self::None => 0,
            Self::Observation => 1,
            Self::Ephemeris(_) => 2,
            Self::Sbas => 3,
            Self::Almanac(_) => 4,
            Self::IonUtc => 9,
        }
    }
}

impl Error {
    /// Numerical status code
    pub fn code(&self) -> i32 {
        match self {
            Self::EndOfInput => -2,
            _ => -1,
        }
    }
}

/// Decoding state shared by all message decoders of a session
pub struct Context {
    pub(crate) cfg: Config,
    /// Receiver time, best estimate
    pub(crate) time: Option<Epoch>,
    /// Latest epoch of observations
    pub(crate) obs: EpochSet,
    /// Observations awaiting an end of epoch marker
    pub(crate) staging: StagingBuffer,
    pub(crate) locks: LockTracker,
    /// GPS / QZSS legacy subframes
    pub(crate) subframes: Assembler<SV>,
    /// GLONASS strings
    pub(crate) strings: Assembler<SV>,
    /// BeiDou D1 subframes and D2 pages
    pub(crate) beidou: Assembler<SV>,
    pub(crate) nav: Navigation,
    pub(crate) decoder: Box<dyn NavDecoder>,
    /// Last decoded message
    pub(crate) descriptor: String,
}

impl Context {
    pub(crate) fn new(cfg: Config, lock: LockParams) -> Self {
        let lock = LockParams {
            slack: cfg.lock_slack.unwrap_or(lock.slack),
            saturation: cfg.lock_saturation.or(lock.saturation),
        };
        Self {
            cfg,
            time: None,
            obs: EpochSet::default(),
            staging: StagingBuffer::default(),
            locks: LockTracker::new(lock),
            subframes: Assembler::new(5),
            strings: Assembler::new(15),
            beidou: Assembler::new(10),
            nav: Navigation::default(),
            decoder: Box::new(NoDecoder),
            descriptor: String::new(),
        }
    }

    pub(crate) fn max_sv(&self) -> usize {
        self.cfg.max_sv_per_epoch
    }

    /// GPS week used to resolve truncated week counters
    pub(crate) fn reference_week(&self) -> Option<u32> {
        self.time
            .map(|t| week_tow(t).0)
            .or(self.cfg.week_hint)
            .or_else(|| Epoch::now().ok().map(|t| week_tow(t).0))
    }

    /// Direct mode access to one signal of the current epoch
    pub(crate) fn signal_mut(&mut self, sv: SV, slot: usize, epoch: Epoch) -> Result<&mut Signal, Error> {
        let max_sv = self.cfg.max_sv_per_epoch;
        self.obs.signal_mut(sv, slot, epoch, max_sv)
    }

    /// Releases the staged epoch
    pub(crate) fn flush(&mut self) -> Status {
        if self.staging.flush(&mut self.obs) {
            Status::Observation
        } else {
            Status::None
        }
    }
}

/// Decodes the binary stream of one receiver.
///
/// ```
/// use gnss_raw::prelude::*;
///
/// let mut session = Session::new(Novatel::default(), Config::default());
/// for byte in [0xAA, 0x44, 0x12] {
///     assert_eq!(session.feed(byte).unwrap(), Status::None);
/// }
/// assert_eq!(session.pending(), 3);
/// ```
pub struct Session<P: Protocol> {
    sync: Synchronizer,
    dispatcher: Dispatcher<P>,
    protocol: P,
    ctx: Context,
    /// Last block read by [Session::read_from]
    input: Vec<u8>,
    /// Bytes of `input` already fed
    consumed: usize,
    /// End of input reached
    eof: bool,
}

impl<P: Protocol + Default> Default for Session<P> {
    fn default() -> Self {
        Self::new(P::default(), Config::default())
    }
}

impl<P: Protocol> Session<P> {
    pub fn new(protocol: P, cfg: Config) -> Self {
        if !cfg.options.is_empty() {
            debug!("{} - receiver options: \"{}\"", P::NAME, cfg.options);
        }
        Self {
            sync: Synchronizer::new(P::LAYOUT),
            dispatcher: Dispatcher::new(),
            protocol,
            ctx: Context::new(cfg, P::LOCK),
            input: Vec::with_capacity(READ_BLOCK_LEN),
            consumed: 0,
            eof: false,
        }
    }

    /// Returns [Session] with given navigation message decoder
    pub fn with_decoder<D: NavDecoder + 'static>(mut self, decoder: D) -> Self {
        self.ctx.decoder = Box::new(decoder);
        self
    }

    /// Feeds one byte
    pub fn feed(&mut self, byte: u8) -> Result<Status, Error> {
        let Some(bytes) = self.sync.push(byte)? else {
            return Ok(Status::None);
        };
        let frame = P::LAYOUT.validate(bytes).inspect_err(|e| {
            warn!("{} - frame rejected: {}", P::NAME, e);
        })?;
        self.dispatcher.dispatch(&mut self.protocol, &frame, &mut self.ctx)
    }

    /// Feeds a block of bytes, yielding every result other than [Status::None]
    pub fn feed_block<'a>(
        &'a mut self,
        block: &'a [u8],
    ) -> impl Iterator<Item = Result<Status, Error>> + 'a {
        block.iter().filter_map(move |byte| match self.feed(*byte) {
            Ok(Status::None) => None,
            result => Some(result),
        })
    }

    /// Reads until something other than [Status::None] is obtained.
    /// The source is read in blocks: bytes following the released frame
    /// are kept and fed first on the next call, so the same reader
    /// should be passed until [Error::EndOfInput].
    /// At end of input, the pending epoch is released once,
    /// then [Error::EndOfInput] is returned.
    pub fn read_from<R: Read>(&mut self, reader: &mut R) -> Result<Status, Error> {
        if self.eof {
            return Err(Error::EndOfInput);
        }
        loop {
            while let Some(byte) = self.input.get(self.consumed).copied() {
                self.consumed += 1;
                match self.feed(byte) {
                    Ok(Status::None) => {},
                    result => return result,
                }
            }

            self.consumed = 0;
            self.input.resize(READ_BLOCK_LEN, 0);
            match reader.read(&mut self.input) {
                Ok(0) => {
                    self.input.clear();
                    return self.finish();
                },
                Ok(size) => self.input.truncate(size),
                Err(e) => {
                    self.input.clear();
                    if e.kind() != ErrorKind::Interrupted {
                        return Err(e.into());
                    }
                },
            }
        }
    }

    /// Terminates the session: drops the frame in flight and
    /// releases the pending epoch, if any.
    pub fn finish(&mut self) -> Result<Status, Error> {
        if self.eof {
            return Err(Error::EndOfInput);
        }
        self.eof = true;
        let unread = self.input.len() - self.consumed;
        if unread > 0 {
            debug!("{} - end of input, {} bytes not read", P::NAME, unread);
        }
        self.input.clear();
        self.consumed = 0;
        if self.sync.pending() > 0 {
            debug!("{} - end of input, dropping {} bytes", P::NAME, self.sync.pending());
        }
        self.sync.reset();
        match self.ctx.flush() {
            Status::None => Err(Error::EndOfInput),
            status => Ok(status),
        }
    }

    /// Receiver binding
    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    /// Latest epoch of observations
    pub fn observations(&self) -> &EpochSet {
        &self.ctx.obs
    }

    /// Latest navigation data
    pub fn navigation(&self) -> &Navigation {
        &self.ctx.nav
    }

    /// Receiver time, if known
    pub fn time(&self) -> Option<Epoch> {
        self.ctx.time
    }

    pub fn config(&self) -> &Config {
        &self.ctx.cfg
    }

    /// Description of the last decoded message, for diagnostic purposes
    pub fn descriptor(&self) -> &str {
        &self.ctx.descriptor
    }

    /// Bytes of the frame in flight
    pub fn pending(&self) -> usize {
        self.sync.pending()
    }
}
