use log::{debug, trace, warn};

use gnss::prelude::SV;
use hifitime::Epoch;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::{error::Error, lock::LliFlags};

/// Number of frequency slots per satellite
pub const NFREQ: usize = 3;

/// Measurements of one signal. Missing values are left to None.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Signal {
    /// Signal / code identifier, like "1C"
    pub code: Option<&'static str>,
    /// Pseudo range [m]
    pub pseudorange: Option<f64>,
    /// Carrier phase [cycles]
    pub phase: Option<f64>,
    /// Doppler shift [Hz]
    pub doppler: Option<f64>,
    /// Signal to noise ratio [dB.Hz]
    pub snr: Option<f64>,
    /// Loss of lock indicator
    pub lli: LliFlags,
}

impl Signal {
    pub fn is_empty(&self) -> bool {
        self.pseudorange.is_none()
            && self.phase.is_none()
            && self.doppler.is_none()
            && self.snr.is_none()
    }
}

/// Observations of one satellite, at one epoch
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Observation {
    pub sv: SV,
    /// Sampling instant
    pub epoch: Epoch,
    /// Signals, indexed by frequency slot
    pub signals: [Signal; NFREQ],
}

impl Observation {
    pub fn new(sv: SV, epoch: Epoch) -> Self {
        Self {
            sv,
            epoch,
            signals: Default::default(),
        }
    }
}

/// Observations of the epoch being decoded, in order of arrival.
/// All of them share the same sampling instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpochSet {
    epoch: Option<Epoch>,
    observations: Vec<Observation>,
}

impl EpochSet {
    pub fn epoch(&self) -> Option<Epoch> {
        self.epoch
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Observation> {
        self.observations.iter()
    }

    pub fn get(&self, sv: SV) -> Option<&Observation> {
        self.observations.iter().find(|obs| obs.sv == sv)
    }

    pub fn signal(&self, sv: SV, slot: usize) -> Option<&Signal> {
        self.get(sv).and_then(|obs| obs.signals.get(slot))
    }

    pub(crate) fn clear(&mut self) {
        self.epoch = None;
        self.observations.clear();
    }

    /// Direct mode access: returns the observation of this satellite,
    /// allocating it when needed. A new sampling instant starts a new epoch.
    pub(crate) fn observation_mut(
        &mut self,
        sv: SV,
        epoch: Epoch,
        max_sv: usize,
    ) -> Result<&mut Observation, Error> {
        if self.epoch != Some(epoch) {
            if !self.observations.is_empty() {
                trace!("{:?} - new epoch, releasing {} observations", epoch, self.len());
            }
            self.observations.clear();
            self.epoch = Some(epoch);
        }
        if let Some(index) = self.observations.iter().position(|obs| obs.sv == sv) {
            return Ok(&mut self.observations[index]);
        }
        if self.observations.len() >= max_sv {
            warn!("{:?} ({}) - too many satellites", epoch, sv);
            return Err(Error::EpochFull(max_sv));
        }
        let index = self.observations.len();
        self.observations.push(Observation::new(sv, epoch));
        Ok(&mut self.observations[index])
    }

    /// Direct mode access to one signal
    pub(crate) fn signal_mut(
        &mut self,
        sv: SV,
        slot: usize,
        epoch: Epoch,
        max_sv: usize,
    ) -> Result<&mut Signal, Error> {
        if slot >= NFREQ {
            return Err(Error::Malformed("frequency slot"));
        }
        let obs = self.observation_mut(sv, epoch, max_sv)?;
        Ok(&mut obs.signals[slot])
    }
}

impl<'a> IntoIterator for &'a EpochSet {
    type Item = &'a Observation;
    type IntoIter = std::slice::Iter<'a, Observation>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone, Default)]
struct Staged {
    sv: Option<SV>,
    signals: [Signal; NFREQ],
}

/// Measurements awaiting the end of epoch marker, for receivers
/// that first announce the satellites, then stream one message
/// per measurement type, in announcement order.
#[derive(Debug, Clone, Default)]
pub struct StagingBuffer {
    epoch: Option<Epoch>,
    staged: Vec<Staged>,
}

impl StagingBuffer {
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    pub fn epoch(&self) -> Option<Epoch> {
        self.epoch
    }

    /// Starts a new epoch with this list of satellites.
    /// Unresolved satellites keep their ordinal but are never released.
    pub(crate) fn stage(
        &mut self,
        epoch: Option<Epoch>,
        svs: &[Option<SV>],
        max_sv: usize,
    ) -> Result<(), Error> {
        self.clear();
        if svs.len() > max_sv {
            warn!("{:?} - too many satellites: {}", epoch, svs.len());
            return Err(Error::EpochFull(max_sv));
        }
        self.epoch = epoch;
        self.staged = svs
            .iter()
            .map(|sv| Staged {
                sv: *sv,
                ..Default::default()
            })
            .collect();
        Ok(())
    }

    /// Verifies that `len` bytes hold one `width` byte value per staged satellite.
    pub(crate) fn expect(&self, len: usize, width: usize) -> Result<usize, Error> {
        if len != self.staged.len() * width {
            return Err(Error::RecordCount {
                len,
                count: self.staged.len(),
            });
        }
        Ok(self.staged.len())
    }

    pub(crate) fn sv(&self, ordinal: usize) -> Option<SV> {
        self.staged.get(ordinal).and_then(|staged| staged.sv)
    }

    pub(crate) fn signal_mut(&mut self, ordinal: usize, slot: usize) -> Option<&mut Signal> {
        self.staged
            .get_mut(ordinal)
            .and_then(|staged| staged.signals.get_mut(slot))
    }

    pub(crate) fn clear(&mut self) {
        self.epoch = None;
        self.staged.clear();
    }

    /// Releases staged observations into `set`, which is replaced
    /// only when at least one satellite qualified (known satellite and time).
    /// The staging buffer is emptied in any case.
    pub(crate) fn flush(&mut self, set: &mut EpochSet) -> bool {
        let Some(epoch) = self.epoch else {
            debug!("flush: epoch is not time tagged");
            self.clear();
            return false;
        };
        let observations = self
            .staged
            .drain(..)
            .filter_map(|staged| {
                staged.sv.map(|sv| Observation {
                    sv,
                    epoch,
                    signals: staged.signals,
                })
            })
            .collect::<Vec<_>>();
        self.clear();
        if observations.is_empty() {
            debug!("{:?} - flush: no data", epoch);
            return false;
        }
        set.epoch = Some(epoch);
        set.observations = observations;
        true
    }
}
