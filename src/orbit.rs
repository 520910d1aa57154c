#[cfg(feature = "serde")]
use serde::Serialize;

/// Keplerian orbital elements, as broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Keplerian {
    /// Semi major axis [m]
    pub a: f64,
    /// Eccentricity
    pub e: f64,
    /// Inclination at reference epoch [rad]
    pub i_0: f64,
    /// Longitude of ascending node at weekly epoch [rad]
    pub omega_0: f64,
    /// Mean anomaly at reference epoch [rad]
    pub m_0: f64,
    /// Argument of perigee [rad]
    pub omega: f64,
}

/// Orbit perturbations, as broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Perturbations {
    /// Mean motion difference from computed value [rad/s]
    pub dn: f64,
    /// Inclination rate [rad/s]
    pub i_dot: f64,
    /// Right ascension rate [rad/s]
    pub omega_dot: f64,
    /// Amplitude of sine harmonic correction term of the argument of latitude [rad]
    pub cus: f64,
    /// Amplitude of cosine harmonic correction term of the argument of latitude [rad]
    pub cuc: f64,
    /// Amplitude of sine harmonic correction term of the angle of inclination [rad]
    pub cis: f64,
    /// Amplitude of cosine harmonic correction term of the angle of inclination [rad]
    pub cic: f64,
    /// Amplitude of sine harmonic correction term of the orbit radius [m]
    pub crs: f64,
    /// Amplitude of cosine harmonic correction term of the orbit radius [m]
    pub crc: f64,
}
