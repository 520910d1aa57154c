#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default bound of satellites per epoch
pub const MAX_SV_PER_EPOCH: usize = 96;

/// Decoding session configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Receiver dependent options, like "-EPHALL -INVCP".
    /// Read as is by each decoder.
    pub options: String,
    /// Maximal number of satellites in one epoch
    pub max_sv_per_epoch: usize,
    /// Overrides the lock time growth tolerance of the receiver [s]
    pub lock_slack: Option<f64>,
    /// Overrides the lock time saturation value of the receiver [s]
    pub lock_saturation: Option<f64>,
    /// Reference GPS week, used when the stream does not
    /// provide one before it is needed
    pub week_hint: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            options: String::new(),
            max_sv_per_epoch: MAX_SV_PER_EPOCH,
            lock_slack: None,
            lock_saturation: None,
            week_hint: None,
        }
    }
}

impl Config {
    /// Returns [Config] with given receiver options
    pub fn with_options(mut self, options: &str) -> Self {
        self.options = options.to_string();
        self
    }

    /// Returns [Config] with reference GPS week
    pub fn with_week_hint(mut self, week: u32) -> Self {
        self.week_hint = Some(week);
        self
    }

    /// True if this option is present, like `has_option("-EPHALL")`
    pub fn has_option(&self, name: &str) -> bool {
        self.options
            .split_whitespace()
            .any(|opt| opt == name || opt.split_once('=').is_some_and(|(key, _)| key == name))
    }

    /// Value of a "-KEY=value" option
    pub fn option_value(&self, name: &str) -> Option<&str> {
        self.options
            .split_whitespace()
            .filter_map(|opt| opt.split_once('='))
            .find_map(|(key, value)| if key == name { Some(value) } else { None })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn options() {
        let cfg = Config::default().with_options("-EPHALL  -TADJ=0.1 -INVCP");
        assert!(cfg.has_option("-EPHALL"));
        assert!(cfg.has_option("-INVCP"));
        assert!(cfg.has_option("-TADJ"));
        assert!(!cfg.has_option("-EPH"));
        assert_eq!(cfg.option_value("-TADJ"), Some("0.1"));
        assert_eq!(cfg.option_value("-EPHALL"), None);
        assert_eq!(cfg.max_sv_per_epoch, 96);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserialize() {
        let cfg: Config = serde_json::from_str(r#"{"options": "-EPHALL", "week_hint": 2190}"#).unwrap();
        assert!(cfg.has_option("-EPHALL"));
        assert_eq!(cfg.week_hint, Some(2190));
        assert_eq!(cfg.max_sv_per_epoch, 96);
    }
}
