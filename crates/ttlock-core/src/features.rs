//! Lock hardware capabilities.
//!
//! The cloud reports capabilities as a hex string (`featureValue`) encoding a
//! bitmask. Only the bits this bridge acts on are named; the rest are kept so
//! the value survives a round trip.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TtlockError};

bitflags! {
    /// Capability bits from `featureValue`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Features: u64 {
        /// Lock and unlock can be triggered remotely.
        const LOCK_REMOTELY = 1 << 8;
        /// Unlock through a gateway is supported.
        const UNLOCK_VIA_GATEWAY = 1 << 10;
        /// A door sensor is fitted.
        const DOOR_SENSOR = 1 << 13;
        /// Passage mode can be configured.
        const PASSAGE_MODE = 1 << 22;
        /// The lock has its own Wi-Fi radio.
        const WIFI = 1 << 56;

        const _ = !0;
    }
}

impl Features {
    /// Parse the hex `featureValue` string. A missing or empty value means no features.
    ///
    /// # Errors
    ///
    /// Returns [`TtlockError::Decode`] if the value is not hexadecimal or does
    /// not fit in 64 bits.
    pub fn from_feature_value(value: Option<&str>) -> Result<Self> {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return Ok(Self::empty());
        };

        u64::from_str_radix(value, 16)
            .map(Self::from_bits_retain)
            .map_err(|e| TtlockError::Decode(format!("invalid featureValue '{value}': {e}")))
    }

    /// Names of the named bits that are set, for display.
    #[must_use]
    pub fn names(self) -> Vec<&'static str> {
        self.iter_names().map(|(name, _)| name).collect()
    }
}
