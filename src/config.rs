//! Device configuration: the handful of parameters that are fixed for a
//! given instantiation of the core rather than programmed over the wire.
//!
//! See `SPEC_FULL.md` section 10.1. Unlike CSR, these are not writable by
//! the host at runtime — CSR.ASIZE and the IDCODE value are presented to the
//! host read-only and reflect whatever was baked in here at construction.

use crate::error::DtmError;

/// Fixed, per-instantiation parameters of a [`crate::Dtm`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DtmConfig {
    /// Value returned by R.IDCODE.
    pub idcode: u32,
    /// CSR.ASIZE: the ADDR register holds `asize + 1` bytes (1..=8). Must be 0..=7.
    pub asize: u8,
    /// CSR.MDROPADDR's value after reset (0..=15).
    pub mdropaddr_reset: u8,
}

impl Default for DtmConfig {
    fn default() -> Self {
        Self {
            idcode: 0xdead_beef,
            asize: 3,
            mdropaddr_reset: 0,
        }
    }
}

impl DtmConfig {
    pub fn validate(&self) -> Result<(), DtmError> {
        if self.asize > 7 {
            return Err(DtmError::InvalidAsize(self.asize));
        }
        if self.mdropaddr_reset > 0xF {
            return Err(DtmError::InvalidMultidropAddress(self.mdropaddr_reset));
        }
        Ok(())
    }

    /// Number of bytes in the ADDR register for this configuration.
    pub(crate) fn addr_width_bytes(&self) -> u64 {
        u64::from(self.asize) + 1
    }

    /// Mask covering exactly `addr_width_bytes` bytes, used to clamp ADDR
    /// writes and auto-increment wraparound to the configured width.
    pub(crate) fn addr_mask(&self) -> u64 {
        let bits = self.addr_width_bytes() * 8;
        if bits >= 64 {
            u64::MAX
        } else {
            (1u64 << bits) - 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_oversized_asize() {
        let cfg = DtmConfig { asize: 8, ..DtmConfig::default() };
        assert_eq!(cfg.validate(), Err(DtmError::InvalidAsize(8)));
    }

    #[test]
    fn rejects_oversized_mdropaddr() {
        let cfg = DtmConfig {
            mdropaddr_reset: 16,
            ..DtmConfig::default()
        };
        assert_eq!(cfg.validate(), Err(DtmError::InvalidMultidropAddress(16)));
    }

    #[test]
    fn addr_mask_covers_configured_width() {
        let cfg = DtmConfig { asize: 0, ..DtmConfig::default() };
        assert_eq!(cfg.addr_mask(), 0xFF);
        let cfg = DtmConfig { asize: 7, ..DtmConfig::default() };
        assert_eq!(cfg.addr_mask(), u64::MAX);
    }
}
