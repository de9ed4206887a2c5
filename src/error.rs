//! Crate-level error type.
//!
//! This is distinct from the protocol-level sticky CSR error bits
//! (EPARITY/EBUSFAULT/EBUSY, see [`crate::csr::Csr`]): those are observed by
//! reading CSR like any other register field, because they are properties of
//! the simulated hardware, not failures of the simulation. `DtmError` instead
//! reports misuse of this crate's own Rust API — an invalid device
//! configuration, or a caller driving the bus-completion API out of turn.

use thiserror::Error;

/// Errors reported by the [`crate::Dtm`] API surface itself, as opposed to
/// errors signalled to the remote host over the wire.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum DtmError {
    /// `asize` must fit the 3-bit CSR.ASIZE field (0..=7 bytes minus one).
    #[error("ASIZE {0} exceeds the 3-bit CSR field (max 7)")]
    InvalidAsize(u8),

    /// `mdropaddr_reset` must fit the 4-bit CSR.MDROPADDR field.
    #[error("multidrop address {0} exceeds the 4-bit MDROPADDR field (max 15)")]
    InvalidMultidropAddress(u8),
}
