//! Bus master: the DTM's downstream, APB-like memory-mapped master port.
//!
//! Mirrors the decoupling `examples/thatnewyorker-Arness` uses for its own
//! external collaborators — `Mapper` for the cartridge, `PpuBus` for the
//! PPU's view of the bus (`src/mapper.rs`, `src/bus/interfaces.rs`). Here
//! [`DownstreamBus`] plays the same role: the core never touches a concrete
//! peripheral model, only this trait, so it can be driven by a fake slave in
//! tests and by a real interconnect model elsewhere.

/// One in-flight request the DTM core has issued onto the bus.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BusRequest {
    pub addr: u64,
    /// `Some` for a write, `None` for a read.
    pub write_data: Option<u32>,
}

/// The slave's response to an outstanding [`BusRequest`], asserted the cycle
/// PREADY goes high.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BusCompletion {
    /// Meaningful only for reads; ignored for writes.
    pub read_data: u32,
    pub slverr: bool,
}

/// The downstream APB-like bus, as seen by the DTM's bus master.
///
/// `poll` is called once per host clock rising edge while a transaction is
/// outstanding, with the same `request` each time, until it returns `Some`.
/// A slave with no wait states can resolve it on the very first call.
pub trait DownstreamBus {
    fn poll(&mut self, request: BusRequest) -> Option<BusCompletion>;
}

/// The bus master's outstanding-transaction state. Only one transaction may
/// be outstanding at a time; a second request while one is pending is
/// refused with CSR.EBUSY (see `Dtm::issue_bus_read`/`issue_bus_write`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum PendingOp {
    None,
    Read { addr: u64 },
    Write { addr: u64, data: u32 },
}

impl PendingOp {
    pub fn is_outstanding(&self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn as_request(&self) -> Option<BusRequest> {
        match *self {
            Self::None => None,
            Self::Read { addr } => Some(BusRequest { addr, write_data: None }),
            Self::Write { addr, data } => Some(BusRequest {
                addr,
                write_data: Some(data),
            }),
        }
    }
}
