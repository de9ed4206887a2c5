//! The ten defined 4-bit command codes and their framing shape.
//!
//! See `SPEC_FULL.md` section 4.4. Codes `0xa` through `0xf` are reserved:
//! a correctly-parity'd frame carrying one of them is accepted (it does not
//! disconnect the link) but otherwise ignored, per the Non-goals list.

/// Which side drives the payload that follows a command frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    /// No payload at all (DISCONNECT).
    None,
    /// Host drives the payload onto DI.
    HostToDtm,
    /// DTM drives the payload onto DO.
    DtmToHost,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command {
    Disconnect,
    ReadIdcode,
    ReadCsr,
    WriteCsr,
    ReadAddr,
    WriteAddr,
    WriteAddrTriggerRead,
    ReadData,
    ReadBuff,
    WriteData,
}

impl Command {
    pub fn decode(code: u8) -> Option<Self> {
        match code & 0xF {
            0x0 => Some(Self::Disconnect),
            0x1 => Some(Self::ReadIdcode),
            0x2 => Some(Self::ReadCsr),
            0x3 => Some(Self::WriteCsr),
            0x4 => Some(Self::ReadAddr),
            0x5 => Some(Self::WriteAddr),
            0x6 => Some(Self::WriteAddrTriggerRead),
            0x7 => Some(Self::ReadData),
            0x8 => Some(Self::ReadBuff),
            0x9 => Some(Self::WriteData),
            _ => None,
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            Self::Disconnect => Direction::None,
            Self::ReadIdcode | Self::ReadCsr | Self::ReadAddr | Self::ReadData | Self::ReadBuff => {
                Direction::DtmToHost
            }
            Self::WriteCsr | Self::WriteAddr | Self::WriteAddrTriggerRead | Self::WriteData => {
                Direction::HostToDtm
            }
        }
    }

    /// Payload width in bytes, given the device's configured ADDR width
    /// (`asize` is CSR.ASIZE: the ADDR register holds `asize + 1` bytes).
    pub fn payload_bytes(self, asize: u8) -> usize {
        match self {
            Self::Disconnect => 0,
            Self::ReadIdcode | Self::ReadCsr | Self::WriteCsr | Self::ReadData | Self::ReadBuff | Self::WriteData => 4,
            Self::ReadAddr | Self::WriteAddr | Self::WriteAddrTriggerRead => asize as usize + 1,
        }
    }

    /// `true` for the two commands that dispatch a bus read as a side effect
    /// (as opposed to merely reading a local register).
    pub fn triggers_bus_read(self) -> bool {
        matches!(self, Self::ReadData | Self::WriteAddrTriggerRead)
    }
}
