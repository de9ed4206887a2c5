/*!
Top-level protocol engine: wires the link layer, frame decoder, register
unit, pipeline controller and bus master together behind a single
[`Dtm::rising_edge`] entry point.

# Overview

A [`Dtm`] is driven one host clock edge at a time. There is no internal
free-running clock: every state transition in this module happens inside
`rising_edge`, synchronously, in response to one sampled `DI` bit. The one
exception is the downstream bus, which completes independent of the host
clock (`SPEC_FULL.md` section 5) — `rising_edge` polls it on every call
regardless of link state, so an outstanding transaction can resolve even
while the host is mid-frame or disconnected.

# Framing state machine

While connected, bits are consumed by a small flat state machine
(`Phase`) rather than a family of enum variants carrying their own data:
a command byte is always 8 bits, a payload is `total_bytes` bytes, and a
trailer is always 4 bits, so the per-phase bookkeeping is just a couple of
counters. This mirrors the teacher's own cycle-counter style in
`cpu/cycles.rs` rather than building a deep hierarchy of framing types for
what is, underneath, one linear bit counter.

# Pipeline

R.DATA and the read triggered by W.ADDR.R both land their result in `buff`
(not `data` — `data` is the write-payload staging register). R.DATA
returns whatever is currently in `buff`, *then* issues the next read; under
a zero-wait-state bus that next read resolves before the following command
even starts, which is what lets back-to-back R.DATA calls observe
one-address-behind results exactly as the reference testbench does.
*/

use crate::bus::{BusCompletion, DownstreamBus, PendingOp};
use crate::command::{Command, Direction};
use crate::config::DtmConfig;
use crate::csr::Csr;
use crate::error::DtmError;
use crate::link::{ConnectDetector, LinkState};

/// What the core drives onto the wire this edge, plus observable status.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WireEvent {
    /// The bit to drive onto DO, meaningful only when `doe` is set.
    pub do_bit: bool,
    /// Output-enable for DO; `false` means the core is not driving (Hi-Z).
    pub doe: bool,
    pub host_connected: bool,
    /// Mirrors CSR.NDTMRESET: the core is requesting an external self-reset.
    pub ndtmreset_req: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    Command,
    RxPayload,
    RxTrailer,
    TxPayload,
    TxTrailer,
}

pub struct Dtm {
    config: DtmConfig,
    csr: Csr,
    addr: u64,
    data: u32,
    buff: u32,
    link_state: LinkState,
    connect_detector: ConnectDetector,
    pending: PendingOp,

    phase: Phase,
    cmd: Option<Command>,
    shift_acc: u8,
    bit_count: u8,
    value: u64,
    total_bytes: usize,
    bytes_done: usize,
    parity_acc: u8,
    trailer_step: u8,
    tx_parity_bit: bool,
}

impl Dtm {
    pub fn new(config: DtmConfig) -> Result<Self, DtmError> {
        config.validate()?;
        let csr = Csr::at_reset(config.asize, config.mdropaddr_reset);
        Ok(Self {
            config,
            csr,
            addr: 0,
            data: 0,
            buff: 0,
            link_state: LinkState::Disconnected,
            connect_detector: ConnectDetector::new(),
            pending: PendingOp::None,
            phase: Phase::Command,
            cmd: None,
            shift_acc: 0,
            bit_count: 0,
            value: 0,
            total_bytes: 0,
            bytes_done: 0,
            parity_acc: 1,
            trailer_step: 0,
            tx_parity_bit: false,
        })
    }

    /// Asserting DRST_N low: clears every register, including sticky CSR
    /// bits and any outstanding bus transaction, back to the reset state.
    pub fn reset(&mut self) {
        self.csr = Csr::at_reset(self.config.asize, self.config.mdropaddr_reset);
        self.addr = 0;
        self.data = 0;
        self.buff = 0;
        self.link_state = LinkState::Disconnected;
        self.connect_detector.reset();
        self.pending = PendingOp::None;
        self.enter_command_phase();
    }

    pub fn host_connected(&self) -> bool {
        self.link_state == LinkState::Connected
    }

    pub fn csr_value(&self) -> u32 {
        self.csr.bits()
    }

    pub fn addr_value(&self) -> u64 {
        self.addr
    }

    /// Advance the core by one host clock rising edge, sampling `di` and
    /// `ndtmresetack`, and servicing the downstream bus through `bus`.
    pub fn rising_edge(&mut self, di: bool, ndtmresetack: bool, bus: &mut dyn DownstreamBus) -> WireEvent {
        self.csr.set_ndtmresetack(ndtmresetack);

        // The bus runs independent of the host clock; service it regardless
        // of link state so a transaction outstanding across a disconnect can
        // still complete.
        self.poll_bus(bus);

        let (do_bit, doe) = if self.link_state == LinkState::Connected {
            self.tick_frame(di, bus)
        } else {
            self.connect_detector.push(di);
            if self.connect_detector.matches(self.csr.mdropaddr()) {
                self.link_state = LinkState::Connected;
                // A fresh connection clears any in-flight bus op but leaves
                // ADDR/DATA/BUFF/CSR sticky bits untouched.
                self.pending = PendingOp::None;
                self.csr.set_busy(false);
                self.enter_command_phase();
            }
            (false, false)
        };

        WireEvent {
            do_bit,
            doe,
            host_connected: self.host_connected(),
            ndtmreset_req: self.csr.contains(Csr::NDTMRESET),
        }
    }

    fn enter_command_phase(&mut self) {
        self.phase = Phase::Command;
        self.cmd = None;
        self.shift_acc = 0;
        self.bit_count = 0;
    }

    fn tick_frame(&mut self, di: bool, bus: &mut dyn DownstreamBus) -> (bool, bool) {
        match self.phase {
            Phase::Command => {
                self.shift_acc = (self.shift_acc << 1) | u8::from(di);
                self.bit_count += 1;
                if self.bit_count == 8 {
                    self.finish_command_byte(bus);
                }
                (false, false)
            }
            Phase::RxPayload => {
                self.shift_acc = (self.shift_acc << 1) | u8::from(di);
                self.parity_acc ^= u8::from(di);
                self.bit_count += 1;
                if self.bit_count == 8 {
                    self.value |= u64::from(self.shift_acc) << (8 * self.bytes_done);
                    self.bytes_done += 1;
                    self.bit_count = 0;
                    self.shift_acc = 0;
                    if self.bytes_done == self.total_bytes {
                        self.phase = Phase::RxTrailer;
                        self.trailer_step = 0;
                    }
                }
                (false, false)
            }
            Phase::RxTrailer => {
                match self.trailer_step {
                    0 => {
                        let parity_ok = u8::from(di) == self.parity_acc & 1;
                        if !parity_ok {
                            self.on_parity_fail();
                            return (false, false);
                        }
                        self.trailer_step = 1;
                    }
                    1 => self.trailer_step = 2,
                    2 => self.trailer_step = 3,
                    _ => {
                        self.dispatch_write_command(bus);
                        self.enter_command_phase();
                    }
                }
                (false, false)
            }
            Phase::TxPayload => {
                let byte = ((self.value >> (8 * self.bytes_done)) & 0xFF) as u8;
                let bit = (byte >> (7 - self.bit_count)) & 1 == 1;
                self.parity_acc ^= u8::from(bit);
                self.bit_count += 1;
                if self.bit_count == 8 {
                    self.bytes_done += 1;
                    self.bit_count = 0;
                    if self.bytes_done == self.total_bytes {
                        self.phase = Phase::TxTrailer;
                        self.trailer_step = 0;
                        self.tx_parity_bit = (self.parity_acc & 1) == 1;
                    }
                }
                (bit, true)
            }
            Phase::TxTrailer => match self.trailer_step {
                0 => {
                    self.trailer_step = 1;
                    (self.tx_parity_bit, true)
                }
                1 => {
                    self.trailer_step = 2;
                    (false, false)
                }
                2 => {
                    self.trailer_step = 3;
                    (false, false)
                }
                _ => {
                    self.enter_command_phase();
                    (false, false)
                }
            },
        }
    }

    fn finish_command_byte(&mut self, bus: &mut dyn DownstreamBus) {
        let byte = self.shift_acc;
        let start = (byte >> 7) & 1;
        let cmd_bits = (byte >> 3) & 0xF;
        let parity_bit = (byte >> 2) & 1;
        let expected_parity = start ^ ((cmd_bits >> 3) & 1) ^ ((cmd_bits >> 2) & 1) ^ ((cmd_bits >> 1) & 1) ^ (cmd_bits & 1);
        if parity_bit != expected_parity {
            self.on_parity_fail();
            return;
        }

        match Command::decode(cmd_bits) {
            None => self.enter_command_phase(),
            Some(Command::Disconnect) => {
                self.link_state = LinkState::Disconnected;
            }
            Some(cmd) => match cmd.direction() {
                Direction::None => unreachable!("Disconnect handled above"),
                Direction::HostToDtm => {
                    self.cmd = Some(cmd);
                    self.total_bytes = cmd.payload_bytes(self.csr.asize());
                    self.bytes_done = 0;
                    self.bit_count = 0;
                    self.shift_acc = 0;
                    self.value = 0;
                    self.parity_acc = 1;
                    self.phase = Phase::RxPayload;
                }
                Direction::DtmToHost => {
                    self.value = self.compute_read_value(cmd, bus);
                    self.total_bytes = cmd.payload_bytes(self.csr.asize());
                    self.bytes_done = 0;
                    self.bit_count = 0;
                    self.parity_acc = 1;
                    self.phase = Phase::TxPayload;
                }
            },
        }
    }

    fn on_parity_fail(&mut self) {
        self.link_state = LinkState::Disconnected;
        self.csr.set_eparity();
    }

    fn compute_read_value(&mut self, cmd: Command, bus: &mut dyn DownstreamBus) -> u64 {
        match cmd {
            Command::ReadIdcode => u64::from(self.config.idcode),
            Command::ReadCsr => u64::from(self.csr.bits()),
            Command::ReadAddr => self.addr,
            Command::ReadBuff => u64::from(self.buff),
            Command::ReadData => {
                let ret = self.buff;
                if self.issue_bus_read(bus, self.addr) && self.csr.aincr() {
                    self.advance_addr();
                }
                u64::from(ret)
            }
            _ => unreachable!("not a read-direction command"),
        }
    }

    fn dispatch_write_command(&mut self, bus: &mut dyn DownstreamBus) {
        match self.cmd.expect("RxPayload always has a command") {
            Command::WriteCsr => self.csr.apply_write(self.value as u32),
            Command::WriteAddr => {
                self.addr = self.value & self.config.addr_mask();
            }
            Command::WriteAddrTriggerRead => {
                self.addr = self.value & self.config.addr_mask();
                if self.issue_bus_read(bus, self.addr) && self.csr.aincr() {
                    self.advance_addr();
                }
            }
            Command::WriteData => {
                let value = self.value as u32;
                if self.issue_bus_write(bus, self.addr, value) {
                    self.data = value;
                    if self.csr.aincr() {
                        self.advance_addr();
                    }
                }
            }
            other => unreachable!("{other:?} is not a host->DTM command"),
        }
    }

    fn advance_addr(&mut self) {
        let word_bytes = self.config.addr_width_bytes();
        self.addr = self.addr.wrapping_add(word_bytes) & self.config.addr_mask();
    }

    /// Attempts to issue a bus read, returning whether it was actually
    /// dispatched. `false` means a transaction was already outstanding: CSR.EBUSY
    /// is set and the request is dropped silently, per §4.6/§7 — callers must not
    /// apply any other side effect (ADDR advance, DATA capture) of the dropped command.
    fn issue_bus_read(&mut self, bus: &mut dyn DownstreamBus, addr: u64) -> bool {
        if self.pending.is_outstanding() {
            self.csr.set_ebusy();
            return false;
        }
        self.pending = PendingOp::Read { addr };
        self.csr.set_busy(true);
        self.poll_bus(bus);
        true
    }

    /// As [`Dtm::issue_bus_read`], for writes.
    fn issue_bus_write(&mut self, bus: &mut dyn DownstreamBus, addr: u64, data: u32) -> bool {
        if self.pending.is_outstanding() {
            self.csr.set_ebusy();
            return false;
        }
        self.pending = PendingOp::Write { addr, data };
        self.csr.set_busy(true);
        self.poll_bus(bus);
        true
    }

    fn poll_bus(&mut self, bus: &mut dyn DownstreamBus) {
        let Some(request) = self.pending.as_request() else {
            return;
        };
        if let Some(completion) = bus.poll(request) {
            self.apply_completion(completion);
            self.pending = PendingOp::None;
            self.csr.set_busy(false);
        }
    }

    fn apply_completion(&mut self, completion: BusCompletion) {
        if matches!(self.pending, PendingOp::Read { .. }) {
            self.buff = completion.read_data;
            self.data = completion.read_data;
        }
        if completion.slverr {
            self.csr.set_ebusfault();
        }
    }
}
