//! Test-only bit-stream helpers, mirroring the host-side helpers the
//! original C++ testbench keeps in `test/include/twd_util.h`: building a
//! connect sequence, shifting a command frame, and driving/sampling a DTM
//! instance through a whole transaction without every test re-deriving the
//! wire timing by hand.
//!
//! Kept in its own `#[cfg(test)]` module the way
//! `examples/thatnewyorker-Arness/src/test_utils/mod.rs` keeps its ROM
//! builders and bus fixtures out of the production build.

use crate::bus::{BusCompletion, BusRequest, DownstreamBus};
use crate::command::Command;
use crate::dtm::{Dtm, WireEvent};

/// A downstream slave with a fixed response latency, backed by a flat word
/// array. Reads/writes outside the array are accepted and simply discarded
/// (read as zero) unless `fault_addr` is set, in which case that one address
/// responds with PSLVERR.
pub struct FakeBus {
    memory: Vec<u32>,
    latency_cycles: u32,
    countdown: Option<u32>,
    fault_addr: Option<u64>,
    pub write_log: Vec<(u64, u32)>,
}

impl FakeBus {
    pub fn new(words: usize) -> Self {
        Self {
            memory: vec![0; words],
            latency_cycles: 0,
            countdown: None,
            fault_addr: None,
            write_log: Vec::new(),
        }
    }

    pub fn with_latency(mut self, cycles: u32) -> Self {
        self.latency_cycles = cycles;
        self
    }

    pub fn with_fault_at(mut self, addr: u64) -> Self {
        self.fault_addr = Some(addr);
        self
    }

    pub fn seed(&mut self, addr: u64, value: u32) {
        if let Some(slot) = self.memory.get_mut(addr as usize) {
            *slot = value;
        }
    }

    pub fn word_at(&self, addr: u64) -> u32 {
        self.memory.get(addr as usize).copied().unwrap_or(0)
    }
}

impl DownstreamBus for FakeBus {
    fn poll(&mut self, request: BusRequest) -> Option<BusCompletion> {
        let remaining = self.countdown.get_or_insert(self.latency_cycles);
        if *remaining > 0 {
            *remaining -= 1;
            return None;
        }
        self.countdown = None;

        let slverr = self.fault_addr == Some(request.addr);
        let read_data = match request.write_data {
            Some(data) => {
                if !slverr {
                    if let Some(slot) = self.memory.get_mut(request.addr as usize) {
                        *slot = data;
                    }
                    self.write_log.push((request.addr, data));
                }
                0
            }
            None => self.word_at(request.addr),
        };
        Some(BusCompletion { read_data, slverr })
    }
}

/// Clocks `dtm` for `n` idle edges (DI held low), discarding the outputs.
/// Used to let an outstanding bus transaction with nonzero latency resolve,
/// the same role `idle_clocks()` plays in `twd_util.h`.
pub fn idle_clocks(dtm: &mut Dtm, bus: &mut dyn DownstreamBus, n: usize) {
    for _ in 0..n {
        dtm.rising_edge(false, false, bus);
    }
}

fn put_bits(dtm: &mut Dtm, bus: &mut dyn DownstreamBus, value: u64, n_bits: usize) {
    for i in 0..n_bits {
        let bit = (value >> (n_bits - 1 - i)) & 1 == 1;
        dtm.rising_edge(bit, false, bus);
    }
}

fn put_byte_msb_first(dtm: &mut Dtm, bus: &mut dyn DownstreamBus, byte: u8) {
    put_bits(dtm, bus, u64::from(byte), 8);
}

/// Drives the 152-bit connect sequence addressed to `addr` (0..=15).
pub fn connect_target(dtm: &mut Dtm, bus: &mut dyn DownstreamBus, addr: u8) {
    const SYNC_AND_PATTERN: [u8; 9] = [0x00, 0xa7, 0xa3, 0x92, 0xdd, 0x9a, 0xbf, 0x04, 0x31];
    const ALL_ONES: [u8; 9] = [0xFF; 9];
    for &b in &SYNC_AND_PATTERN {
        put_byte_msb_first(dtm, bus, b);
    }
    for &b in &ALL_ONES {
        put_byte_msb_first(dtm, bus, b);
    }
    let addr_byte = (addr << 4) | (!addr & 0xF);
    put_byte_msb_first(dtm, bus, addr_byte);
}

fn command_byte(cmd_code: u8) -> u8 {
    let start = 1u8;
    let parity = start ^ ((cmd_code >> 3) & 1) ^ ((cmd_code >> 2) & 1) ^ ((cmd_code >> 1) & 1) ^ (cmd_code & 1);
    (start << 7) | ((cmd_code & 0xF) << 3) | (parity << 2)
}

/// Shifts a command frame whose parity bit is deliberately wrong, to drive
/// the cmd_parity_err scenario.
pub fn send_bad_parity_command(dtm: &mut Dtm, bus: &mut dyn DownstreamBus, cmd_code: u8) {
    let good = command_byte(cmd_code);
    let forced_bad = good ^ 0b0000_0100; // flip the parity bit
    put_byte_msb_first(dtm, bus, forced_bad);
}

fn read_payload(dtm: &mut Dtm, bus: &mut dyn DownstreamBus, n_bytes: usize) -> (u64, bool) {
    let mut value: u64 = 0;
    for byte_idx in 0..n_bytes {
        let mut byte = 0u8;
        for _ in 0..8 {
            let ev: WireEvent = dtm.rising_edge(false, false, bus);
            byte = (byte << 1) | u8::from(ev.do_bit && ev.doe);
        }
        value |= u64::from(byte) << (8 * byte_idx);
    }
    let parity_ev = dtm.rising_edge(false, false, bus);
    let observed_parity = parity_ev.do_bit && parity_ev.doe;
    // zero bit + two turnaround bits
    idle_clocks(dtm, bus, 3);
    (value, observed_parity)
}

fn write_payload(dtm: &mut Dtm, bus: &mut dyn DownstreamBus, value: u64, n_bytes: usize) {
    for byte_idx in 0..n_bytes {
        let byte = ((value >> (8 * byte_idx)) & 0xFF) as u8;
        put_byte_msb_first(dtm, bus, byte);
    }
    let mut parity = 1u8;
    for byte_idx in 0..n_bytes {
        let byte = ((value >> (8 * byte_idx)) & 0xFF) as u8;
        for b in 0..8 {
            parity ^= (byte >> (7 - b)) & 1;
        }
    }
    dtm.rising_edge(parity & 1 == 1, false, bus);
    idle_clocks(dtm, bus, 3);
}

/// Sends a read-direction command and returns its payload value (parity is
/// always checked by the test, not by the DTM, for DTM->host payloads).
fn do_read_command(dtm: &mut Dtm, bus: &mut dyn DownstreamBus, cmd: Command, n_bytes: usize) -> u64 {
    let code = command_code(cmd);
    put_byte_msb_first(dtm, bus, command_byte(code));
    let (value, _parity) = read_payload(dtm, bus, n_bytes);
    value
}

fn do_write_command(dtm: &mut Dtm, bus: &mut dyn DownstreamBus, cmd: Command, value: u64, n_bytes: usize) {
    let code = command_code(cmd);
    put_byte_msb_first(dtm, bus, command_byte(code));
    write_payload(dtm, bus, value, n_bytes);
}

fn command_code(cmd: Command) -> u8 {
    match cmd {
        Command::Disconnect => 0x0,
        Command::ReadIdcode => 0x1,
        Command::ReadCsr => 0x2,
        Command::WriteCsr => 0x3,
        Command::ReadAddr => 0x4,
        Command::WriteAddr => 0x5,
        Command::WriteAddrTriggerRead => 0x6,
        Command::ReadData => 0x7,
        Command::ReadBuff => 0x8,
        Command::WriteData => 0x9,
    }
}

pub fn read_idcode(dtm: &mut Dtm, bus: &mut dyn DownstreamBus) -> u32 {
    do_read_command(dtm, bus, Command::ReadIdcode, 4) as u32
}

pub fn read_csr(dtm: &mut Dtm, bus: &mut dyn DownstreamBus) -> u32 {
    do_read_command(dtm, bus, Command::ReadCsr, 4) as u32
}

pub fn write_csr(dtm: &mut Dtm, bus: &mut dyn DownstreamBus, value: u32) {
    do_write_command(dtm, bus, Command::WriteCsr, u64::from(value), 4);
}

pub fn read_addr(dtm: &mut Dtm, bus: &mut dyn DownstreamBus, asize: u8) -> u64 {
    do_read_command(dtm, bus, Command::ReadAddr, asize as usize + 1)
}

pub fn write_addr(dtm: &mut Dtm, bus: &mut dyn DownstreamBus, value: u64, asize: u8) {
    do_write_command(dtm, bus, Command::WriteAddr, value, asize as usize + 1);
}

pub fn write_addr_trigger_read(dtm: &mut Dtm, bus: &mut dyn DownstreamBus, value: u64, asize: u8) {
    do_write_command(dtm, bus, Command::WriteAddrTriggerRead, value, asize as usize + 1);
}

pub fn read_data(dtm: &mut Dtm, bus: &mut dyn DownstreamBus) -> u32 {
    do_read_command(dtm, bus, Command::ReadData, 4) as u32
}

pub fn read_buff(dtm: &mut Dtm, bus: &mut dyn DownstreamBus) -> u32 {
    do_read_command(dtm, bus, Command::ReadBuff, 4) as u32
}

pub fn write_data(dtm: &mut Dtm, bus: &mut dyn DownstreamBus, value: u32) {
    do_write_command(dtm, bus, Command::WriteData, u64::from(value), 4);
}

pub fn disconnect(dtm: &mut Dtm, bus: &mut dyn DownstreamBus) {
    put_byte_msb_first(dtm, bus, command_byte(0x0));
}
