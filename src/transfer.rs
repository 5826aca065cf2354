// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Audit data transfer - line-granular, NAK-retried, best effort
//!
//! A line with no ACK or NAK inside its reply window is logged and skipped,
//! not retried. That follows the shipped device behavior; whether it should
//! retry like the NAK path is an open product question.

use std::marker::PhantomData;
use std::time::Instant;
use crate::crc;
use crate::frame;
use crate::protocol::*;
use crate::serial::SerialPort;
use crate::wait;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug)]
pub enum TransferError {
    Io(std::io::Error),
    LinkTimeout,
    TransferComplete(usize),
}

impl std::fmt::Display for TransferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferError::Io(e) => write!(f, "I/O error: {}", e),
            TransferError::LinkTimeout => {
                write!(f, "ACK0 not received before sending the first line")
            }
            TransferError::TransferComplete(abandoned) => {
                write!(f, "Transfer complete ({} lines abandoned)", abandoned)
            }
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransferError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransferError {
    fn from(err: std::io::Error) -> Self {
        TransferError::Io(err)
    }
}

// ============================================================================
// States
// ============================================================================

pub struct OpenLink;
pub struct NextLine;
pub struct AwaitReply;

// ============================================================================
// FSM Structure
// ============================================================================

pub struct TransferFsm<'a, State> {
    state: PhantomData<State>,
    serial: &'a mut dyn SerialPort,
    lines: Vec<String>,
    line_idx: usize,
    wire_frame: Vec<u8>,
    abandoned: usize,
    debug: bool,
}

// ============================================================================
// Trait
// ============================================================================

pub trait TransferState<'a> {
    fn step(self: Box<Self>) -> Result<Box<dyn TransferState<'a> + 'a>, TransferError>;
}

// ============================================================================
// Helper to transition states
// ============================================================================

impl<'a, S> TransferFsm<'a, S> {
    fn transition<T>(self) -> Box<TransferFsm<'a, T>> {
        Box::new(TransferFsm {
            state: PhantomData,
            serial: self.serial,
            lines: self.lines,
            line_idx: self.line_idx,
            wire_frame: self.wire_frame,
            abandoned: self.abandoned,
            debug: self.debug,
        })
    }

    fn io_error(&self, e: std::io::Error) -> TransferError {
        let type_name = std::any::type_name::<S>();
        let state_name = type_name.split("::").last().unwrap_or(type_name);
        TransferError::Io(std::io::Error::new(
            e.kind(),
            format!("{} (in state: {})", e, state_name)
        ))
    }
}

// ============================================================================
// State Implementations
// ============================================================================

impl<'a> TransferState<'a> for TransferFsm<'a, OpenLink> {
    fn step(self: Box<Self>) -> Result<Box<dyn TransferState<'a> + 'a>, TransferError> {
        let mut fsm = *self;
        println!("Sending ENQ...");
        fsm.serial.write_all(&[ENQ])?;

        match wait::wait_for_ack(fsm.serial, ACK0, fsm.debug) {
            Ok(true) => {
                let next = fsm.transition::<NextLine>();
                Ok(next as Box<dyn TransferState<'a> + 'a>)
            }
            Ok(false) => Err(TransferError::LinkTimeout),
            Err(e) => Err(fsm.io_error(e)),
        }
    }
}

impl<'a> TransferState<'a> for TransferFsm<'a, NextLine> {
    fn step(self: Box<Self>) -> Result<Box<dyn TransferState<'a> + 'a>, TransferError> {
        let mut fsm = *self;

        if fsm.line_idx >= fsm.lines.len() {
            return Err(TransferError::TransferComplete(fsm.abandoned));
        }

        let is_last = fsm.line_idx == fsm.lines.len() - 1;
        let body = frame::data_line_body(&fsm.lines[fsm.line_idx], is_last);
        let crc = crc::crc_outgoing_line(&body);
        fsm.wire_frame = frame::data_line_frame(&body, crc);

        fsm.serial.write_all(&fsm.wire_frame)?;
        if fsm.debug {
            println!("Sent line {}: {:02X?}", fsm.line_idx, fsm.wire_frame);
        }

        let next = fsm.transition::<AwaitReply>();
        Ok(next as Box<dyn TransferState<'a> + 'a>)
    }
}

impl<'a> TransferState<'a> for TransferFsm<'a, AwaitReply> {
    fn step(self: Box<Self>) -> Result<Box<dyn TransferState<'a> + 'a>, TransferError> {
        let mut fsm = *self;

        // One reply window per line; NAK resends stay inside it.
        let deadline = Instant::now() + REPLY_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            let mut buf = [0u8; 1];
            match fsm.serial.read_timeout(&mut buf, remaining) {
                Ok(0) => continue,
                Ok(_) if buf[0] == NAK => {
                    println!("NAK received, resending line {}", fsm.line_idx);
                    fsm.serial.write_all(&fsm.wire_frame)?;
                    std::thread::sleep(DEX_DELAY);
                }
                Ok(_) if buf[0] == DLE => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    let mut second = [0u8; 1];
                    match fsm.serial.read_timeout(&mut second, remaining) {
                        Ok(0) => continue,
                        Ok(_) if second[0] == ACK0[1] || second[0] == ACK1[1] => {
                            if fsm.debug {
                                println!("Line {} accepted ({:02X}{:02X})",
                                         fsm.line_idx, buf[0], second[0]);
                            }
                            fsm.line_idx += 1;
                            let next = fsm.transition::<NextLine>();
                            return Ok(next as Box<dyn TransferState<'a> + 'a>);
                        }
                        Ok(_) => {
                            if fsm.debug {
                                println!("Unexpected reply: {:02X}{:02X}", buf[0], second[0]);
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                        Err(e) => return Err(fsm.io_error(e)),
                    }
                }
                Ok(_) => {
                    if fsm.debug { println!("Unexpected reply byte: {:02X}", buf[0]); }
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) => return Err(fsm.io_error(e)),
            }
        }

        // No ACK or NAK inside the window: skip this line and move on.
        println!("Error: no ACK or NAK for line {}, skipping", fsm.line_idx);
        fsm.abandoned += 1;
        fsm.line_idx += 1;
        let next = fsm.transition::<NextLine>();
        Ok(next as Box<dyn TransferState<'a> + 'a>)
    }
}

// ============================================================================
// Constructor
// ============================================================================

impl<'a> TransferFsm<'a, OpenLink> {
    pub fn new(
        serial: &'a mut dyn SerialPort,
        lines: Vec<String>,
        debug: bool,
    ) -> Box<dyn TransferState<'a> + 'a> {
        Box::new(TransferFsm {
            state: PhantomData::<OpenLink>,
            serial,
            lines,
            line_idx: 0,
            wire_frame: Vec::new(),
            abandoned: 0,
            debug,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::MockSerialPort;

    fn run<'a>(mut state: Box<dyn TransferState<'a> + 'a>) -> Result<usize, TransferError> {
        loop {
            match state.step() {
                Ok(next) => state = next,
                Err(TransferError::TransferComplete(abandoned)) => return Ok(abandoned),
                Err(e) => return Err(e),
            }
        }
    }

    fn line_frame(line: &str, is_last: bool) -> Vec<u8> {
        let body = frame::data_line_body(line, is_last);
        frame::data_line_frame(&body, crc::crc_outgoing_line(&body))
    }

    #[test]
    fn test_transfer_two_lines() {
        let responses = vec![
            Some(DLE), Some(0x30),   // ACK0 after ENQ
            Some(DLE), Some(0x30),   // line 0 accepted
            Some(DLE), Some(0x31),   // line 1 accepted
        ];

        // Non-final line gets DLE+ETB, final line DLE+ETX, CRCs byte-exact.
        let mut expected_writes = vec![ENQ];
        expected_writes.extend_from_slice(b"\x10\x02A1B2\r\n\x10\x17\xF4\xFF");
        expected_writes.extend_from_slice(b"\x10\x02C3D4\r\n\x10\x03\x5E\x5A");

        let mut mock = MockSerialPort::new(responses, expected_writes);
        let lines = vec!["A1B2".to_string(), "C3D4".to_string()];
        let state = TransferFsm::new(&mut mock, lines, true);
        assert_eq!(run(state).expect("transfer should complete"), 0);
    }

    #[test]
    fn test_transfer_nak_retransmits_identical_frame() {
        let responses = vec![
            Some(DLE), Some(0x30),   // ACK0 after ENQ
            Some(NAK),
            Some(NAK),
            Some(DLE), Some(0x30),   // accepted on the third copy
        ];

        let frame = line_frame("A1B2", true);
        let mut expected_writes = vec![ENQ];
        expected_writes.extend_from_slice(&frame);
        expected_writes.extend_from_slice(&frame);
        expected_writes.extend_from_slice(&frame);

        let mut mock = MockSerialPort::new(responses, expected_writes);
        let state = TransferFsm::new(&mut mock, vec!["A1B2".to_string()], false);
        assert_eq!(run(state).expect("transfer should complete"), 0);
    }

    #[test]
    fn test_transfer_timeout_skips_line_without_resend() {
        // Replies dry up after ACK0: both lines are sent exactly once and
        // abandoned.
        let responses = vec![Some(DLE), Some(0x30)];

        let mut expected_writes = vec![ENQ];
        expected_writes.extend_from_slice(&line_frame("A1B2", false));
        expected_writes.extend_from_slice(&line_frame("C3D4", true));

        let mut mock = MockSerialPort::new(responses, expected_writes);
        let lines = vec!["A1B2".to_string(), "C3D4".to_string()];
        let state = TransferFsm::new(&mut mock, lines, false);
        assert_eq!(run(state).expect("transfer should complete"), 2);
    }

    #[test]
    fn test_transfer_aborts_without_opening_ack0() {
        let mut mock = MockSerialPort::new(vec![], vec![ENQ]);
        let state = TransferFsm::new(&mut mock, vec!["A1B2".to_string()], false);
        match run(state) {
            Err(TransferError::LinkTimeout) => {}
            other => panic!("Expected link timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_transfer_empty_payload() {
        // Nothing to send, but the link is still opened.
        let responses = vec![Some(DLE), Some(0x30)];
        let mut mock = MockSerialPort::new(responses, vec![ENQ]);
        let state = TransferFsm::new(&mut mock, vec![], false);
        assert_eq!(run(state).expect("transfer should complete"), 0);
    }
}
