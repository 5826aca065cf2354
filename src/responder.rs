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

//! First handshake - the device answers the master's session initiation

use std::marker::PhantomData;
use crate::crc;
use crate::frame;
use crate::protocol::*;
use crate::serial::SerialPort;
use crate::wait;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug)]
pub enum ResponderError {
    Io(std::io::Error),
    HandshakeTimeout(&'static str),
    MalformedFrame,
    ChecksumMismatch { received: u16, computed: u16 },
    HandshakeComplete,
}

impl std::fmt::Display for ResponderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponderError::Io(e) => write!(f, "I/O error: {}", e),
            ResponderError::HandshakeTimeout(what) => write!(f, "{}", what),
            ResponderError::MalformedFrame => write!(f, "invalid message format received"),
            ResponderError::ChecksumMismatch { received, computed } => {
                write!(f, "CRC mismatch (received {:04x}, calculated {:04x})", received, computed)
            }
            ResponderError::HandshakeComplete => write!(f, "Handshake complete"),
        }
    }
}

impl std::error::Error for ResponderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResponderError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ResponderError {
    fn from(err: std::io::Error) -> Self {
        ResponderError::Io(err)
    }
}

// ============================================================================
// States
// ============================================================================

pub struct WaitEnq;
pub struct SendAck0;
pub struct ReadBody;
pub struct VerifyCrc;
pub struct SendAck1;
pub struct WaitEot;

// ============================================================================
// FSM Structure
// ============================================================================

pub struct ResponderFsm<'a, State> {
    state: PhantomData<State>,
    serial: &'a mut dyn SerialPort,
    body: Vec<u8>,
    crc_received: u16,
    debug: bool,
}

// ============================================================================
// Trait
// ============================================================================

pub trait ResponderState<'a> {
    fn step(self: Box<Self>) -> Result<Box<dyn ResponderState<'a> + 'a>, ResponderError>;
}

// ============================================================================
// Helper to transition states
// ============================================================================

impl<'a, S> ResponderFsm<'a, S> {
    fn transition<T>(self) -> Box<ResponderFsm<'a, T>> {
        Box::new(ResponderFsm {
            state: PhantomData,
            serial: self.serial,
            body: self.body,
            crc_received: self.crc_received,
            debug: self.debug,
        })
    }

    fn io_error(&self, e: std::io::Error) -> ResponderError {
        let type_name = std::any::type_name::<S>();
        let state_name = type_name.split("::").last().unwrap_or(type_name);
        ResponderError::Io(std::io::Error::new(
            e.kind(),
            format!("{} (in state: {})", e, state_name)
        ))
    }
}

// ============================================================================
// State Implementations
// ============================================================================

impl<'a> ResponderState<'a> for ResponderFsm<'a, WaitEnq> {
    fn step(self: Box<Self>) -> Result<Box<dyn ResponderState<'a> + 'a>, ResponderError> {
        let mut fsm = *self;
        println!("Waiting for ENQ...");
        match wait::wait_for_enq(fsm.serial, fsm.debug) {
            Ok(true) => {
                let next = fsm.transition::<SendAck0>();
                Ok(next as Box<dyn ResponderState<'a> + 'a>)
            }
            Ok(false) => Err(ResponderError::HandshakeTimeout("ENQ not received")),
            Err(e) => Err(fsm.io_error(e)),
        }
    }
}

impl<'a> ResponderState<'a> for ResponderFsm<'a, SendAck0> {
    fn step(self: Box<Self>) -> Result<Box<dyn ResponderState<'a> + 'a>, ResponderError> {
        let mut fsm = *self;
        fsm.serial.write_all(&ACK0)?;
        if fsm.debug { println!("Sent: ACK0"); }

        // Slow masters need a beat before they start talking again.
        std::thread::sleep(DEX_DELAY);

        let next = fsm.transition::<ReadBody>();
        Ok(next as Box<dyn ResponderState<'a> + 'a>)
    }
}

impl<'a> ResponderState<'a> for ResponderFsm<'a, ReadBody> {
    fn step(self: Box<Self>) -> Result<Box<dyn ResponderState<'a> + 'a>, ResponderError> {
        let mut fsm = *self;

        // Accumulate the operation request byte by byte until the DLE+ETX
        // suffix closes it.
        fsm.body.clear();
        loop {
            let mut buf = [0u8; 1];
            match fsm.serial.read_timeout(&mut buf, REPLY_TIMEOUT) {
                Ok(0) => continue,
                Ok(_) => {
                    fsm.body.push(buf[0]);
                    if frame::ends_with(&fsm.body, ETX) {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    return Err(ResponderError::MalformedFrame);
                }
                Err(e) => return Err(fsm.io_error(e)),
            }
        }

        // The two CRC bytes follow the suffix, little-endian.
        let mut crc = [0u8; 2];
        let mut have = 0;
        while have < 2 {
            match fsm.serial.read_timeout(&mut crc[have..], REPLY_TIMEOUT) {
                Ok(0) => continue,
                Ok(n) => have += n,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    return Err(ResponderError::MalformedFrame);
                }
                Err(e) => return Err(fsm.io_error(e)),
            }
        }
        fsm.crc_received = u16::from_le_bytes(crc);

        if fsm.debug {
            println!("Received: {} body bytes, CRC {:04x}", fsm.body.len(), fsm.crc_received);
        }

        let next = fsm.transition::<VerifyCrc>();
        Ok(next as Box<dyn ResponderState<'a> + 'a>)
    }
}

impl<'a> ResponderState<'a> for ResponderFsm<'a, VerifyCrc> {
    fn step(self: Box<Self>) -> Result<Box<dyn ResponderState<'a> + 'a>, ResponderError> {
        let fsm = *self;

        let computed = crc::crc_received_handshake(&fsm.body);
        println!("Received CRC: {:04x}, calculated CRC: {:04x}", fsm.crc_received, computed);

        if fsm.crc_received != computed {
            return Err(ResponderError::ChecksumMismatch {
                received: fsm.crc_received,
                computed,
            });
        }

        let next = fsm.transition::<SendAck1>();
        Ok(next as Box<dyn ResponderState<'a> + 'a>)
    }
}

impl<'a> ResponderState<'a> for ResponderFsm<'a, SendAck1> {
    fn step(self: Box<Self>) -> Result<Box<dyn ResponderState<'a> + 'a>, ResponderError> {
        let mut fsm = *self;
        fsm.serial.write_all(&ACK1)?;
        if fsm.debug { println!("Sent: ACK1"); }
        let next = fsm.transition::<WaitEot>();
        Ok(next as Box<dyn ResponderState<'a> + 'a>)
    }
}

impl<'a> ResponderState<'a> for ResponderFsm<'a, WaitEot> {
    fn step(self: Box<Self>) -> Result<Box<dyn ResponderState<'a> + 'a>, ResponderError> {
        let mut fsm = *self;
        match wait::wait_for_eot(fsm.serial, fsm.debug) {
            Ok(true) => {
                std::thread::sleep(DEX_DELAY);
                Err(ResponderError::HandshakeComplete)
            }
            Ok(false) => Err(ResponderError::HandshakeTimeout("EOT not received")),
            Err(e) => Err(fsm.io_error(e)),
        }
    }
}

// ============================================================================
// Constructor
// ============================================================================

impl<'a> ResponderFsm<'a, WaitEnq> {
    pub fn new(serial: &'a mut dyn SerialPort, debug: bool) -> Box<dyn ResponderState<'a> + 'a> {
        Box::new(ResponderFsm {
            state: PhantomData::<WaitEnq>,
            serial,
            body: Vec::new(),
            crc_received: 0,
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

    fn run<'a>(mut state: Box<dyn ResponderState<'a> + 'a>) -> Result<(), ResponderError> {
        loop {
            match state.step() {
                Ok(next) => state = next,
                Err(ResponderError::HandshakeComplete) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    // A plausible master operation request with its CRC (DLE and SOH bytes
    // excluded from the fold).
    const MASTER_BODY: &[u8] = b"\x10\x01DDC0010001RR01L01\x10\x03";
    const MASTER_CRC_LE: [u8; 2] = [0x3F, 0x90];

    fn scripted(extra: &[Option<u8>]) -> Vec<Option<u8>> {
        let mut responses = vec![Some(ENQ)];
        responses.extend(MASTER_BODY.iter().map(|&b| Some(b)));
        responses.extend(MASTER_CRC_LE.iter().map(|&b| Some(b)));
        responses.extend_from_slice(extra);
        responses
    }

    #[test]
    fn test_responder_full_handshake() {
        let responses = scripted(&[Some(EOT)]);
        let mut expected_writes = ACK0.to_vec();
        expected_writes.extend_from_slice(&ACK1);

        let mut mock = MockSerialPort::new(responses, expected_writes);
        let state = ResponderFsm::new(&mut mock, true);
        run(state).expect("handshake should complete");
    }

    #[test]
    fn test_responder_rejects_bad_crc() {
        // One bit flipped in the received CRC. No ACK1 goes out.
        let mut responses = vec![Some(ENQ)];
        responses.extend(MASTER_BODY.iter().map(|&b| Some(b)));
        responses.push(Some(MASTER_CRC_LE[0] ^ 0x01));
        responses.push(Some(MASTER_CRC_LE[1]));

        let mut mock = MockSerialPort::new(responses, ACK0.to_vec());
        let state = ResponderFsm::new(&mut mock, false);
        match run(state) {
            Err(ResponderError::ChecksumMismatch { received, computed }) => {
                assert_ne!(received, computed);
                assert_eq!(computed, 0x903F);
            }
            other => panic!("Expected checksum mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_responder_enq_timeout() {
        let mut mock = MockSerialPort::new(vec![], vec![]);
        let state = ResponderFsm::new(&mut mock, false);
        match run(state) {
            Err(ResponderError::HandshakeTimeout(_)) => {}
            other => panic!("Expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_responder_truncated_body() {
        // Suffix never arrives; the read must fail, not hang.
        let responses = vec![Some(ENQ), Some(b'D'), Some(b'X')];
        let mut mock = MockSerialPort::new(responses, ACK0.to_vec());
        let state = ResponderFsm::new(&mut mock, false);
        match run(state) {
            Err(ResponderError::MalformedFrame) => {}
            other => panic!("Expected malformed frame, got {:?}", other),
        }
    }

    #[test]
    fn test_responder_eot_timeout() {
        let responses = scripted(&[]);
        let mut expected_writes = ACK0.to_vec();
        expected_writes.extend_from_slice(&ACK1);

        let mut mock = MockSerialPort::new(responses, expected_writes);
        let state = ResponderFsm::new(&mut mock, false);
        match run(state) {
            Err(ResponderError::HandshakeTimeout(_)) => {}
            other => panic!("Expected timeout, got {:?}", other),
        }
    }
}
