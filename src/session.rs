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

//! Session stage runners
//!
//! Each runner loops its state machine to completion and collapses the
//! result into a [`SessionOutcome`] for the outer driver. Failures only end
//! the current cycle; nothing carries over to the next one.

use crate::initiator::{InitiatorError, InitiatorFsm};
use crate::responder::{ResponderError, ResponderFsm};
use crate::serial::SerialPort;
use crate::transfer::{TransferError, TransferFsm};

/// What a protocol stage came to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    TimedOut,
    ProtocolError,
}

/// Run the first handshake (responder role) to completion.
pub fn first_handshake(serial: &mut dyn SerialPort, debug: bool) -> SessionOutcome {
    let mut state = ResponderFsm::new(serial, debug);
    loop {
        match state.step() {
            Ok(next) => state = next,
            Err(ResponderError::HandshakeComplete) => return SessionOutcome::Completed,
            Err(e @ ResponderError::HandshakeTimeout(_)) => {
                println!("First Handshake Error: {}", e);
                return SessionOutcome::TimedOut;
            }
            Err(e) => {
                println!("First Handshake Error: {}", e);
                return SessionOutcome::ProtocolError;
            }
        }
    }
}

/// Run the second handshake (initiator role) to completion.
pub fn second_handshake(serial: &mut dyn SerialPort, debug: bool) -> SessionOutcome {
    let mut state = InitiatorFsm::new(serial, debug);
    loop {
        match state.step() {
            Ok(next) => state = next,
            Err(InitiatorError::HandshakeComplete) => return SessionOutcome::Completed,
            Err(e @ InitiatorError::HandshakeTimeout(_)) => {
                println!("Second Handshake Error: {}", e);
                return SessionOutcome::TimedOut;
            }
            Err(e) => {
                println!("Second Handshake Error: {}", e);
                return SessionOutcome::ProtocolError;
            }
        }
    }
}

/// Run the data transfer to completion. Abandoned lines are reported but do
/// not fail the transfer.
pub fn transfer_payload(
    serial: &mut dyn SerialPort,
    lines: Vec<String>,
    debug: bool,
) -> SessionOutcome {
    let mut state = TransferFsm::new(serial, lines, debug);
    loop {
        match state.step() {
            Ok(next) => state = next,
            Err(TransferError::TransferComplete(abandoned)) => {
                if abandoned > 0 {
                    println!("Transfer finished with {} abandoned line(s)", abandoned);
                }
                return SessionOutcome::Completed;
            }
            Err(e @ TransferError::LinkTimeout) => {
                println!("Transfer Error: {}", e);
                return SessionOutcome::TimedOut;
            }
            Err(e) => {
                println!("Transfer Error: {}", e);
                return SessionOutcome::ProtocolError;
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::*;
    use crate::serial::MockSerialPort;

    #[test]
    fn test_full_session_cycle() {
        // Master side of a complete cycle: first handshake, second
        // handshake, then acknowledgment of two data lines.
        let mut responses = vec![Some(ENQ)];
        responses.extend(b"\x10\x01DDC0010001RR01L01\x10\x03".iter().map(|&b| Some(b)));
        responses.push(Some(0x3F));                  // body CRC, little-endian
        responses.push(Some(0x90));
        responses.push(Some(EOT));

        responses.extend([Some(DLE), Some(0x30)]);   // ACK0 for our ENQ
        responses.extend([Some(DLE), Some(0x31)]);   // ACK1 for our ident

        responses.extend([Some(DLE), Some(0x30)]);   // ACK0 opening the transfer
        responses.extend([Some(DLE), Some(0x30)]);   // line 0 accepted
        responses.extend([Some(DLE), Some(0x31)]);   // line 1 accepted

        let mut expected_writes = ACK0.to_vec();
        expected_writes.extend_from_slice(&ACK1);
        expected_writes.push(ENQ);
        expected_writes.extend_from_slice(b"\x10\x01SWR0010001RR01L01\x10\x03\x6B\x02");
        expected_writes.push(EOT);
        expected_writes.push(ENQ);
        expected_writes.extend_from_slice(b"\x10\x02A1B2\r\n\x10\x17\xF4\xFF");
        expected_writes.extend_from_slice(b"\x10\x02C3D4\r\n\x10\x03\x5E\x5A");

        let mut mock = MockSerialPort::new(responses, expected_writes);
        let lines = vec!["A1B2".to_string(), "C3D4".to_string()];

        assert_eq!(first_handshake(&mut mock, true), SessionOutcome::Completed);
        assert_eq!(second_handshake(&mut mock, true), SessionOutcome::Completed);
        assert_eq!(transfer_payload(&mut mock, lines, true), SessionOutcome::Completed);
    }

    #[test]
    fn test_first_handshake_crc_failure_is_protocol_error() {
        let mut responses = vec![Some(ENQ)];
        responses.extend(b"\x10\x01DDC0010001RR01L01\x10\x03".iter().map(|&b| Some(b)));
        responses.push(Some(0x3E));                  // flipped low CRC bit
        responses.push(Some(0x90));

        let mut mock = MockSerialPort::new(responses, ACK0.to_vec());
        assert_eq!(first_handshake(&mut mock, false), SessionOutcome::ProtocolError);
    }

    #[test]
    fn test_second_handshake_timeout() {
        let mut mock = MockSerialPort::new(vec![], vec![ENQ]);
        assert_eq!(second_handshake(&mut mock, false), SessionOutcome::TimedOut);
    }
}
