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

//! Deadline-bounded readers for handshake control bytes
//!
//! Each helper blocks until the wanted sequence arrives or its wall-clock
//! deadline passes, tolerating arbitrary inter-byte gaps from the remote
//! device. `Ok(false)` means the deadline expired; only non-timeout I/O
//! errors propagate.

use std::io;
use std::time::{Duration, Instant};
use crate::protocol::{ENQ, EOT, ENQ_TIMEOUT, REPLY_TIMEOUT};
use crate::serial::SerialPort;

/// Read single bytes until `wanted` is seen, discarding anything else.
pub fn wait_for_control(
    serial: &mut dyn SerialPort,
    wanted: u8,
    timeout: Duration,
    debug: bool,
) -> io::Result<bool> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(false);
        }

        let mut buf = [0u8; 1];
        match serial.read_timeout(&mut buf, remaining) {
            Ok(0) => continue,
            Ok(_) => {
                if debug { println!("Received: {:02X}", buf[0]); }
                if buf[0] == wanted {
                    return Ok(true);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(false),
            Err(e) => return Err(e),
        }
    }
}

/// Wait for the master's opening ENQ (long window; the master polls on its
/// own schedule).
pub fn wait_for_enq(serial: &mut dyn SerialPort, debug: bool) -> io::Result<bool> {
    wait_for_control(serial, ENQ, ENQ_TIMEOUT, debug)
}

/// Wait for the EOT that closes a handshake turn.
pub fn wait_for_eot(serial: &mut dyn SerialPort, debug: bool) -> io::Result<bool> {
    wait_for_control(serial, EOT, REPLY_TIMEOUT, debug)
}

/// Wait for a specific two-byte acknowledgment (ACK0 or ACK1), discarding
/// non-matching pairs until the deadline.
pub fn wait_for_ack(
    serial: &mut dyn SerialPort,
    expected: [u8; 2],
    debug: bool,
) -> io::Result<bool> {
    let deadline = Instant::now() + REPLY_TIMEOUT;
    let mut pair = [0u8; 2];
    let mut have = 0;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(false);
        }

        match serial.read_timeout(&mut pair[have..], remaining) {
            Ok(0) => continue,
            Ok(n) => {
                have += n;
                if have == 2 {
                    if debug { println!("Received: {:02X}{:02X}", pair[0], pair[1]); }
                    if pair == expected {
                        return Ok(true);
                    }
                    have = 0;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(false),
            Err(e) => return Err(e),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ACK0, ACK1, DLE};
    use crate::serial::MockSerialPort;

    #[test]
    fn test_wait_for_enq_skips_noise() {
        let mut mock = MockSerialPort::new(
            vec![Some(0xFF), Some(0x00), Some(ENQ)],
            vec![],
        );
        assert!(wait_for_enq(&mut mock, true).unwrap());
    }

    #[test]
    fn test_wait_for_enq_times_out() {
        let mut mock = MockSerialPort::new(vec![], vec![]);
        assert!(!wait_for_enq(&mut mock, false).unwrap());
    }

    #[test]
    fn test_wait_for_eot() {
        let mut mock = MockSerialPort::new(vec![Some(EOT)], vec![]);
        assert!(wait_for_eot(&mut mock, false).unwrap());
    }

    #[test]
    fn test_wait_for_ack_match() {
        let mut mock = MockSerialPort::new(
            vec![Some(DLE), Some(0x30)],
            vec![],
        );
        assert!(wait_for_ack(&mut mock, ACK0, false).unwrap());
    }

    #[test]
    fn test_wait_for_ack_discards_wrong_pair() {
        // ACK1 arrives first; only ACK0 satisfies the wait.
        let mut mock = MockSerialPort::new(
            vec![Some(DLE), Some(0x31), Some(DLE), Some(0x30)],
            vec![],
        );
        assert!(wait_for_ack(&mut mock, ACK0, true).unwrap());
    }

    #[test]
    fn test_wait_for_ack_times_out() {
        let mut mock = MockSerialPort::new(vec![], vec![]);
        assert!(!wait_for_ack(&mut mock, ACK1, false).unwrap());
    }
}
