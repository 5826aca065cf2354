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

//! DEX/UCS protocol constants

use std::time::Duration;

/// Start of header - begins a handshake operation message
pub const SOH: u8 = 0x01;

/// Start of text - begins a data block
pub const STX: u8 = 0x02;

/// End of text - terminates the final block of a transmission
pub const ETX: u8 = 0x03;

/// End of transmission - closes a handshake turn
pub const EOT: u8 = 0x04;

/// Enquiry - requests the line from the other party
pub const ENQ: u8 = 0x05;

/// Data link escape - prefixes every two-byte control pair on the wire
pub const DLE: u8 = 0x10;

/// Negative acknowledge - receiver requests retransmission of a block
pub const NAK: u8 = 0x15;

/// End of transmission block - terminates a non-final data block
pub const ETB: u8 = 0x17;

/// Acknowledge 0 (DLE '0')
pub const ACK0: [u8; 2] = [DLE, 0x30];

/// Acknowledge 1 (DLE '1')
pub const ACK1: [u8; 2] = [DLE, 0x31];

/// Device communication ID sent verbatim in the second handshake
pub const COMMUNICATION_ID: &[u8] = b"SWR0010001";

/// Device revision level sent verbatim in the second handshake
pub const REVISION_LEVEL: &[u8] = b"R01L01";

/// How long the responder waits for the master's opening ENQ
pub const ENQ_TIMEOUT: Duration = Duration::from_secs(300);

/// How long any acknowledgment or other control byte may take
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause between protocol steps to accommodate slow devices
pub const DEX_DELAY: Duration = Duration::from_millis(50);

/// Pause after opening the port before starting a session cycle
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);
