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

//! DEX CRC16 engine
//!
//! The checksum is folded bit by bit, LSB first, with feedback taken from
//! bits 0, 1 and 14 of the running state. Keep the bit operations exactly as
//! written; real DEX masters reject anything else.

use crate::protocol::{DLE, SOH};

/// Fold one byte into the running CRC state.
pub fn crc16_step(mut crc: u16, byte: u8) -> u16 {
    for bit in 0..8 {
        let data_0 = u16::from((byte >> bit) & 0x01);
        let bcc_0 = crc & 0x01;
        let bcc_1 = (crc >> 1) & 0x01;
        let bcc_14 = (crc >> 14) & 0x01;
        let x16 = bcc_0 ^ data_0;
        let x15 = bcc_1 ^ x16;
        let x2 = bcc_14 ^ x16;
        crc >>= 1;
        crc &= 0x5FFE;
        crc |= x15;
        crc |= x2 << 13;
        crc |= x16 << 15;
    }
    crc
}

/// Fold a whole message from 0x0000, skipping bytes the exclusion
/// predicate rejects.
pub fn crc16_fold<F>(bytes: &[u8], excluded: F) -> u16
where
    F: Fn(u8) -> bool,
{
    bytes.iter().fold(0x0000, |crc, &byte| {
        if excluded(byte) {
            crc
        } else {
            crc16_step(crc, byte)
        }
    })
}

// The three exclusion rules below differ per direction and message kind.
// They are not interchangeable; each matches what the device on the other
// end of the line computes for that message.

/// CRC check for a received handshake message: DLE and SOH bytes are
/// excluded from the fold.
pub fn crc_received_handshake(body: &[u8]) -> u16 {
    crc16_fold(body, |byte| byte == DLE || byte == SOH)
}

/// CRC for an outgoing data line: only DLE bytes are excluded.
pub fn crc_outgoing_line(body: &[u8]) -> u16 {
    crc16_fold(body, |byte| byte == DLE)
}

/// CRC for the outgoing handshake ident message: no bytes are excluded.
pub fn crc_outgoing_handshake(body: &[u8]) -> u16 {
    crc16_fold(body, |_| false)
}

// ============================================================================
// Tests
// ============================================================================
