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

//! Control-byte framing for handshake messages and data lines

use crate::protocol::*;

/// Wrap a handshake payload: DLE+SOH prefix, DLE+ETX suffix.
pub fn handshake_body(payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(payload.len() + 4);
    body.extend_from_slice(&[DLE, SOH]);
    body.extend_from_slice(payload);
    body.extend_from_slice(&[DLE, ETX]);
    body
}

/// The ident message for the second handshake: communication ID, the
/// literal 'R', and the revision level.
pub fn ident_body() -> Vec<u8> {
    let mut payload = Vec::with_capacity(COMMUNICATION_ID.len() + 1 + REVISION_LEVEL.len());
    payload.extend_from_slice(COMMUNICATION_ID);
    payload.push(b'R');
    payload.extend_from_slice(REVISION_LEVEL);
    handshake_body(&payload)
}

/// Build the body of one data line: trimmed text re-terminated with CRLF,
/// then DLE+ETX on the final line or DLE+ETB on any other.
pub fn data_line_body(line: &str, is_last: bool) -> Vec<u8> {
    let mut body = line.trim().as_bytes().to_vec();
    body.extend_from_slice(b"\r\n");
    body.push(DLE);
    body.push(if is_last { ETX } else { ETB });
    body
}

/// Wrap a data line body for the wire: DLE+STX prefix, little-endian CRC
/// suffix. Data lines carry no DLE+SOH header.
pub fn data_line_frame(body: &[u8], crc: u16) -> Vec<u8> {
    let mut frame = Vec::with_capacity(body.len() + 4);
    frame.extend_from_slice(&[DLE, STX]);
    frame.extend_from_slice(body);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// True when the buffer ends with the two-byte DLE+terminator suffix.
pub fn ends_with(buf: &[u8], terminator: u8) -> bool {
    buf.len() >= 2 && buf[buf.len() - 2..] == [DLE, terminator]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc;

    #[test]
    fn test_ident_body_bytes() {
        assert_eq!(
            ident_body(),
            b"\x10\x01SWR0010001RR01L01\x10\x03".to_vec()
        );
    }

    #[test]
    fn test_ident_message_crc() {
        // The full second-handshake message, byte for byte.
        let body = ident_body();
        let crc = crc::crc_outgoing_handshake(&body);
        assert_eq!(crc, 0x026B);

        let mut message = body;
        message.extend_from_slice(&crc.to_le_bytes());
        assert_eq!(
            message,
            b"\x10\x01SWR0010001RR01L01\x10\x03\x6B\x02".to_vec()
        );
    }

    #[test]
    fn test_data_line_body_suffixes() {
        assert_eq!(data_line_body("A1B2", false), b"A1B2\r\n\x10\x17".to_vec());
        assert_eq!(data_line_body("A1B2", true), b"A1B2\r\n\x10\x03".to_vec());
    }

    #[test]
    fn test_data_line_body_normalizes_line_endings() {
        // Stored line endings and stray whitespace are replaced by one CRLF.
        assert_eq!(
            data_line_body("A1B2\r\n", true),
            data_line_body("A1B2", true)
        );
        assert_eq!(
            data_line_body("  A1B2\n", true),
            data_line_body("A1B2", true)
        );
    }

    #[test]
    fn test_data_line_frame_layout() {
        let body = data_line_body("A1B2", false);
        let crc = crc::crc_outgoing_line(&body);
        assert_eq!(crc, 0xFFF4);
        assert_eq!(
            data_line_frame(&body, crc),
            b"\x10\x02A1B2\r\n\x10\x17\xF4\xFF".to_vec()
        );
    }

    #[test]
    fn test_ends_with() {
        assert!(ends_with(b"abc\x10\x03", ETX));
        assert!(ends_with(b"abc\x10\x17", ETB));
        assert!(!ends_with(b"abc\x10\x03", ETB));
        assert!(!ends_with(b"\x03", ETX));
        assert!(!ends_with(b"", ETX));
    }
}
