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

//! Second handshake - the device takes the line and identifies itself

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
pub enum InitiatorError {
    Io(std::io::Error),
    HandshakeTimeout(&'static str),
    HandshakeComplete,
}

impl std::fmt::Display for InitiatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitiatorError::Io(e) => write!(f, "I/O error: {}", e),
            InitiatorError::HandshakeTimeout(what) => write!(f, "{}", what),
            InitiatorError::HandshakeComplete => write!(f, "Handshake complete"),
        }
    }
}

impl std::error::Error for InitiatorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InitiatorError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for InitiatorError {
    fn from(err: std::io::Error) -> Self {
        InitiatorError::Io(err)
    }
}

// ============================================================================
// States
// ============================================================================

pub struct SendEnq;
pub struct WaitAck0;
pub struct SendIdent;
pub struct WaitAck1;
pub struct SendEot;

// ============================================================================
// FSM Structure
// ============================================================================

pub struct InitiatorFsm<'a, State> {
    state: PhantomData<State>,
    serial: &'a mut dyn SerialPort,
    debug: bool,
}

// ============================================================================
// Trait
// ============================================================================

pub trait InitiatorState<'a> {
    fn step(self: Box<Self>) -> Result<Box<dyn InitiatorState<'a> + 'a>, InitiatorError>;
}

// ============================================================================
// Helper to transition states
// ============================================================================

impl<'a, S> InitiatorFsm<'a, S> {
    fn transition<T>(self) -> Box<InitiatorFsm<'a, T>> {
        Box::new(InitiatorFsm {
            state: PhantomData,
            serial: self.serial,
            debug: self.debug,
        })
    }

    fn io_error(&self, e: std::io::Error) -> InitiatorError {
        let type_name = std::any::type_name::<S>();
        let state_name = type_name.split("::").last().unwrap_or(type_name);
        InitiatorError::Io(std::io::Error::new(
            e.kind(),
            format!("{} (in state: {})", e, state_name)
        ))
    }
}

// ============================================================================
// State Implementations
// ============================================================================

impl<'a> InitiatorState<'a> for InitiatorFsm<'a, SendEnq> {
    fn step(self: Box<Self>) -> Result<Box<dyn InitiatorState<'a> + 'a>, InitiatorError> {
        let mut fsm = *self;
        println!("Sending ENQ...");
        fsm.serial.write_all(&[ENQ])?;
        let next = fsm.transition::<WaitAck0>();
        Ok(next as Box<dyn InitiatorState<'a> + 'a>)
    }
}

impl<'a> InitiatorState<'a> for InitiatorFsm<'a, WaitAck0> {
    fn step(self: Box<Self>) -> Result<Box<dyn InitiatorState<'a> + 'a>, InitiatorError> {
        let mut fsm = *self;
        match wait::wait_for_ack(fsm.serial, ACK0, fsm.debug) {
            Ok(true) => {
                let next = fsm.transition::<SendIdent>();
                Ok(next as Box<dyn InitiatorState<'a> + 'a>)
            }
            Ok(false) => Err(InitiatorError::HandshakeTimeout("ACK0 not received")),
            Err(e) => Err(fsm.io_error(e)),
        }
    }
}

impl<'a> InitiatorState<'a> for InitiatorFsm<'a, SendIdent> {
    fn step(self: Box<Self>) -> Result<Box<dyn InitiatorState<'a> + 'a>, InitiatorError> {
        let mut fsm = *self;

        // Ident CRC is folded over every byte, framing included.
        let mut message = frame::ident_body();
        let crc = crc::crc_outgoing_handshake(&message);
        message.extend_from_slice(&crc.to_le_bytes());

        fsm.serial.write_all(&message)?;
        if fsm.debug { println!("Sent ident: {:02X?}", message); }

        let next = fsm.transition::<WaitAck1>();
        Ok(next as Box<dyn InitiatorState<'a> + 'a>)
    }
}

impl<'a> InitiatorState<'a> for InitiatorFsm<'a, WaitAck1> {
    fn step(self: Box<Self>) -> Result<Box<dyn InitiatorState<'a> + 'a>, InitiatorError> {
        let mut fsm = *self;
        match wait::wait_for_ack(fsm.serial, ACK1, fsm.debug) {
            Ok(true) => {
                let next = fsm.transition::<SendEot>();
                Ok(next as Box<dyn InitiatorState<'a> + 'a>)
            }
            Ok(false) => Err(InitiatorError::HandshakeTimeout("ACK1 not received after ident")),
            Err(e) => Err(fsm.io_error(e)),
        }
    }
}

impl<'a> InitiatorState<'a> for InitiatorFsm<'a, SendEot> {
    fn step(self: Box<Self>) -> Result<Box<dyn InitiatorState<'a> + 'a>, InitiatorError> {
        let mut fsm = *self;
        std::thread::sleep(DEX_DELAY);
        fsm.serial.write_all(&[EOT])?;
        if fsm.debug { println!("Sent: EOT"); }
        Err(InitiatorError::HandshakeComplete)
    }
}

// ============================================================================
// Constructor
// ============================================================================

impl<'a> InitiatorFsm<'a, SendEnq> {
    pub fn new(serial: &'a mut dyn SerialPort, debug: bool) -> Box<dyn InitiatorState<'a> + 'a> {
        Box::new(InitiatorFsm {
            state: PhantomData::<SendEnq>,
            serial,
            debug,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
