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

// DEX/UCS device-side session simulator
mod crc;
mod frame;
mod initiator;
mod protocol;
mod responder;
mod serial;
mod session;
mod transfer;
mod wait;

use clap::Parser;
use serialport::{DataBits, Parity, StopBits};
use std::path::{Path, PathBuf};
use protocol::SETTLE_DELAY;
use serial::{RealSerialPort, SerialPort};
use session::SessionOutcome;

#[derive(Parser)]
#[command(name = "dexsim")]
#[command(about = "DEX/UCS vending machine audit session simulator", long_about = None)]
#[command(disable_help_subcommand = true)]
struct Cli {
    /// Serial port to use (e.g., /dev/ttyUSB0 or COM1)
    #[arg(short, long)]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value = "9600")]
    baud: u32,

    /// Data bits (5, 6, 7, or 8)
    #[arg(long, default_value = "8", value_name="BITS")]
    data_bits: u8,

    /// Parity (none, odd, or even)
    #[arg(long, default_value = "none")]
    parity: String,

    /// Stop bits (1 or 2)
    #[arg(long, default_value = "1", value_name="BITS")]
    stop_bits: u8,

    /// EVA-DTS audit file to transmit each cycle
    #[arg(short, long, default_value = "evadts.txt")]
    file: PathBuf,

    /// Enable debug output
    #[arg(long)]
    debug: bool,
}

fn parse_data_bits(bits: u8) -> Result<DataBits, String> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        _ => Err(format!("Invalid data bits: {}. Must be 5, 6, 7, or 8", bits)),
    }
}

fn parse_parity(parity: &str) -> Result<Parity, String> {
    match parity.to_lowercase().as_str() {
        "none" => Ok(Parity::None),
        "odd" => Ok(Parity::Odd),
        "even" => Ok(Parity::Even),
        _ => Err(format!("Invalid parity: {}. Must be 'none', 'odd', or 'even'", parity)),
    }
}

fn parse_stop_bits(bits: u8) -> Result<StopBits, String> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        _ => Err(format!("Invalid stop bits: {}. Must be 1 or 2", bits)),
    }
}

fn main() {
    let cli = Cli::parse();

    let data_bits = match parse_data_bits(cli.data_bits) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let parity = match parse_parity(&cli.parity) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let stop_bits = match parse_stop_bits(cli.stop_bits) {
        Ok(sb) => sb,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!("Serial port: {}", cli.port);
    println!("Settings: {} baud, {:?}, {:?}, {:?}", cli.baud, data_bits, parity, stop_bits);
    println!("Audit file: {}", cli.file.display());

    // Run session cycles forever; every failure restarts from scratch with
    // a freshly opened port and a re-read payload.
    loop {
        let mut serial_port = match RealSerialPort::open(&cli.port, cli.baud, data_bits, parity, stop_bits) {
            Ok(port) => port,
            Err(e) => {
                eprintln!("Failed to open serial port: {}", e);
                std::thread::sleep(SETTLE_DELAY);
                continue;
            }
        };

        if let Err(e) = serial_port.clear_buffers() {
            eprintln!("Failed to clear port buffers: {}", e);
        }
        std::thread::sleep(SETTLE_DELAY);

        let lines = match read_payload(&cli.file) {
            Ok(lines) => lines,
            Err(e) => {
                eprintln!("Failed to read {}: {}", cli.file.display(), e);
                std::thread::sleep(SETTLE_DELAY);
                continue;
            }
        };

        run_cycle(&mut serial_port, lines, cli.debug);
        println!("Restarting the process...");
    }
}

fn run_cycle(serial: &mut dyn SerialPort, lines: Vec<String>, debug: bool) {
    match session::first_handshake(serial, debug) {
        SessionOutcome::Completed => println!("First handshake successful"),
        _ => {
            println!("First handshake failed");
            return;
        }
    }

    match session::second_handshake(serial, debug) {
        SessionOutcome::Completed => println!("Second handshake successful"),
        _ => {
            println!("Second handshake failed");
            return;
        }
    }

    match session::transfer_payload(serial, lines, debug) {
        SessionOutcome::Completed => println!("File transfer completed"),
        _ => println!("File transfer failed"),
    }
}

fn read_payload(path: &Path) -> std::io::Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text.lines().map(str::to_owned).collect())
}
