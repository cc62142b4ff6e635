//! MIDI port binding
//!
//! Uses midir for cross-platform MIDI I/O (ALSA on Linux, CoreMIDI on macOS, WinMM on Windows).
//!
//! ```text
//! input port → midir callback → SysexAssembler → flume → pump task → SysexTransport::dispatch
//! SysexTransport::send → MidiSysexOutput → output port
//! ```
//!
//! The midir callback runs on the driver thread and only reassembles bytes
//! into hex. Dispatch happens on whichever task awaits [`MidiPort::pump`].

use crate::config::port_matches;
use crate::hex::{bytes_to_hex, hex_to_bytes};
use crate::transport::{SysexOutput, SysexTransport, Timing, TransportError};
use flume::{Receiver, Sender};
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use std::sync::Arc;

const SYSEX_START: u8 = 0xF0;
const SYSEX_END: u8 = 0xF7;

/// Error type for MIDI connection operations
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Failed to initialize MIDI input: {0}")]
    InputInitError(String),

    #[error("Failed to initialize MIDI output: {0}")]
    OutputInitError(String),

    #[error("No MIDI {0} ports available")]
    NoPorts(&'static str),

    #[error("No MIDI {direction} port found matching pattern: {pattern}")]
    PortNotFound {
        direction: &'static str,
        pattern: String,
    },

    #[error("Failed to connect to MIDI port: {0}")]
    ConnectionError(String),

    #[error("Failed to get port info: {0}")]
    PortInfoError(String),
}

/// Collects SysEx bytes from F0 to F7
///
/// Some backends deliver long SysEx in several callbacks; others interleave
/// realtime bytes. Anything outside a SysEx frame is dropped.
#[derive(Debug, Default)]
pub struct SysexAssembler {
    buffer: Vec<u8>,
    in_sysex: bool,
}

impl SysexAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one callback's bytes, returning every message completed by them
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        let mut complete = Vec::new();
        for &byte in data {
            match byte {
                SYSEX_START => {
                    if self.in_sysex {
                        log::warn!(
                            "[MIDI IN] SysEx restarted before F7, dropping {} bytes",
                            self.buffer.len()
                        );
                    }
                    self.buffer.clear();
                    self.buffer.push(byte);
                    self.in_sysex = true;
                }
                SYSEX_END if self.in_sysex => {
                    self.buffer.push(byte);
                    complete.push(bytes_to_hex(&self.buffer));
                    self.buffer.clear();
                    self.in_sysex = false;
                }
                // Realtime
                0xF8..=0xFF => {}
                0x80..=0xF6 if self.in_sysex => {
                    log::warn!(
                        "[MIDI IN] SysEx interrupted by status {:02X}, dropping {} bytes",
                        byte,
                        self.buffer.len()
                    );
                    self.buffer.clear();
                    self.in_sysex = false;
                }
                _ if self.in_sysex => self.buffer.push(byte),
                _ => {}
            }
        }
        complete
    }

    pub fn is_idle(&self) -> bool {
        !self.in_sysex
    }
}

/// Output half: writes transport hex to a midir connection
pub struct MidiSysexOutput {
    port_name: String,
    connection: MidiOutputConnection,
}

impl SysexOutput for MidiSysexOutput {
    fn send_hex(&mut self, hex: &str) -> Result<(), TransportError> {
        self.connection
            .send(&hex_to_bytes(hex))
            .map_err(|e| TransportError::Send(format!("{}: {}", self.port_name, e)))
    }
}

/// A connected input/output port pair
pub struct MidiPort {
    name: String,
    /// Kept alive for the duration; dropping it closes the input
    _input: MidiInputConnection<SysexAssembler>,
    inbound: Receiver<String>,
}

impl MidiPort {
    /// Find and connect the input and output ports matching `port_match`
    ///
    /// The pattern is matched case-insensitively as a substring of port
    /// names. Returns the port (which owns the input side) and a transport
    /// writing to the output side.
    pub fn open(
        name: &str,
        port_match: &str,
        timing: Timing,
    ) -> Result<(Self, Arc<SysexTransport>), ConnectionError> {
        let (tx, rx) = flume::unbounded();
        let input = connect_input(name, port_match, tx)?;
        let output = connect_output(name, port_match)?;
        let transport = Arc::new(SysexTransport::new(name, output, timing));
        Ok((
            Self {
                name: name.to_string(),
                _input: input,
                inbound: rx,
            },
            transport,
        ))
    }

    /// Dispatch every inbound message to `transport` until the input closes
    pub async fn pump(&self, transport: &SysexTransport) {
        while let Ok(hex) = self.inbound.recv_async().await {
            transport.dispatch(&hex);
        }
        log::info!("[MIDI IN] {}: input closed", self.name);
    }
}

fn connect_input(
    name: &str,
    port_match: &str,
    tx: Sender<String>,
) -> Result<MidiInputConnection<SysexAssembler>, ConnectionError> {
    let mut midi_in = MidiInput::new(&format!("sl88-{}-in", name))
        .map_err(|e| ConnectionError::InputInitError(e.to_string()))?;
    midi_in.ignore(Ignore::None);

    let in_ports = midi_in.ports();
    if in_ports.is_empty() {
        return Err(ConnectionError::NoPorts("input"));
    }

    let input_port = in_ports
        .into_iter()
        .find(|port| {
            midi_in
                .port_name(port)
                .map(|port_name| port_matches(&port_name, port_match))
                .unwrap_or(false)
        })
        .ok_or_else(|| ConnectionError::PortNotFound {
            direction: "input",
            pattern: port_match.to_string(),
        })?;

    let port_name = midi_in
        .port_name(&input_port)
        .map_err(|e| ConnectionError::PortInfoError(e.to_string()))?;
    log::info!("MIDI: Found input port for {}: {}", name, port_name);

    let label = name.to_string();
    midi_in
        .connect(
            &input_port,
            "sl88-sysex-input",
            move |_timestamp, bytes, assembler: &mut SysexAssembler| {
                for hex in assembler.push(bytes) {
                    if tx.send(hex).is_err() {
                        log::warn!("[MIDI IN] {}: dispatcher gone, dropping message", label);
                    }
                }
            },
            SysexAssembler::new(),
        )
        .map_err(|e| ConnectionError::ConnectionError(e.to_string()))
}

fn connect_output(name: &str, port_match: &str) -> Result<MidiSysexOutput, ConnectionError> {
    let midi_out = MidiOutput::new(&format!("sl88-{}-out", name))
        .map_err(|e| ConnectionError::OutputInitError(e.to_string()))?;

    let out_ports = midi_out.ports();
    if out_ports.is_empty() {
        return Err(ConnectionError::NoPorts("output"));
    }

    let output_port = out_ports
        .into_iter()
        .find(|port| {
            midi_out
                .port_name(port)
                .map(|port_name| port_matches(&port_name, port_match))
                .unwrap_or(false)
        })
        .ok_or_else(|| ConnectionError::PortNotFound {
            direction: "output",
            pattern: port_match.to_string(),
        })?;

    let port_name = midi_out
        .port_name(&output_port)
        .map_err(|e| ConnectionError::PortInfoError(e.to_string()))?;
    log::info!("MIDI: Found output port for {}: {}", name, port_name);

    let connection = midi_out
        .connect(&output_port, "sl88-sysex-output")
        .map_err(|e| ConnectionError::ConnectionError(e.to_string()))?;

    Ok(MidiSysexOutput {
        port_name,
        connection,
    })
}

/// List all available MIDI input ports
pub fn list_input_ports() -> Result<Vec<String>, ConnectionError> {
    let midi_in = MidiInput::new("sl88-list")
        .map_err(|e| ConnectionError::InputInitError(e.to_string()))?;

    Ok(midi_in
        .ports()
        .iter()
        .filter_map(|port| midi_in.port_name(port).ok())
        .collect())
}

/// List all available MIDI output ports
pub fn list_output_ports() -> Result<Vec<String>, ConnectionError> {
    let midi_out = MidiOutput::new("sl88-list")
        .map_err(|e| ConnectionError::OutputInitError(e.to_string()))?;

    Ok(midi_out
        .ports()
        .iter()
        .filter_map(|port| midi_out.port_name(port).ok())
        .collect())
}
