//! SysEx toolkit for the Studiologic SL88 keyboard
//!
//! This crate provides:
//! - Hex/word codecs for the device's 7-bit wire format
//! - A declarative message grammar (one definition gives matcher, decoder and encoder)
//! - A catalog of every known SL88 message
//! - Patch and group overlays on flat word buffers, with live per-field edits
//! - A listener-chain transport with awaitable requests
//! - MIDI port binding via midir and a YAML bridge configuration
//!
//! # Architecture
//!
//! ```text
//! MIDI in → midir callback → flume channel → SysexTransport::dispatch → listeners
//! Patch/Zone setter → ProgramParam → Sl88Device (framing) → SysexTransport::send → MIDI out
//! ```
//!
//! The midir callback is synchronous; flume's `recv_async()` bridges it to the
//! task that dispatches, so listeners observe messages in arrival order.

pub mod api;
pub mod atom;
pub mod config;
pub mod connection;
pub mod device;
pub mod fields;
pub mod grammar;
pub mod group;
pub mod hex;
pub mod messages;
pub mod patch;
pub mod transport;

pub use api::Sl88Api;
pub use atom::{ChoiceTable, Symbol, Value};
pub use config::{
    default_bridge_config_path, default_ports, load_bridge_config, save_bridge_config,
    BridgeConfig, PortConfig, ProtocolConfig,
};
pub use connection::{list_input_ports, list_output_ports, ConnectionError, MidiPort};
pub use device::{DeviceError, Framing, Sl88Device};
pub use fields::{field_name_at, FieldValue, PatchError, ZoneField, ZONE_COUNT};
pub use grammar::{FieldError, GrammarError, MessageGrammar, SysexMessage};
pub use group::PatchSet;
pub use messages::{try_decode, Catalog, Message};
pub use patch::{Patch, Zone, ZoneMut};
pub use transport::{ChannelOutput, SysexOutput, SysexTransport, Timing, TransportError};
