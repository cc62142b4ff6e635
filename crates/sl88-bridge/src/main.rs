//! SL88 bridge - sits between the keyboard and its editor application
//!
//! Every SysEx message is forwarded unchanged to the other side and logged
//! in decoded form. Point the editor at the bridge's virtual ports (or a
//! loopback pair) instead of the keyboard.
//!
//! ## Command line flags
//!
//! - `--list`: Print available MIDI ports and exit
//! - `--config <path>`: Read configuration from `<path>`
//! - `--write-config`: Write the default configuration and exit

mod monitor;

use anyhow::Context;
use monitor::Monitor;
use sl88_sysex::{
    default_bridge_config_path, default_ports, list_input_ports, list_output_ports,
    load_bridge_config, save_bridge_config, MidiPort, Sl88Device, SysexTransport,
};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    // Initialize logger - set RUST_LOG=debug to see raw SysEx
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if args.iter().any(|arg| arg == "--list") {
        return print_ports();
    }

    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(default_bridge_config_path);

    if args.iter().any(|arg| arg == "--write-config") {
        save_bridge_config(&default_ports(), &config_path)?;
        println!("Wrote {}", config_path.display());
        return Ok(());
    }

    let config = load_bridge_config(&config_path);
    let timing = config.protocol.timing();
    let framing = config.protocol.framing();

    let (keyboard_port, keyboard_transport) =
        MidiPort::open("keyboard", &config.keyboard.port_match, timing)
            .context("Failed to open keyboard ports (try --list)")?;
    let (app_port, app_transport) = MidiPort::open("app", &config.app.port_match, timing)
        .context("Failed to open editor ports (try --list)")?;

    forward(&keyboard_transport, &app_transport);
    forward(&app_transport, &keyboard_transport);

    let monitor = Arc::new(Monitor::default());
    let keyboard = Sl88Device::new(Arc::clone(&keyboard_transport), framing.clone());
    let app = Sl88Device::new(Arc::clone(&app_transport), framing);
    watch(&keyboard, "SL88 -> editor", &monitor);
    watch(&app, "editor -> SL88", &monitor);

    log::info!(
        "Bridging '{}' <-> '{}', Ctrl+C to stop",
        config.keyboard.port_match,
        config.app.port_match
    );

    tokio::select! {
        _ = keyboard_port.pump(&keyboard_transport) => {}
        _ = app_port.pump(&app_transport) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            log::info!("Shutting down");
        }
    }

    if let Some(name) = monitor.with_mirror(|patch| patch.name()) {
        log::info!("Last program seen: '{}'", name);
    }
    Ok(())
}

/// Re-send everything `from` receives through `to`
fn forward(from: &SysexTransport, to: &Arc<SysexTransport>) {
    let to = Arc::downgrade(to);
    from.set_forward(move |hex| {
        if let Some(to) = to.upgrade() {
            // Failures are logged by the transport
            let _ = to.send(hex);
        }
    });
}

fn watch(device: &Sl88Device, direction: &'static str, monitor: &Arc<Monitor>) {
    let decoder = Arc::clone(monitor);
    device.register_listener(move |payload| decoder.observe(direction, payload));
    let sink = Arc::clone(monitor);
    device.set_unhandled(move |payload| sink.unrecognised(direction, payload));
}

fn print_ports() -> anyhow::Result<()> {
    println!("MIDI input ports:");
    for port in list_input_ports()? {
        println!("  {}", port);
    }
    println!("MIDI output ports:");
    for port in list_output_ports()? {
        println!("  {}", port);
    }
    Ok(())
}
