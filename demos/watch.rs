//! Watch real HID sensors hotplug and print the arbiter's refreshes.
//!
//! Usage: cargo run --example watch [VID PID]
//! VID/PID are hex (default 045e 02ae). Press Ctrl+C to stop.

use std::time::Duration;

use trackmux::hid::{DeviceWatcher, HidRegistry};
use trackmux::{Arbiter, ArbiterConfig, ArbiterHandle};

fn parse_hex(arg: Option<String>, default: u16) -> u16 {
    arg.and_then(|v| u16::from_str_radix(v.trim_start_matches("0x"), 16).ok())
        .unwrap_or(default)
}

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let vid = parse_hex(args.next(), 0x045E);
    let pid = parse_hex(args.next(), 0x02AE);
    println!("Watching VID={:04x} PID={:04x}", vid, pid);

    let registry = match HidRegistry::new(vid, pid) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to open HID context: {}", e);
            std::process::exit(1);
        }
    };

    let watcher = match DeviceWatcher::spawn(vid, pid, Duration::from_millis(500)) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Failed to start hotplug watcher: {}", e);
            std::process::exit(1);
        }
    };

    let arbiter = Arbiter::new(Box::new(registry), ArbiterConfig::default());
    let (handle, updates) = match ArbiterHandle::spawn(arbiter) {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("Failed to start arbiter: {}", e);
            std::process::exit(1);
        }
    };

    println!("Running (Ctrl+C to stop)...");
    loop {
        match watcher.recv_timeout(Duration::from_millis(200)) {
            Ok(event) => {
                println!("hotplug: {} -> {:?}", event.device(), event.status());
                if handle.device_event(event).is_err() {
                    break;
                }
            }
            Err(trackmux::TrackmuxError::Timeout) => {}
            Err(e) => {
                eprintln!("watcher stopped: {}", e);
                break;
            }
        }
        while let Ok(refresh) = updates.try_recv() {
            println!("connected={} hint={:?}", refresh.connected, refresh.hint);
            for (i, slot) in refresh.slots.iter().enumerate() {
                let device = slot
                    .device
                    .as_ref()
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "  slot {}: device={} tracking={} functional={}",
                    i, device, slot.tracking, slot.functional
                );
            }
        }
    }
}
