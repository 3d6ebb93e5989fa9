//! Drive the arbiter through a scripted hotplug session on simulated
//! hardware and print every refresh it publishes.
//!
//! Usage: cargo run --example simulate

use trackmux::sim::SimBus;
use trackmux::{Arbiter, ArbiterConfig, PoolRefresh};

fn print_refresh(step: &str, refresh: &PoolRefresh) {
    println!("{}:", step);
    println!("  connected={}  hint={:?}", refresh.connected, refresh.hint);
    for (i, slot) in refresh.slots.iter().enumerate() {
        let device = slot
            .device
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "  slot {}: device={:<6} tracking={:<5} functional={}",
            i, device, slot.tracking, slot.functional
        );
    }
}

fn drain(step: &str, updates: &crossbeam_channel::Receiver<PoolRefresh>) {
    while let Ok(refresh) = updates.try_recv() {
        print_refresh(step, &refresh);
    }
}

fn main() {
    env_logger::init();

    let bus = SimBus::new();
    let mut arbiter = Arbiter::new(Box::new(bus.registry()), ArbiterConfig::default());
    let updates = arbiter.updates();

    println!("requirement: {:?}", arbiter.requirement_label());
    println!();

    arbiter.handle_event(bus.plug("front"));
    drain("plug front", &updates);

    arbiter.handle_event(bus.plug("side"));
    drain("plug side", &updates);

    // Third sensor exceeds the two-slot pool; only the banner changes.
    arbiter.handle_event(bus.plug("rear"));
    drain("plug rear (pool full)", &updates);

    // Move tracking from the first sensor to the second.
    if let Err(e) = arbiter.request_tracking_for(1) {
        eprintln!("hand-off failed: {}", e);
    }
    drain("hand tracking to slot 1", &updates);

    // The tracking holder leaves; its slot falls through to the spare and
    // the capability is lost, not auto-transferred.
    arbiter.handle_event(bus.unplug("side"));
    drain("unplug side", &updates);

    // It comes back, but both slots are taken now.
    arbiter.handle_event(bus.plug("side"));
    drain("replug side (pool full)", &updates);

    // Cycle slot 0 to the next unclaimed sensor in registry order.
    arbiter.request_next_device();
    drain("switch to next sensor", &updates);

    arbiter.teardown();
    drain("teardown", &updates);
}
