//! Integration tests for the routing engine
//!
//! These tests drive the engine the way the host does: device list changes,
//! format changes and user selections, with the render side reading
//! snapshots through its own handle.

use crosspoint_core::{
    AudioError, Device, DeviceUid, MonoPolicy, RoutingConfig, RoutingEngine, RoutingSnapshot,
    SelectionFallback,
};
use crosspoint_infra::audio::{ControlThread, Renderer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn uid(s: &str) -> DeviceUid {
    DeviceUid::new(s)
}

fn gain_row(snapshot: &RoutingSnapshot, input: usize) -> Vec<f32> {
    (0..snapshot.output_channel_count())
        .map(|j| snapshot.gain_at(input, j))
        .collect()
}

/// Every published snapshot routes exactly the mapped slots
fn assert_consistent(snapshot: &RoutingSnapshot) {
    let map = snapshot.channel_map();
    assert_eq!(map.len(), snapshot.output_channel_count());
    let mapped = map.mapped_slots();
    for input in 0..snapshot.input_channel_count() {
        assert_eq!(snapshot.matrix().routed_outputs(input), mapped);
    }
    assert_eq!(snapshot.selected().is_none(), mapped.is_empty());
}

// ============================================================================
// DEVICE SELECTION
// ============================================================================

#[test]
fn test_select_second_device() {
    let mut engine = RoutingEngine::default();
    engine
        .update_devices(vec![Device::new("A", "A", 2), Device::new("B", "B", 4)])
        .unwrap();
    engine.set_channel_counts(2, 6).unwrap();
    engine.select(&uid("B")).unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.channel_map().to_raw(), vec![-1, -1, 0, 1, -1, -1]);
    assert_eq!(gain_row(&snapshot, 0), vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
    assert_eq!(gain_row(&snapshot, 1), vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
    assert_consistent(&snapshot);
}

#[test]
fn test_reselect_moves_pair() {
    let mut engine = RoutingEngine::default();
    engine
        .update_devices(vec![
            Device::new("A", "A", 2),
            Device::new("B", "B", 2),
            Device::new("C", "C", 6),
        ])
        .unwrap();
    engine.set_channel_counts(2, 10).unwrap();

    engine.select(&uid("C")).unwrap();
    assert_eq!(
        engine.snapshot().channel_map().to_raw(),
        vec![-1, -1, -1, -1, 0, 1, -1, -1, -1, -1]
    );

    engine.select(&uid("A")).unwrap();
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.physical_channel_for(0), Some(0));
    assert_eq!(snapshot.physical_channel_for(1), Some(1));
    assert_eq!(snapshot.gain_at(0, 4), 0.0);
    assert_consistent(&snapshot);
}

#[test]
fn test_unknown_device_changes_nothing() {
    let mut engine = RoutingEngine::default();
    engine
        .update_devices(vec![Device::new("A", "A", 2)])
        .unwrap();
    engine.set_channel_counts(2, 2).unwrap();
    engine.select(&uid("A")).unwrap();
    let before = engine.snapshot();

    assert_eq!(
        engine.select(&uid("ghost")),
        Err(AudioError::DeviceNotFound("ghost".to_string()))
    );
    assert!(Arc::ptr_eq(&before, &engine.snapshot()));
    assert_eq!(engine.selected(), Some(&uid("A")));
}

#[test]
fn test_output_space_too_small_goes_silent() {
    let mut engine = RoutingEngine::default();
    engine
        .update_devices(vec![Device::new("A", "A", 2), Device::new("B", "B", 2)])
        .unwrap();
    engine.set_channel_counts(2, 2).unwrap();

    let result = engine.select(&uid("B"));
    assert!(matches!(result, Err(AudioError::TopologyMismatch { .. })));

    let snapshot = engine.snapshot();
    assert!(snapshot.selected().is_none());
    assert!(snapshot.matrix().is_silent());
    assert_eq!(snapshot.channel_map().to_raw(), vec![-1, -1]);
}

// ============================================================================
// DEVICE AND FORMAT CHANGES
// ============================================================================

#[test]
fn test_hot_plug_keeps_selection_and_shifts_offset() {
    let mut engine = RoutingEngine::default();
    engine
        .update_devices(vec![Device::new("A", "A", 2), Device::new("B", "B", 2)])
        .unwrap();
    engine.set_channel_counts(2, 8).unwrap();
    engine.select(&uid("B")).unwrap();
    assert_eq!(engine.physical_channel_for(0), Some(2));

    // A new 4-channel device appears ahead of B
    engine
        .update_devices(vec![
            Device::new("A", "A", 2),
            Device::new("USB", "USB", 4),
            Device::new("B", "B", 2),
        ])
        .unwrap();

    assert_eq!(engine.selected(), Some(&uid("B")));
    assert_eq!(engine.physical_channel_for(0), Some(6));
    assert_eq!(engine.physical_channel_for(1), Some(7));
    assert_consistent(&engine.snapshot());
}

#[test]
fn test_hot_plug_reported_before_format_change() {
    let mut engine = RoutingEngine::default();
    engine
        .update_devices(vec![Device::new("A", "A", 2), Device::new("B", "B", 2)])
        .unwrap();
    engine.set_channel_counts(2, 4).unwrap();
    engine.select(&uid("B")).unwrap();

    // The device list arrives first: B moves to offset 6 of a 4-channel graph
    engine
        .update_devices(vec![
            Device::new("A", "A", 2),
            Device::new("USB", "USB", 4),
            Device::new("B", "B", 2),
        ])
        .unwrap();
    let waiting = engine.snapshot();
    assert_eq!(engine.selected(), Some(&uid("B")));
    assert!(waiting.selected().is_none());
    assert!(waiting.matrix().is_silent());
    assert_consistent(&waiting);

    // The wider format follows and B is routed again
    engine.set_channel_counts(2, 8).unwrap();
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.selected(), Some(&uid("B")));
    assert_eq!(
        snapshot.channel_map().to_raw(),
        vec![-1, -1, -1, -1, -1, -1, 0, 1]
    );
    assert_eq!(gain_row(&snapshot, 0), vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0]);
    assert_consistent(&snapshot);
}

#[test]
fn test_format_change_before_hot_plug() {
    let mut engine = RoutingEngine::default();
    engine
        .update_devices(vec![Device::new("A", "A", 2), Device::new("B", "B", 4)])
        .unwrap();
    engine.set_channel_counts(2, 6).unwrap();
    engine.select(&uid("B")).unwrap();

    // The graph shrinks before the device list drops the 4-channel device
    engine.set_channel_counts(2, 2).unwrap();
    assert_eq!(engine.selected(), Some(&uid("B")));
    assert!(engine.snapshot().matrix().is_silent());

    engine
        .update_devices(vec![Device::new("B", "B", 2)])
        .unwrap();
    assert_eq!(engine.physical_channel_for(0), Some(0));
    assert_eq!(engine.physical_channel_for(1), Some(1));
    assert_consistent(&engine.snapshot());
}

#[test]
fn test_unplugged_device_falls_back() {
    let devices = vec![Device::new("A", "A", 2), Device::new("B", "B", 2)];

    let mut silent = RoutingEngine::default();
    silent.update_devices(devices.clone()).unwrap();
    silent.set_channel_counts(2, 4).unwrap();
    silent.select(&uid("B")).unwrap();
    silent
        .update_devices(vec![Device::new("A", "A", 2)])
        .unwrap();
    assert!(silent.selected().is_none());
    assert!(silent.snapshot().matrix().is_silent());

    let config = RoutingConfig {
        selection_fallback: SelectionFallback::FirstAvailable,
        ..RoutingConfig::default()
    };
    let mut fallback = RoutingEngine::new(&config).unwrap();
    fallback.update_devices(devices).unwrap();
    fallback.set_channel_counts(2, 4).unwrap();
    fallback.select(&uid("B")).unwrap();
    fallback
        .update_devices(vec![Device::new("A", "A", 2)])
        .unwrap();
    assert_eq!(fallback.selected(), Some(&uid("A")));
    assert_eq!(fallback.physical_channel_for(0), Some(0));
}

#[test]
fn test_channel_count_change_reapplies_policy() {
    let mut engine = RoutingEngine::default();
    engine
        .update_devices(vec![Device::new("A", "A", 2), Device::new("B", "B", 4)])
        .unwrap();
    engine.set_channel_counts(2, 6).unwrap();
    engine.select(&uid("B")).unwrap();
    engine.set_gain(0, 0, 0.5).unwrap();

    engine.set_channel_counts(4, 6).unwrap();
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.input_channel_count(), 4);
    // Manual override is gone after the policy is reapplied
    assert_eq!(snapshot.gain_at(0, 0), 0.0);
    for input in 0..4 {
        assert_eq!(gain_row(&snapshot, input), vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
    }
}

#[test]
fn test_mono_device_policies() {
    let devices = vec![Device::new("Mono", "mono", 1), Device::new("B", "B", 2)];

    let mut fold = RoutingEngine::default();
    fold.update_devices(devices.clone()).unwrap();
    fold.set_channel_counts(2, 3).unwrap();
    fold.select(&uid("mono")).unwrap();
    assert_eq!(fold.snapshot().channel_map().to_raw(), vec![0, -1, -1]);
    assert_consistent(&fold.snapshot());

    let config = RoutingConfig {
        mono_policy: MonoPolicy::Reject,
        ..RoutingConfig::default()
    };
    let mut reject = RoutingEngine::new(&config).unwrap();
    reject.update_devices(devices).unwrap();
    reject.set_channel_counts(2, 3).unwrap();
    assert!(matches!(
        reject.select(&uid("mono")),
        Err(AudioError::TopologyMismatch { .. })
    ));
    assert!(reject.selected().is_none());
}

#[test]
fn test_levels_scale_effective_gain() {
    let mut engine = RoutingEngine::default();
    engine
        .update_devices(vec![Device::new("A", "A", 2)])
        .unwrap();
    engine.set_channel_counts(2, 2).unwrap();
    engine.select(&uid("A")).unwrap();

    engine.set_master_level(0.5).unwrap();
    engine.set_input_level(1, 0.5).unwrap();
    engine.set_output_level(0, 0.5).unwrap();

    assert_eq!(engine.gain_at(0, 0), 0.25);
    assert_eq!(engine.gain_at(0, 1), 0.5);
    assert_eq!(engine.gain_at(1, 0), 0.125);
    assert_eq!(engine.gain_at(1, 1), 0.25);
}

// ============================================================================
// CONCURRENT READERS
// ============================================================================

#[test]
fn test_reader_never_sees_torn_configuration() {
    let mut engine = RoutingEngine::default();
    engine
        .update_devices(vec![
            Device::new("A", "A", 2),
            Device::new("B", "B", 4),
            Device::new("C", "C", 2),
        ])
        .unwrap();
    engine.set_channel_counts(2, 8).unwrap();

    let reader = engine.reader();
    let stop = Arc::new(AtomicBool::new(false));
    let reader_stop = Arc::clone(&stop);

    let render = thread::spawn(move || {
        let mut checked = 0usize;
        let mut last_generation = 0;
        while !reader_stop.load(Ordering::Relaxed) {
            let snapshot = reader.snapshot();
            assert!(snapshot.generation() >= last_generation);
            last_generation = snapshot.generation();
            assert_consistent(&snapshot);
            checked += 1;
        }
        checked
    });

    for round in 0..500 {
        match round % 5 {
            0 => engine.select(&uid("A")).unwrap(),
            1 => engine.select(&uid("B")).unwrap(),
            2 => engine.set_channel_counts(2 + round % 3, 8).unwrap(),
            // C sits at offset 6 and does not fit into 4 outputs
            3 => {
                engine.set_channel_counts(2, 4).unwrap();
                let _ = engine.select(&uid("C"));
            }
            _ => {
                engine.set_channel_counts(2, 8).unwrap();
                engine.select(&uid("C")).unwrap();
            }
        }
    }

    stop.store(true, Ordering::Relaxed);
    let checked = render.join().unwrap();
    assert!(checked > 0);
    assert_consistent(&engine.snapshot());
}

// ============================================================================
// CONTROL THREAD AND RENDERER
// ============================================================================

#[test]
fn test_control_thread_drives_renderer() {
    let control = ControlThread::spawn(RoutingEngine::default()).unwrap();
    let handle = control.handle();
    let renderer = Renderer::new(control.reader());

    handle
        .update_devices(vec![Device::new("A", "A", 2), Device::new("B", "B", 4)])
        .unwrap();
    handle.set_channel_counts(2, 6).unwrap();
    handle.select(uid("B")).unwrap();

    let input = [0.25, 0.5];
    let mut output = [0.0; 6];
    assert_eq!(renderer.mix(&input, 2, &mut output, 6), 1);
    assert_eq!(output, [0.0, 0.0, 0.75, 0.75, 0.0, 0.0]);

    let mut placed = [0.0; 6];
    renderer.place_logical(&input, 2, &mut placed, 6);
    assert_eq!(placed, [0.0, 0.0, 0.25, 0.5, 0.0, 0.0]);

    handle.deselect().unwrap();
    renderer.mix(&input, 2, &mut output, 6);
    assert!(output.iter().all(|&s| s == 0.0));

    let engine = control.shutdown().unwrap();
    assert!(engine.selected().is_none());
}

#[test]
fn test_posted_changes_apply_in_order() {
    let control = ControlThread::spawn(RoutingEngine::default()).unwrap();
    let handle = control.handle();

    handle
        .post_devices(vec![Device::new("A", "A", 2), Device::new("B", "B", 2)])
        .unwrap();
    handle.post_channel_counts(2, 4).unwrap();
    handle.select(uid("B")).unwrap();
    // Device B goes away, then comes back in front
    handle
        .post_devices(vec![Device::new("A", "A", 2)])
        .unwrap();
    handle
        .post_devices(vec![Device::new("B", "B", 2), Device::new("A", "A", 2)])
        .unwrap();

    // Queries are answered after everything posted before them
    assert_eq!(handle.selected().unwrap(), None);
    let snapshot = control.reader().load_full();
    assert!(snapshot.selected().is_none());
    assert!(snapshot.matrix().is_silent());
}
