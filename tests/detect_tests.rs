// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for detection parsing and registry behavior

use digicam::camera::{CameraRecord, CameraRegistry, parse_auto_detect};
use digicam::constants::net;

const TWO_CAMERAS: &str = "\
Model                          Port
----------------------------------------------------------
Canon EOS 1100D                usb:001,004
Canon EOS 1100D                usb:002,011
";

#[test]
fn every_usb_line_becomes_a_record() {
    let records = parse_auto_detect(TWO_CAMERAS);
    assert_eq!(records.len(), 2);

    // Identical models: only the port disambiguates
    assert_eq!(records[0].name, records[1].name);
    assert_ne!(records[0].port, records[1].port);
    assert_eq!(records[0].port, "usb:001,004");
    assert_eq!(records[1].port, "usb:002,011");
}

#[test]
fn non_usb_lines_are_skipped() {
    let output = "\
Model                          Port
----------------------------------------------------------
Canon EOS 1100D                usb:001,004

ptp camera over ip             192.168.0.4
Nikon DSC D3200                usb:001,007
";
    let records = parse_auto_detect(output);
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.port.starts_with("usb:")));
}

#[test]
fn empty_output_parses_to_nothing() {
    assert!(parse_auto_detect("").is_empty());
    assert!(parse_auto_detect("Model Port\n----\n").is_empty());
}

#[test]
fn registry_selection_survives_reorder_but_not_unplug() {
    let mut registry = CameraRegistry::new();
    registry.replace(parse_auto_detect(TWO_CAMERAS));
    registry.select(1);

    // Same set, reversed order: selection follows the port
    let mut reversed = parse_auto_detect(TWO_CAMERAS);
    reversed.reverse();
    registry.replace(reversed);
    assert_eq!(registry.selected_camera().unwrap().port, "usb:002,011");

    // Selected camera unplugged: selection falls back to index 0
    registry.replace(vec![CameraRecord {
        name: "Canon EOS 1100D".to_string(),
        port: "usb:001,004".to_string(),
    }]);
    assert_eq!(registry.selected_index(), 0);
}

#[test]
fn hotplug_diff_is_by_port_set() {
    let mut registry = CameraRegistry::new();
    registry.replace(parse_auto_detect(TWO_CAMERAS));

    // Unchanged set in any order is not a change
    let mut same = parse_auto_detect(TWO_CAMERAS);
    same.reverse();
    assert!(!registry.differs_from(&same));

    // Losing one camera is
    assert!(registry.differs_from(&same[..1]));
}

#[test]
fn udp_port_derivation_matches_spec() {
    assert_eq!(net::udp_port_for_pid(7), 5007);
    assert_eq!(net::udp_port_for_pid(2007), 5007); // collision by design
    assert_eq!(net::udp_port_for_pid(999_999), 5999);
}
