use clap::Parser;

use hidled::backend::sim::{SimDeviceSpec, SimElementSpec, SimPlatform, SimRef, SimWorld};
use hidled::cli::{run, Cli, CliError, ExitStatus};
use hidled::usage::led;

fn keyboard() -> SimRef {
    SimWorld::add_device(
        SimDeviceSpec::keyboard("Acme", "Board")
            .element(SimElementSpec::led(led::NUM_LOCK, "Num Lock").value(1))
            .element(SimElementSpec::led(led::CAPS_LOCK, "Caps Lock"))
            .element(SimElementSpec::led(led::SCROLL_LOCK, "Scroll Lock")),
    )
}

fn hidled(args: &[&str]) -> (Result<(), CliError>, String) {
    let cli = Cli::try_parse_from(std::iter::once("hidled").chain(args.iter().copied())).unwrap();
    let mut out = Vec::new();
    let result = run::<SimPlatform>(&cli, &mut out);
    (result, String::from_utf8(out).unwrap())
}

fn status(result: &Result<(), CliError>) -> ExitStatus {
    match result {
        Ok(()) => ExitStatus::Success,
        Err(e) => e.exit_status(),
    }
}

#[test]
fn list_prints_devices_and_values() {
    keyboard();
    let (result, out) = hidled(&["list"]);
    assert!(result.is_ok());
    assert_eq!(
        out,
        "Device Acme >> Board\n\
         \x20  Element Num Lock [0..1]: 1\n\
         \x20  Element Caps Lock [0..1]: 0\n\
         \x20  Element Scroll Lock [0..1]: 0\n"
    );
}

#[test]
fn list_is_the_default_command() {
    keyboard();
    let (_, listed) = hidled(&["list"]);
    let (result, default) = hidled(&[]);
    assert!(result.is_ok());
    assert_eq!(listed, default);
}

#[test]
fn list_without_keyboards_prints_nothing() {
    let (result, out) = hidled(&["list"]);
    assert!(result.is_ok());
    assert!(out.is_empty());
}

#[test]
fn list_keyboard_without_leds() {
    SimWorld::add_device(SimDeviceSpec::keyboard("Acme", "Plain"));
    let (result, out) = hidled(&[]);
    assert!(result.is_ok());
    assert_eq!(out, "Device Acme >> Plain\n");
}

#[test]
fn list_continues_past_busy_device() {
    let busy = keyboard();
    SimWorld::set_busy(busy, true);
    SimWorld::add_device(
        SimDeviceSpec::keyboard("Other", "Pad").element(SimElementSpec::led(led::KANA, "Kana")),
    );

    let (result, out) = hidled(&[]);
    assert!(result.is_ok());
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(
        lines[0],
        "Device Acme >> Board (can't be opened: exclusive access and device already open)"
    );
    assert_eq!(lines[1], "   Element Num Lock [0..1]");
    assert_eq!(lines[4], "Device Other >> Pad");
    assert_eq!(lines[5], "   Element Kana [0..1]: 0");
}

#[test]
fn get_prints_one_value() {
    let raw = keyboard();
    let (result, out) = hidled(&["get", "0"]);
    assert!(result.is_ok());
    assert_eq!(out, "Acme >> Board: Num Lock = 1\n");
    assert!(!SimWorld::is_open(raw));
}

#[test]
fn set_writes_and_reads_back() {
    let raw = keyboard();
    let (result, out) = hidled(&["set", "1", "1"]);
    assert!(result.is_ok());
    assert_eq!(out, "Acme >> Board: Caps Lock = 1\n");
    assert_eq!(SimWorld::element_value(SimWorld::elements(raw)[1]), 1);

    let (_, out) = hidled(&["get", "1"]);
    assert_eq!(out, "Acme >> Board: Caps Lock = 1\n");
}

#[test]
fn set_rejects_values_outside_logical_range() {
    let raw = keyboard();
    let (result, _) = hidled(&["set", "1", "2"]);
    assert!(matches!(
        result,
        Err(CliError::InvalidValue {
            value: 2,
            min: 0,
            max: 1
        })
    ));
    assert_eq!(status(&result), ExitStatus::CommandLine);
    assert_eq!(SimWorld::value_calls(raw), 0);
}

#[test]
fn toggle_flips_between_min_and_max() {
    let raw = keyboard();
    let num_lock = SimWorld::elements(raw)[0];

    let (result, out) = hidled(&["toggle", "0"]);
    assert!(result.is_ok());
    assert_eq!(out, "Acme >> Board: Num Lock = 0\n");
    assert_eq!(SimWorld::element_value(num_lock), 0);

    hidled(&["toggle", "0"]).0.unwrap();
    assert_eq!(SimWorld::element_value(num_lock), 1);
}

#[test]
fn out_of_range_index_touches_nothing() {
    let raw = keyboard();
    let (result, out) = hidled(&["get", "5"]);
    assert!(matches!(
        result,
        Err(CliError::OutOfRange {
            index: 5,
            count: 3,
            ..
        })
    ));
    assert_eq!(status(&result), ExitStatus::OutOfRange);
    assert!(out.is_empty());
    assert_eq!(SimWorld::open_calls(raw), 0);
    assert_eq!(SimWorld::value_calls(raw), 0);
}

#[test]
fn busy_device_exits_with_cannot_open() {
    let raw = keyboard();
    SimWorld::set_busy(raw, true);
    let (result, _) = hidled(&["toggle", "0"]);
    assert_eq!(status(&result), ExitStatus::CannotOpen);
    assert_eq!(SimWorld::element_value(SimWorld::elements(raw)[0]), 1);
}

#[test]
fn no_matching_device() {
    keyboard();
    let (result, _) = hidled(&["get", "0", "--manufacturer", "Apple"]);
    assert!(matches!(result, Err(CliError::NoDevice { .. })));
    assert_eq!(status(&result), ExitStatus::NoDevice);
}

#[test]
fn manufacturer_and_product_filters() {
    keyboard();
    SimWorld::add_device(
        SimDeviceSpec::keyboard("Apple Inc.", "Magic Keyboard")
            .element(SimElementSpec::led(led::CAPS_LOCK, "Caps Lock")),
    );

    let (_, out) = hidled(&["-m", "Apple"]);
    assert_eq!(out.lines().next(), Some("Device Apple Inc. >> Magic Keyboard"));
    assert_eq!(out.lines().count(), 2);

    let (_, out) = hidled(&["--product", "Board"]);
    assert_eq!(out.lines().next(), Some("Device Acme >> Board"));
}

#[test]
fn value_failure_is_unexpected() {
    let raw = keyboard();
    SimWorld::fail_value_access(raw, Some(hidled::IoReturn::IOError));
    let (result, _) = hidled(&["get", "0"]);
    assert_eq!(status(&result), ExitStatus::Unexpected);
}

#[test]
fn bad_arguments_are_command_line_errors() {
    assert!(Cli::try_parse_from(["hidled", "get"]).is_err());
    assert!(Cli::try_parse_from(["hidled", "get", "-1"]).is_err());
    assert!(Cli::try_parse_from(["hidled", "frobnicate"]).is_err());
    assert!(Cli::try_parse_from(["hidled", "--element-page", "0xzz"]).is_err());
}

#[test]
fn unplugged_device_exits_with_cannot_open() {
    let raw = keyboard();
    let cli = Cli::try_parse_from(["hidled", "get", "0"]).unwrap();
    let devices = hidled::DeviceEnumerator::<SimPlatform>::new(cli.device_filter()).unwrap();
    let elements = devices.get(0).unwrap().elements(cli.element_filter());
    SimWorld::remove_device(raw);

    let err = elements.get(0).unwrap().value::<isize>().get().unwrap_err();
    assert_eq!(CliError::from(err).exit_status(), ExitStatus::CannotOpen);
}

#[test]
fn manager_open_failure_is_unexpected() {
    keyboard();
    SimWorld::fail_manager_open(Some(hidled::IoReturn::NotPrivileged));
    let (result, out) = hidled(&["list"]);
    assert!(matches!(
        result,
        Err(CliError::Hid(hidled::HidError::ManagerOpen { .. }))
    ));
    assert_eq!(status(&result), ExitStatus::Unexpected);
    assert!(out.is_empty());
}
