//! Command-line front end: list keyboards and their LEDs, read, write or
//! toggle one LED.

use std::io::Write;

use clap::{ArgAction, Parser, Subcommand};
use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::Platform;
use crate::device::{Device, DeviceEnumerator};
use crate::element::Element;
use crate::error::HidError;
use crate::matching::UsageFilter;
use crate::usage::{generic_desktop, page};

#[derive(Parser, Debug)]
#[command(name = "hidled")]
#[command(version, about = "Inspect and switch HID element values, e.g. keyboard LEDs")]
pub struct Cli {
    /// Only devices whose manufacturer contains this text
    #[arg(short, long, global = true, value_name = "TEXT")]
    pub manufacturer: Option<String>,

    /// Only devices whose product name contains this text
    #[arg(short, long, global = true, value_name = "TEXT")]
    pub product: Option<String>,

    /// Device usage page (0 matches any)
    #[arg(long, global = true, default_value_t = page::GENERIC_DESKTOP, value_parser = parse_u32)]
    pub device_page: u32,

    /// Device usage (0 matches any)
    #[arg(long, global = true, default_value_t = generic_desktop::KEYBOARD, value_parser = parse_u32)]
    pub device_usage: u32,

    /// Element usage page (0 matches any)
    #[arg(long, global = true, default_value_t = page::LEDS, value_parser = parse_u32)]
    pub element_page: u32,

    /// Element usage (0 matches any)
    #[arg(long, global = true, default_value_t = 0, value_parser = parse_u32)]
    pub element_usage: u32,

    /// More logging; repeat for more detail
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List matching devices and their elements (default)
    #[command(visible_alias = "ls")]
    List,

    /// Print the value of one element
    Get {
        /// Position of the element in the listing
        index: usize,
    },

    /// Write the value of one element
    Set {
        /// Position of the element in the listing
        index: usize,
        /// New value, within the element's logical range
        #[arg(allow_negative_numbers = true)]
        value: isize,
    },

    /// Flip an element between its logical minimum and maximum
    Toggle {
        /// Position of the element in the listing
        index: usize,
    },
}

impl Cli {
    pub fn device_filter(&self) -> UsageFilter {
        UsageFilter::from_parts(nonzero(self.device_page), nonzero(self.device_usage))
    }

    pub fn element_filter(&self) -> UsageFilter {
        UsageFilter::from_parts(nonzero(self.element_page), nonzero(self.element_usage))
    }

    fn selects<P: Platform>(&self, device: &Device<'_, P>) -> bool {
        let contains = |wanted: &Option<String>, actual: String| {
            wanted.as_deref().map_or(true, |wanted| actual.contains(wanted))
        };
        contains(&self.manufacturer, device.manufacturer()) && contains(&self.product, device.product())
    }
}

fn nonzero(value: u32) -> Option<u32> {
    (value != 0).then_some(value)
}

/// Accepts decimal or `0x`-prefixed hexadecimal.
pub fn parse_u32(text: &str) -> Result<u32, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid number `{text}`: {e}"))
}

/// Process exit codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitStatus {
    Success = 0,
    CommandLine = 1,
    NoDevice = 2,
    CannotOpen = 3,
    OutOfRange = 4,
    Unexpected = 5,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("no device matches {filter}")]
    NoDevice { filter: UsageFilter },

    #[error("element index {index} out of range, {device} has {count} element(s)")]
    OutOfRange {
        device: String,
        index: usize,
        count: usize,
    },

    #[error("value {value} outside the logical range [{min}..{max}]")]
    InvalidValue { value: isize, min: isize, max: isize },

    #[error("{device}: {source}")]
    Device {
        device: String,
        #[source]
        source: HidError,
    },

    #[error(transparent)]
    Hid(#[from] HidError),
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Hid(HidError::Io(e))
    }
}

impl CliError {
    pub fn exit_status(&self) -> ExitStatus {
        let hid = match self {
            CliError::NoDevice { .. } => return ExitStatus::NoDevice,
            CliError::OutOfRange { .. } => return ExitStatus::OutOfRange,
            CliError::InvalidValue { .. } => return ExitStatus::CommandLine,
            CliError::Device { source, .. } => source,
            CliError::Hid(source) => source,
        };
        match hid {
            HidError::CannotOpen { .. } => ExitStatus::CannotOpen,
            _ => ExitStatus::Unexpected,
        }
    }
}

/// Run the parsed command against platform `P`, writing the report to `out`.
pub fn run<P: Platform>(cli: &Cli, out: &mut dyn Write) -> Result<(), CliError> {
    let filter = cli.device_filter();
    let devices = DeviceEnumerator::<P>::new(filter)?;
    let selected: Vec<Device<'_, P>> = devices.iter().filter(|d| cli.selects(d)).collect();
    debug!(found = devices.len(), selected = selected.len(), "devices");

    // An empty listing is a valid answer; acting on nothing is not.
    let command = cli.command.clone().unwrap_or(Command::List);
    if selected.is_empty() && command != Command::List {
        return Err(CliError::NoDevice { filter });
    }
    for device in selected {
        match command {
            Command::List => list_device(cli, device, out)?,
            Command::Get { index } => get(cli, device, index, out)?,
            Command::Set { index, value } => set(cli, device, index, value, out)?,
            Command::Toggle { index } => toggle(cli, device, index, out)?,
        }
    }
    Ok(())
}

/// Report the outcome of [`run`] on stderr and flush `out`.
///
/// A report that cannot be flushed turns success into
/// [`ExitStatus::Unexpected`].
pub fn finish(result: Result<(), CliError>, out: &mut dyn Write) -> ExitStatus {
    let status = match result {
        Ok(()) => ExitStatus::Success,
        Err(e) => {
            eprintln!("hidled: {e}");
            e.exit_status()
        }
    };
    match out.flush() {
        Ok(()) => status,
        Err(e) => {
            warn!("cannot flush output: {e}");
            if status == ExitStatus::Success {
                ExitStatus::Unexpected
            } else {
                status
            }
        }
    }
}

fn label<P: Platform>(element: &Element<'_, P>) -> String {
    element.name().unwrap_or_default()
}

fn list_device<P: Platform>(cli: &Cli, device: Device<'_, P>, out: &mut dyn Write) -> Result<(), CliError> {
    write!(out, "Device {device}")?;
    let session = device.open();
    if !session.is_open() {
        write!(out, " (can't be opened: {})", session.result().describe())?;
    }
    writeln!(out)?;

    for element in &device.elements(cli.element_filter()) {
        write!(
            out,
            "   Element {} [{}..{}]",
            label(&element),
            element.logical_min(),
            element.logical_max()
        )?;
        if session.is_open() {
            match element.value::<isize>().get() {
                Ok(value) => write!(out, ": {value}")?,
                Err(e) => {
                    warn!("{device}: {e}");
                    write!(out, ": <{e}>")?;
                }
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Look up element `index` of `device`, then run `action` with the device
/// held open. The index is checked before the device is touched.
fn with_element<P, F>(cli: &Cli, device: Device<'_, P>, index: usize, action: F) -> Result<(), CliError>
where
    P: Platform,
    F: FnOnce(Element<'_, P>) -> Result<(), CliError>,
{
    let elements = device.elements(cli.element_filter());
    let Some(element) = elements.get(index) else {
        return Err(CliError::OutOfRange {
            device: device.to_string(),
            index,
            count: elements.len(),
        });
    };

    let session = device.open();
    if !session.is_open() {
        return Err(CliError::Device {
            device: device.to_string(),
            source: HidError::CannotOpen {
                code: session.result(),
            },
        });
    }
    action(element).map_err(|e| match e {
        CliError::Hid(source) => CliError::Device {
            device: device.to_string(),
            source,
        },
        other => other,
    })
}

fn get<P: Platform>(cli: &Cli, device: Device<'_, P>, index: usize, out: &mut dyn Write) -> Result<(), CliError> {
    with_element(cli, device, index, |element| {
        let value = element.value::<isize>().get()?;
        writeln!(out, "{device}: {} = {value}", label(&element))?;
        Ok(())
    })
}

fn set<P: Platform>(
    cli: &Cli,
    device: Device<'_, P>,
    index: usize,
    value: isize,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    with_element(cli, device, index, |element| {
        let (min, max) = (element.logical_min(), element.logical_max());
        if !(min..=max).contains(&value) {
            return Err(CliError::InvalidValue { value, min, max });
        }
        element.value::<isize>().set(value)?;
        writeln!(out, "{device}: {} = {value}", label(&element))?;
        Ok(())
    })
}

fn toggle<P: Platform>(cli: &Cli, device: Device<'_, P>, index: usize, out: &mut dyn Write) -> Result<(), CliError> {
    with_element(cli, device, index, |element| {
        let accessor = element.value::<isize>();
        let current = accessor.get()?;
        let next = if current == element.logical_min() {
            element.logical_max()
        } else {
            element.logical_min()
        };
        accessor.set(next)?;
        writeln!(out, "{device}: {} = {next}", label(&element))?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_accept_hex() {
        assert_eq!(parse_u32("8"), Ok(8));
        assert_eq!(parse_u32("0x0c"), Ok(12));
        assert_eq!(parse_u32("0XFF"), Ok(255));
        assert!(parse_u32("0xzz").is_err());
        assert!(parse_u32("-1").is_err());
    }

    #[test]
    fn defaults_select_keyboard_leds() {
        let cli = Cli::try_parse_from(["hidled"]).unwrap();
        assert_eq!(cli.command, None);
        assert_eq!(
            cli.device_filter(),
            UsageFilter::usage(page::GENERIC_DESKTOP, generic_desktop::KEYBOARD)
        );
        assert_eq!(cli.element_filter(), UsageFilter::page(page::LEDS));
    }

    #[test]
    fn zero_page_matches_anything() {
        let cli = Cli::try_parse_from(["hidled", "--device-page", "0", "--element-page", "0"]).unwrap();
        assert_eq!(cli.device_filter(), UsageFilter::Any);
        assert_eq!(cli.element_filter(), UsageFilter::Any);
    }

    #[test]
    fn set_takes_negative_values() {
        let cli = Cli::try_parse_from(["hidled", "set", "2", "-1"]).unwrap();
        assert_eq!(cli.command, Some(Command::Set { index: 2, value: -1 }));
    }

    #[test]
    fn global_options_after_subcommand() {
        let cli = Cli::try_parse_from(["hidled", "toggle", "0", "-m", "Apple", "-vv"]).unwrap();
        assert_eq!(cli.command, Some(Command::Toggle { index: 0 }));
        assert_eq!(cli.manufacturer.as_deref(), Some("Apple"));
        assert_eq!(cli.verbose, 2);
    }

    struct Unflushable;

    impl Write for Unflushable {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }
    }

    #[test]
    fn failed_flush_is_not_success() {
        assert_eq!(finish(Ok(()), &mut Vec::new()), ExitStatus::Success);
        assert_eq!(finish(Ok(()), &mut Unflushable), ExitStatus::Unexpected);
        let err = CliError::NoDevice {
            filter: UsageFilter::any(),
        };
        assert_eq!(finish(Err(err), &mut Unflushable), ExitStatus::NoDevice);
    }

    #[test]
    fn exit_codes() {
        assert_eq!(ExitStatus::Success.code(), 0);
        assert_eq!(ExitStatus::Unexpected.code(), 5);
        let err = CliError::Hid(HidError::CannotOpen {
            code: crate::IoReturn::ExclusiveAccess,
        });
        assert_eq!(err.exit_status(), ExitStatus::CannotOpen);
        let err = CliError::InvalidValue { value: 3, min: 0, max: 1 };
        assert_eq!(err.exit_status(), ExitStatus::CommandLine);
    }
}
