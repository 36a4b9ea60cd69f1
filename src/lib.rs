//! Enumerate HID devices and their elements, and read or write element
//! values, e.g. to switch keyboard LEDs on and off.
//!
//! ```no_run
//! use hidled::usage::{generic_desktop, page};
//! use hidled::{DefaultPlatform, DeviceEnumerator, UsageFilter};
//!
//! # fn main() -> hidled::HidResult<()> {
//! let keyboards = DeviceEnumerator::<DefaultPlatform>::new(UsageFilter::usage(
//!     page::GENERIC_DESKTOP,
//!     generic_desktop::KEYBOARD,
//! ))?;
//! for device in &keyboards {
//!     println!("{device}");
//!     for element in &device.elements(UsageFilter::page(page::LEDS)) {
//!         let value: isize = element.value().get()?;
//!         println!("  {:?}: {}", element.name(), value);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Platform objects are reference counted; [`Owned`] releases each
//! reference exactly once. Devices and elements are views borrowed from the
//! enumerator that produced them.

use cfg_if::cfg_if;

pub mod backend;
pub mod cli;
mod device;
mod element;
mod error;
mod io_return;
mod matching;
mod owned;
pub mod usage;

cfg_if! {
    if #[cfg(target_os = "macos")] {
        mod macos_native;
        pub use macos_native::IoKit;

        /// The native platform of the build target.
        pub type DefaultPlatform = IoKit;
    } else {
        /// No native backend on this target; fall back to the simulated one.
        pub type DefaultPlatform = backend::sim::SimPlatform;
    }
}

pub use backend::Platform;
pub use device::{Device, DeviceEnumerator, DeviceOpener, Devices};
pub use element::{Element, ElementEnumerator, ElementType, ElementValue, Elements, ValueKind};
pub use error::{HidError, HidResult};
pub use io_return::IoReturn;
pub use matching::{MatchTarget, MatchingCriteria, UsageFilter};
pub use owned::{Owned, RawRef};
