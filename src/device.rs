//! Devices, open sessions, and device enumeration.

use std::fmt;
use std::marker::PhantomData;

use tracing::{debug, warn};

use crate::backend::{DeviceProperty, Platform};
use crate::element::ElementEnumerator;
use crate::error::{HidError, HidResult};
use crate::io_return::IoReturn;
use crate::matching::{MatchTarget, MatchingCriteria, UsageFilter};
use crate::owned::Owned;

/// Exclusive open channel to a device, closed when dropped.
///
/// Opening can fail (busy, not privileged, unplugged); that is reported by
/// [`is_open`](Self::is_open) and [`result`](Self::result), never by a panic.
pub struct DeviceOpener<'d, P: Platform> {
    device: Option<P::Device>,
    result: IoReturn,
    _device: PhantomData<&'d ()>,
}

impl<'d, P: Platform> DeviceOpener<'d, P> {
    pub fn new(device: &Device<'d, P>) -> Self {
        Self::open_raw(device.raw)
    }

    pub(crate) fn open_raw(device: P::Device) -> Self {
        let result = P::device_open(device);
        if !result.is_success() {
            warn!("cannot open device: {}", result);
        }
        Self {
            device: result.is_success().then_some(device),
            result,
            _device: PhantomData,
        }
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Status of the open call.
    pub fn result(&self) -> IoReturn {
        self.result
    }

    /// Close the channel now. Does nothing when it is not open.
    pub fn close(&mut self) {
        if let Some(device) = self.device.take() {
            let result = P::device_close(device);
            if !result.is_success() {
                debug!("closing device returned {}", result);
            }
        }
    }
}

impl<P: Platform> Drop for DeviceOpener<'_, P> {
    fn drop(&mut self) {
        self.close();
    }
}

/// A connected device. The platform owns it; this is a view borrowed from
/// the [`DeviceEnumerator`] that found it.
pub struct Device<'e, P: Platform> {
    raw: P::Device,
    _enumerator: PhantomData<&'e ()>,
}

impl<P: Platform> Clone for Device<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: Platform> Copy for Device<'_, P> {}

impl<'e, P: Platform> Device<'e, P> {
    pub(crate) fn from_raw(raw: P::Device) -> Self {
        Self {
            raw,
            _enumerator: PhantomData,
        }
    }

    pub fn as_raw(&self) -> P::Device {
        self.raw
    }

    pub fn conforms_to(&self, usage_page: u32, usage: u32) -> bool {
        P::device_conforms_to(self.raw, usage_page, usage)
    }

    /// Empty when the device does not report one.
    pub fn manufacturer(&self) -> String {
        P::device_string_property(self.raw, DeviceProperty::Manufacturer).unwrap_or_default()
    }

    /// Empty when the device does not report one.
    pub fn product(&self) -> String {
        P::device_string_property(self.raw, DeviceProperty::Product).unwrap_or_default()
    }

    pub fn elements(&self, filter: UsageFilter) -> ElementEnumerator<'e, P> {
        ElementEnumerator::new(*self, filter)
    }

    pub fn open(&self) -> DeviceOpener<'e, P> {
        DeviceOpener::new(self)
    }
}

impl<P: Platform> fmt::Display for Device<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} >> {}", self.manufacturer(), self.product())
    }
}

impl<P: Platform> fmt::Debug for Device<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("manufacturer", &self.manufacturer())
            .field("product", &self.product())
            .finish()
    }
}

/// Snapshot of the devices matching a filter, taken at construction.
///
/// Owns the HID manager session and the copied device set; the
/// [`Device`]s it hands out borrow it. Order is whatever the platform
/// returned and is not stable across enumerations.
pub struct DeviceEnumerator<P: Platform = crate::DefaultPlatform> {
    devices: Vec<P::Device>,
    _set: Owned<P::DeviceSet>,
    manager: Owned<P::Manager>,
}

impl<P: Platform> DeviceEnumerator<P> {
    /// # Panic
    /// Panics if the platform cannot allocate the manager or the matching
    /// criteria.
    pub fn new(filter: UsageFilter) -> HidResult<Self> {
        let manager = Owned::from_option(P::create_manager());
        let Some(raw_manager) = manager.get() else {
            panic!("cannot allocate HID manager");
        };

        let criteria = MatchingCriteria::<P>::build(MatchTarget::Devices, filter);
        P::manager_set_device_matching(raw_manager, criteria.as_raw());
        drop(criteria);

        let code = P::manager_open(raw_manager);
        if !code.is_success() {
            return Err(HidError::ManagerOpen { code });
        }

        let set = Owned::from_option(P::manager_copy_devices(raw_manager));
        let devices = match set.get() {
            Some(raw) => P::device_set_items(raw),
            None => Vec::new(),
        };
        debug!(count = devices.len(), %filter, "enumerated devices");

        Ok(Self {
            devices,
            _set: set,
            manager,
        })
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Device<'_, P>> {
        self.devices.get(index).copied().map(Device::from_raw)
    }

    pub fn iter(&self) -> Devices<'_, P> {
        Devices {
            inner: self.devices.iter(),
        }
    }
}

impl<P: Platform> Drop for DeviceEnumerator<P> {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.get() {
            let code = P::manager_close(manager);
            if !code.is_success() {
                debug!("closing HID manager returned {}", code);
            }
        }
    }
}

impl<'a, P: Platform> IntoIterator for &'a DeviceEnumerator<P> {
    type Item = Device<'a, P>;
    type IntoIter = Devices<'a, P>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the devices of a [`DeviceEnumerator`].
pub struct Devices<'a, P: Platform> {
    inner: std::slice::Iter<'a, P::Device>,
}

impl<'a, P: Platform> Iterator for Devices<'a, P> {
    type Item = Device<'a, P>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().copied().map(Device::from_raw)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<P: Platform> ExactSizeIterator for Devices<'_, P> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::sim::{SimDeviceSpec, SimElementSpec, SimPlatform, SimWorld};
    use crate::usage::{generic_desktop, led, page};

    fn keyboards() -> DeviceEnumerator<SimPlatform> {
        DeviceEnumerator::new(UsageFilter::usage(
            page::GENERIC_DESKTOP,
            generic_desktop::KEYBOARD,
        ))
        .unwrap()
    }

    #[test]
    fn opener_closes_on_drop() {
        let raw = SimWorld::add_device(SimDeviceSpec::keyboard("Acme", "Board"));
        let devices = keyboards();
        let device = devices.get(0).unwrap();
        {
            let session = device.open();
            assert!(session.is_open());
            assert_eq!(session.result(), IoReturn::Success);
            assert!(SimWorld::is_open(raw));
        }
        assert!(!SimWorld::is_open(raw));
    }

    #[test]
    fn opener_close_is_idempotent() {
        let raw = SimWorld::add_device(SimDeviceSpec::keyboard("Acme", "Board"));
        let devices = keyboards();
        let mut session = devices.get(0).unwrap().open();
        session.close();
        session.close();
        assert!(!session.is_open());
        assert!(!SimWorld::is_open(raw));
        drop(session);
        assert!(!SimWorld::is_open(raw));
    }

    #[test]
    fn failed_open_is_observable() {
        let raw = SimWorld::add_device(SimDeviceSpec::keyboard("Acme", "Board"));
        SimWorld::set_busy(raw, true);
        let devices = keyboards();
        let session = devices.get(0).unwrap().open();
        assert!(!session.is_open());
        assert_eq!(session.result(), IoReturn::ExclusiveAccess);
        assert_eq!(SimWorld::open_calls(raw), 0);
    }

    #[test]
    fn missing_strings_are_empty() {
        SimWorld::add_device(SimDeviceSpec::new(page::GENERIC_DESKTOP, generic_desktop::KEYBOARD));
        let devices = keyboards();
        let device = devices.get(0).unwrap();
        assert_eq!(device.manufacturer(), "");
        assert_eq!(device.product(), "");
        assert_eq!(device.to_string(), " >> ");
    }

    #[test]
    fn conforms_to_checks_usage_pairs() {
        SimWorld::add_device(
            SimDeviceSpec::keyboard("Acme", "Board").usage(page::CONSUMER, 0x01),
        );
        let devices = keyboards();
        let device = devices.get(0).unwrap();
        assert!(device.conforms_to(page::GENERIC_DESKTOP, generic_desktop::KEYBOARD));
        assert!(device.conforms_to(page::CONSUMER, 0x01));
        assert!(!device.conforms_to(page::GENERIC_DESKTOP, generic_desktop::MOUSE));
    }

    #[test]
    fn enumerator_releases_everything() {
        SimWorld::add_device(
            SimDeviceSpec::keyboard("Acme", "Board")
                .element(SimElementSpec::led(led::NUM_LOCK, "Num Lock"))
                .element(SimElementSpec::led(led::CAPS_LOCK, "Caps Lock")),
        );
        let baseline = SimWorld::live_objects();
        {
            let devices = keyboards();
            assert_eq!(SimWorld::open_managers(), 1);
            let device = devices.get(0).unwrap();
            let elements = device.elements(UsageFilter::page(page::LEDS));
            assert_eq!(elements.len(), 2);
        }
        assert_eq!(SimWorld::live_objects(), baseline);
        assert_eq!(SimWorld::open_managers(), 0);
    }
}
