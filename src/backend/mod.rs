// **************************************************************************
// Copyright (c) 2018 Pietro Saccardi All Rights Reserved.
//
// This file is part of hidled
// **************************************************************************

//! The contract a HID platform has to fulfil.
//!
//! Functions mirror the shape of the IOKit HID manager API: matching
//! dictionaries, copy rules for collections, get rules for everything else.
//! References returned as plain `Self::X` are borrowed from the object they
//! were obtained from; references that must be released are wrapped in
//! [`Owned`](crate::Owned) by the caller.

use crate::io_return::IoReturn;
use crate::owned::RawRef;

pub mod sim;

/// Property keys understood by a matching dictionary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MatchingKey {
    DeviceUsagePage,
    DeviceUsage,
    ElementUsagePage,
    ElementUsage,
}

/// String properties of a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceProperty {
    Manufacturer,
    Product,
}

pub trait Platform: Sized + 'static {
    type Manager: RawRef;
    type Matching: RawRef;
    type DeviceSet: RawRef;
    type Device: RawRef;
    type ElementArray: RawRef;
    type Element: RawRef;
    type Value: RawRef;

    /// Empty mutable matching dictionary, `None` when it cannot be allocated.
    fn create_matching() -> Option<Self::Matching>;

    /// Returns `false` when the number object cannot be allocated.
    fn matching_insert(matching: Self::Matching, key: MatchingKey, value: u32) -> bool;

    fn matching_len(matching: Self::Matching) -> usize;

    fn create_manager() -> Option<Self::Manager>;

    /// `None` matches every device.
    fn manager_set_device_matching(manager: Self::Manager, matching: Option<Self::Matching>);

    fn manager_open(manager: Self::Manager) -> IoReturn;

    fn manager_close(manager: Self::Manager) -> IoReturn;

    /// Copy rule. `None` when no device matches.
    fn manager_copy_devices(manager: Self::Manager) -> Option<Self::DeviceSet>;

    /// Devices in the set, borrowed from it. Order is platform defined.
    fn device_set_items(set: Self::DeviceSet) -> Vec<Self::Device>;

    fn device_conforms_to(device: Self::Device, usage_page: u32, usage: u32) -> bool;

    fn device_string_property(device: Self::Device, property: DeviceProperty) -> Option<String>;

    /// Copy rule. `None` when no element matches.
    fn device_copy_matching_elements(
        device: Self::Device,
        matching: Option<Self::Matching>,
    ) -> Option<Self::ElementArray>;

    /// Elements in the array, borrowed from it, in array order.
    fn element_array_items(array: Self::ElementArray) -> Vec<Self::Element>;

    fn device_open(device: Self::Device) -> IoReturn;

    fn device_close(device: Self::Device) -> IoReturn;

    /// Get rule: the value is borrowed from the device.
    fn device_get_value(device: Self::Device, element: Self::Element)
        -> Result<Self::Value, IoReturn>;

    fn device_set_value(device: Self::Device, element: Self::Element, value: Self::Value)
        -> IoReturn;

    fn element_device(element: Self::Element) -> Self::Device;

    fn element_usage(element: Self::Element) -> u32;

    fn element_usage_page(element: Self::Element) -> u32;

    fn element_type(element: Self::Element) -> u32;

    fn element_name(element: Self::Element) -> Option<String>;

    fn element_logical_min(element: Self::Element) -> isize;

    fn element_logical_max(element: Self::Element) -> isize;

    /// Create rule.
    fn value_create_integer(
        element: Self::Element,
        timestamp: u64,
        value: isize,
    ) -> Option<Self::Value>;

    fn value_integer(value: Self::Value) -> isize;

    /// Current time in the unit the platform stamps values with.
    fn timestamp() -> u64;
}
