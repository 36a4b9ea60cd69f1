//! IOKit HID manager backend.

mod ffi;

use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use core_foundation::array::{CFArrayGetCount, CFArrayGetValueAtIndex, CFArrayRef};
use core_foundation::base::{kCFAllocatorDefault, CFGetTypeID, CFRelease, CFTypeRef, TCFType};
use core_foundation::dictionary::{
    kCFTypeDictionaryKeyCallBacks, kCFTypeDictionaryValueCallBacks, CFDictionaryCreateMutable,
    CFDictionaryGetCount, CFDictionaryRef, CFDictionarySetValue, CFMutableDictionaryRef,
};
use core_foundation::number::CFNumber;
use core_foundation::set::{CFSetGetCount, CFSetGetValues, CFSetRef};
use core_foundation::string::{CFString, CFStringRef};
use libc::c_void;
use mach2::mach_time::mach_absolute_time;

use self::ffi::*;
use crate::backend::{DeviceProperty, MatchingKey, Platform};
use crate::io_return::IoReturn;
use crate::owned::RawRef;

/// Non-null reference to a Core Foundation object.
///
/// Released with `CFRelease` when owned through [`Owned`](crate::Owned).
pub struct CfRef<T> {
    ptr: NonNull<c_void>,
    _type: PhantomData<*const T>,
}

impl<T> CfRef<T> {
    fn new(ptr: *const c_void) -> Option<Self> {
        NonNull::new(ptr as *mut c_void).map(|ptr| Self {
            ptr,
            _type: PhantomData,
        })
    }

    fn as_ptr(self) -> *mut c_void {
        self.ptr.as_ptr()
    }
}

impl<T> Clone for CfRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for CfRef<T> {}

impl<T> std::fmt::Debug for CfRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CfRef({:p})", self.ptr)
    }
}

impl<T> RawRef for CfRef<T> {
    fn release(self) {
        unsafe { CFRelease(self.as_ptr() as CFTypeRef) }
    }
}

/// Markers for the object kinds behind a [`CfRef`].
pub enum MatchingDictionary {}
pub enum DeviceSet {}
pub enum ElementArray {}

fn matching_key_name(key: MatchingKey) -> &'static str {
    match key {
        MatchingKey::DeviceUsagePage => kIOHIDDeviceUsagePageKey,
        MatchingKey::DeviceUsage => kIOHIDDeviceUsageKey,
        MatchingKey::ElementUsagePage => kIOHIDElementUsagePageKey,
        MatchingKey::ElementUsage => kIOHIDElementUsageKey,
    }
}

/// Convert a borrowed `CFStringRef`; `None` for null or non-string objects.
fn copy_cf_string(string: CFTypeRef) -> Option<String> {
    if string.is_null() || unsafe { CFGetTypeID(string) } != CFString::type_id() {
        return None;
    }
    let string = unsafe { CFString::wrap_under_get_rule(string as CFStringRef) };
    Some(string.to_string())
}

fn matching_ptr(matching: Option<CfRef<MatchingDictionary>>) -> CFDictionaryRef {
    matching.map_or(ptr::null(), |m| m.as_ptr() as CFDictionaryRef)
}

/// The IOKit HID platform.
#[derive(Debug)]
pub enum IoKit {}

impl Platform for IoKit {
    type Manager = CfRef<__IOHIDManager>;
    type Matching = CfRef<MatchingDictionary>;
    type DeviceSet = CfRef<DeviceSet>;
    type Device = CfRef<__IOHIDDevice>;
    type ElementArray = CfRef<ElementArray>;
    type Element = CfRef<__IOHIDElement>;
    type Value = CfRef<__IOHIDValue>;

    fn create_matching() -> Option<Self::Matching> {
        let dictionary = unsafe {
            CFDictionaryCreateMutable(
                kCFAllocatorDefault,
                0,
                &kCFTypeDictionaryKeyCallBacks,
                &kCFTypeDictionaryValueCallBacks,
            )
        };
        CfRef::new(dictionary as *const c_void)
    }

    fn matching_insert(matching: Self::Matching, key: MatchingKey, value: u32) -> bool {
        let number = CFNumber::from(value as i32);
        let key = CFString::from_static_string(matching_key_name(key));
        // The dictionary retains both key and value.
        unsafe {
            CFDictionarySetValue(
                matching.as_ptr() as CFMutableDictionaryRef,
                key.as_CFTypeRef(),
                number.as_CFTypeRef(),
            )
        };
        true
    }

    fn matching_len(matching: Self::Matching) -> usize {
        unsafe { CFDictionaryGetCount(matching.as_ptr() as CFDictionaryRef) as usize }
    }

    fn create_manager() -> Option<Self::Manager> {
        let manager = unsafe { IOHIDManagerCreate(kCFAllocatorDefault, kIOHIDOptionsTypeNone) };
        CfRef::new(manager as *const c_void)
    }

    fn manager_set_device_matching(manager: Self::Manager, matching: Option<Self::Matching>) {
        unsafe {
            IOHIDManagerSetDeviceMatching(manager.as_ptr() as IOHIDManagerRef, matching_ptr(matching))
        }
    }

    fn manager_open(manager: Self::Manager) -> IoReturn {
        IoReturn(unsafe {
            IOHIDManagerOpen(manager.as_ptr() as IOHIDManagerRef, kIOHIDOptionsTypeNone)
        })
    }

    fn manager_close(manager: Self::Manager) -> IoReturn {
        IoReturn(unsafe {
            IOHIDManagerClose(manager.as_ptr() as IOHIDManagerRef, kIOHIDOptionsTypeNone)
        })
    }

    fn manager_copy_devices(manager: Self::Manager) -> Option<Self::DeviceSet> {
        let set = unsafe { IOHIDManagerCopyDevices(manager.as_ptr() as IOHIDManagerRef) };
        CfRef::new(set as *const c_void)
    }

    fn device_set_items(set: Self::DeviceSet) -> Vec<Self::Device> {
        let set = set.as_ptr() as CFSetRef;
        let count = unsafe { CFSetGetCount(set) } as usize;
        let mut values: Vec<*const c_void> = vec![ptr::null(); count];
        unsafe { CFSetGetValues(set, values.as_mut_ptr()) };

        // Borrowed from the set: no retain, no release.
        values.into_iter().filter_map(CfRef::new).collect()
    }

    fn device_conforms_to(device: Self::Device, usage_page: u32, usage: u32) -> bool {
        unsafe { IOHIDDeviceConformsTo(device.as_ptr() as IOHIDDeviceRef, usage_page, usage) != 0 }
    }

    fn device_string_property(device: Self::Device, property: DeviceProperty) -> Option<String> {
        let key = CFString::from_static_string(match property {
            DeviceProperty::Manufacturer => kIOHIDManufacturerKey,
            DeviceProperty::Product => kIOHIDProductKey,
        });
        let value = unsafe {
            IOHIDDeviceGetProperty(device.as_ptr() as IOHIDDeviceRef, key.as_concrete_TypeRef())
        };
        copy_cf_string(value)
    }

    fn device_copy_matching_elements(
        device: Self::Device,
        matching: Option<Self::Matching>,
    ) -> Option<Self::ElementArray> {
        let array = unsafe {
            IOHIDDeviceCopyMatchingElements(
                device.as_ptr() as IOHIDDeviceRef,
                matching_ptr(matching),
                kIOHIDOptionsTypeNone,
            )
        };
        CfRef::new(array as *const c_void)
    }

    fn element_array_items(array: Self::ElementArray) -> Vec<Self::Element> {
        let array = array.as_ptr() as CFArrayRef;
        let count = unsafe { CFArrayGetCount(array) };
        (0..count)
            .filter_map(|i| CfRef::new(unsafe { CFArrayGetValueAtIndex(array, i) }))
            .collect()
    }

    fn device_open(device: Self::Device) -> IoReturn {
        IoReturn(unsafe { IOHIDDeviceOpen(device.as_ptr() as IOHIDDeviceRef, kIOHIDOptionsTypeNone) })
    }

    fn device_close(device: Self::Device) -> IoReturn {
        IoReturn(unsafe {
            IOHIDDeviceClose(device.as_ptr() as IOHIDDeviceRef, kIOHIDOptionsTypeNone)
        })
    }

    fn device_get_value(
        device: Self::Device,
        element: Self::Element,
    ) -> Result<Self::Value, IoReturn> {
        let mut value: IOHIDValueRef = ptr::null_mut();
        let code = IoReturn(unsafe {
            IOHIDDeviceGetValue(
                device.as_ptr() as IOHIDDeviceRef,
                element.as_ptr() as IOHIDElementRef,
                &mut value,
            )
        });
        if !code.is_success() {
            return Err(code);
        }
        CfRef::new(value as *const c_void).ok_or(IoReturn::Error)
    }

    fn device_set_value(device: Self::Device, element: Self::Element, value: Self::Value) -> IoReturn {
        IoReturn(unsafe {
            IOHIDDeviceSetValue(
                device.as_ptr() as IOHIDDeviceRef,
                element.as_ptr() as IOHIDElementRef,
                value.as_ptr() as IOHIDValueRef,
            )
        })
    }

    fn element_device(element: Self::Element) -> Self::Device {
        let device = unsafe { IOHIDElementGetDevice(element.as_ptr() as IOHIDElementRef) };
        match CfRef::new(device as *const c_void) {
            Some(device) => device,
            None => panic!("element without a device"),
        }
    }

    fn element_usage(element: Self::Element) -> u32 {
        unsafe { IOHIDElementGetUsage(element.as_ptr() as IOHIDElementRef) }
    }

    fn element_usage_page(element: Self::Element) -> u32 {
        unsafe { IOHIDElementGetUsagePage(element.as_ptr() as IOHIDElementRef) }
    }

    fn element_type(element: Self::Element) -> u32 {
        unsafe { IOHIDElementGetType(element.as_ptr() as IOHIDElementRef) }
    }

    fn element_name(element: Self::Element) -> Option<String> {
        let name = unsafe { IOHIDElementGetName(element.as_ptr() as IOHIDElementRef) };
        copy_cf_string(name as CFTypeRef)
    }

    fn element_logical_min(element: Self::Element) -> isize {
        unsafe { IOHIDElementGetLogicalMin(element.as_ptr() as IOHIDElementRef) }
    }

    fn element_logical_max(element: Self::Element) -> isize {
        unsafe { IOHIDElementGetLogicalMax(element.as_ptr() as IOHIDElementRef) }
    }

    fn value_create_integer(
        element: Self::Element,
        timestamp: u64,
        value: isize,
    ) -> Option<Self::Value> {
        let value = unsafe {
            IOHIDValueCreateWithIntegerValue(
                kCFAllocatorDefault,
                element.as_ptr() as IOHIDElementRef,
                timestamp,
                value,
            )
        };
        CfRef::new(value as *const c_void)
    }

    fn value_integer(value: Self::Value) -> isize {
        unsafe { IOHIDValueGetIntegerValue(value.as_ptr() as IOHIDValueRef) }
    }

    fn timestamp() -> u64 {
        unsafe { mach_absolute_time() }
    }
}
