use core_foundation::array::CFArrayRef;
use core_foundation::base::{Boolean, CFAllocatorRef, CFIndex, CFTypeRef};
use core_foundation::dictionary::CFDictionaryRef;
use core_foundation::set::CFSetRef;
use core_foundation::string::CFStringRef;
use libc::c_void;
use mach2::kern_return::kern_return_t;

#[repr(C)]
pub struct __IOHIDManager(c_void);
pub type IOHIDManagerRef = *mut __IOHIDManager;

#[repr(C)]
pub struct __IOHIDDevice(c_void);
pub type IOHIDDeviceRef = *mut __IOHIDDevice;

#[repr(C)]
pub struct __IOHIDElement(c_void);
pub type IOHIDElementRef = *mut __IOHIDElement;

#[repr(C)]
pub struct __IOHIDValue(c_void);
pub type IOHIDValueRef = *mut __IOHIDValue;

pub type IOOptionBits = u32;

pub type IOReturn = kern_return_t;

pub type IOHIDElementType = u32;

#[allow(non_upper_case_globals)]
pub const kIOHIDOptionsTypeNone: IOOptionBits = 0;

#[allow(non_upper_case_globals)]
pub const kIOHIDManufacturerKey: &str = "Manufacturer";
#[allow(non_upper_case_globals)]
pub const kIOHIDProductKey: &str = "Product";
#[allow(non_upper_case_globals)]
pub const kIOHIDDeviceUsagePageKey: &str = "DeviceUsagePage";
#[allow(non_upper_case_globals)]
pub const kIOHIDDeviceUsageKey: &str = "DeviceUsage";
#[allow(non_upper_case_globals)]
pub const kIOHIDElementUsagePageKey: &str = "UsagePage";
#[allow(non_upper_case_globals)]
pub const kIOHIDElementUsageKey: &str = "Usage";

#[link(name = "IOKit", kind = "framework")]
extern "C" {
    pub fn IOHIDManagerCreate(allocator: CFAllocatorRef, options: IOOptionBits) -> IOHIDManagerRef;

    pub fn IOHIDManagerSetDeviceMatching(manager: IOHIDManagerRef, matching: CFDictionaryRef);

    pub fn IOHIDManagerOpen(manager: IOHIDManagerRef, options: IOOptionBits) -> IOReturn;

    pub fn IOHIDManagerClose(manager: IOHIDManagerRef, options: IOOptionBits) -> IOReturn;

    pub fn IOHIDManagerCopyDevices(manager: IOHIDManagerRef) -> CFSetRef;

    pub fn IOHIDDeviceConformsTo(device: IOHIDDeviceRef, usagePage: u32, usage: u32) -> Boolean;

    pub fn IOHIDDeviceGetProperty(device: IOHIDDeviceRef, key: CFStringRef) -> CFTypeRef;

    pub fn IOHIDDeviceCopyMatchingElements(
        device: IOHIDDeviceRef,
        matching: CFDictionaryRef,
        options: IOOptionBits,
    ) -> CFArrayRef;

    pub fn IOHIDDeviceOpen(device: IOHIDDeviceRef, options: IOOptionBits) -> IOReturn;

    pub fn IOHIDDeviceClose(device: IOHIDDeviceRef, options: IOOptionBits) -> IOReturn;

    pub fn IOHIDDeviceGetValue(
        device: IOHIDDeviceRef,
        element: IOHIDElementRef,
        pValue: *mut IOHIDValueRef,
    ) -> IOReturn;

    pub fn IOHIDDeviceSetValue(
        device: IOHIDDeviceRef,
        element: IOHIDElementRef,
        value: IOHIDValueRef,
    ) -> IOReturn;

    pub fn IOHIDElementGetDevice(element: IOHIDElementRef) -> IOHIDDeviceRef;

    pub fn IOHIDElementGetType(element: IOHIDElementRef) -> IOHIDElementType;

    pub fn IOHIDElementGetUsagePage(element: IOHIDElementRef) -> u32;

    pub fn IOHIDElementGetUsage(element: IOHIDElementRef) -> u32;

    pub fn IOHIDElementGetName(element: IOHIDElementRef) -> CFStringRef;

    pub fn IOHIDElementGetLogicalMin(element: IOHIDElementRef) -> CFIndex;

    pub fn IOHIDElementGetLogicalMax(element: IOHIDElementRef) -> CFIndex;

    pub fn IOHIDValueCreateWithIntegerValue(
        allocator: CFAllocatorRef,
        element: IOHIDElementRef,
        timeStamp: u64,
        value: CFIndex,
    ) -> IOHIDValueRef;

    pub fn IOHIDValueGetIntegerValue(value: IOHIDValueRef) -> CFIndex;
}
