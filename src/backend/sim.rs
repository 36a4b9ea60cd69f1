//! In-memory HID platform.
//!
//! Every thread owns an independent simulated world, so tests running in
//! parallel never see each other's devices. The world keeps a retain count
//! per object and panics on a double release, which makes ownership bugs in
//! the layers above show up as test failures.

use std::cell::RefCell;
use std::collections::BTreeMap;

use tracing::trace;

use super::{DeviceProperty, MatchingKey, Platform};
use crate::element::ElementType;
use crate::io_return::IoReturn;
use crate::owned::RawRef;

/// Handle to an object in the simulated world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimRef(u32);

impl RawRef for SimRef {
    fn release(self) {
        WORLD.with(|world| {
            match world.try_borrow_mut() {
                Ok(mut world) => world.release(self),
                // Unwinding out of the world itself; the slot state is moot.
                Err(_) if std::thread::panicking() => {
                    trace!(id = ?self, "release skipped during unwind")
                }
                Err(_) => panic!("release of {self:?} while the simulated world is borrowed"),
            }
        });
    }
}

thread_local! {
    static WORLD: RefCell<World> = RefCell::new(World::default());
}

fn with_world<T>(f: impl FnOnce(&mut World) -> T) -> T {
    WORLD.with(|world| f(&mut world.borrow_mut()))
}

/// Description of a device to plug into the simulated world.
#[derive(Clone, Debug, Default)]
pub struct SimDeviceSpec {
    manufacturer: Option<String>,
    product: Option<String>,
    usages: Vec<(u32, u32)>,
    elements: Vec<SimElementSpec>,
}

impl SimDeviceSpec {
    pub fn new(usage_page: u32, usage: u32) -> Self {
        Self {
            usages: vec![(usage_page, usage)],
            ..Self::default()
        }
    }

    pub fn keyboard(manufacturer: &str, product: &str) -> Self {
        Self::new(
            crate::usage::page::GENERIC_DESKTOP,
            crate::usage::generic_desktop::KEYBOARD,
        )
        .manufacturer(manufacturer)
        .product(product)
    }

    pub fn manufacturer(mut self, manufacturer: &str) -> Self {
        self.manufacturer = Some(manufacturer.to_owned());
        self
    }

    pub fn product(mut self, product: &str) -> Self {
        self.product = Some(product.to_owned());
        self
    }

    /// Additional usage pair the device conforms to.
    pub fn usage(mut self, usage_page: u32, usage: u32) -> Self {
        self.usages.push((usage_page, usage));
        self
    }

    pub fn element(mut self, element: SimElementSpec) -> Self {
        self.elements.push(element);
        self
    }
}

/// Description of one element of a simulated device.
#[derive(Clone, Debug)]
pub struct SimElementSpec {
    usage_page: u32,
    usage: u32,
    element_type: ElementType,
    name: Option<String>,
    logical_min: isize,
    logical_max: isize,
    value: isize,
}

impl SimElementSpec {
    pub fn new(usage_page: u32, usage: u32) -> Self {
        Self {
            usage_page,
            usage,
            element_type: ElementType::InputMisc,
            name: None,
            logical_min: 0,
            logical_max: 0,
            value: 0,
        }
    }

    /// An on/off LED output element.
    pub fn led(usage: u32, name: &str) -> Self {
        Self::new(crate::usage::page::LEDS, usage)
            .element_type(ElementType::Output)
            .name(name)
            .range(0, 1)
    }

    pub fn element_type(mut self, element_type: ElementType) -> Self {
        self.element_type = element_type;
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    pub fn range(mut self, logical_min: isize, logical_max: isize) -> Self {
        self.logical_min = logical_min;
        self.logical_max = logical_max;
        self
    }

    pub fn value(mut self, value: isize) -> Self {
        self.value = value;
        self
    }
}

struct SimDevice {
    manufacturer: Option<String>,
    product: Option<String>,
    usages: Vec<(u32, u32)>,
    elements: Vec<SimRef>,
    connected: bool,
    busy: bool,
    open_depth: usize,
    open_calls: usize,
    value_calls: usize,
    value_failure: Option<IoReturn>,
    last_value: Option<SimRef>,
}

struct SimElement {
    device: SimRef,
    usage_page: u32,
    usage: u32,
    element_type: ElementType,
    name: Option<String>,
    logical_min: isize,
    logical_max: isize,
    value: isize,
}

struct SimValue {
    element: SimRef,
    timestamp: u64,
    value: isize,
}

struct SimManager {
    matching: Option<BTreeMap<MatchingKey, u32>>,
    open: bool,
}

enum Object {
    Manager(SimManager),
    Matching(BTreeMap<MatchingKey, u32>),
    DeviceSet(Vec<SimRef>),
    ElementArray(Vec<SimRef>),
    Device(SimDevice),
    Element(SimElement),
    Value(SimValue),
}

struct Slot {
    retain: usize,
    object: Object,
}

#[derive(Default)]
struct World {
    slots: Vec<Slot>,
    connected: Vec<SimRef>,
    clock: u64,
    fail_allocations: bool,
    manager_open_failure: Option<IoReturn>,
}

impl World {
    fn alloc(&mut self, object: Object) -> SimRef {
        self.slots.push(Slot { retain: 1, object });
        SimRef(self.slots.len() as u32)
    }

    fn slot(&self, id: SimRef) -> &Slot {
        let slot = &self.slots[id.0 as usize - 1];
        assert!(slot.retain > 0, "use of released object {id:?}");
        slot
    }

    fn slot_mut(&mut self, id: SimRef) -> &mut Slot {
        let slot = &mut self.slots[id.0 as usize - 1];
        assert!(slot.retain > 0, "use of released object {id:?}");
        slot
    }

    fn retain(&mut self, id: SimRef) {
        self.slot_mut(id).retain += 1;
    }

    fn release(&mut self, id: SimRef) {
        let slot = &mut self.slots[id.0 as usize - 1];
        assert!(slot.retain > 0, "double release of {id:?}");
        slot.retain -= 1;
        if slot.retain > 0 {
            return;
        }
        trace!(?id, "freeing simulated object");
        let children = match &mut slot.object {
            Object::DeviceSet(items) | Object::ElementArray(items) => std::mem::take(items),
            Object::Device(device) => {
                let mut owned = std::mem::take(&mut device.elements);
                owned.extend(device.last_value.take());
                owned
            }
            _ => Vec::new(),
        };
        for child in children {
            self.release(child);
        }
    }

    fn device(&self, id: SimRef) -> &SimDevice {
        match &self.slot(id).object {
            Object::Device(device) => device,
            _ => panic!("{id:?} is not a device"),
        }
    }

    fn device_mut(&mut self, id: SimRef) -> &mut SimDevice {
        match &mut self.slot_mut(id).object {
            Object::Device(device) => device,
            _ => panic!("{id:?} is not a device"),
        }
    }

    fn element(&self, id: SimRef) -> &SimElement {
        match &self.slot(id).object {
            Object::Element(element) => element,
            _ => panic!("{id:?} is not an element"),
        }
    }

    fn element_mut(&mut self, id: SimRef) -> &mut SimElement {
        match &mut self.slot_mut(id).object {
            Object::Element(element) => element,
            _ => panic!("{id:?} is not an element"),
        }
    }

    fn value(&self, id: SimRef) -> &SimValue {
        match &self.slot(id).object {
            Object::Value(value) => value,
            _ => panic!("{id:?} is not a value"),
        }
    }

    fn matching(&self, id: SimRef) -> &BTreeMap<MatchingKey, u32> {
        match &self.slot(id).object {
            Object::Matching(map) => map,
            _ => panic!("{id:?} is not a matching dictionary"),
        }
    }

    fn manager_mut(&mut self, id: SimRef) -> &mut SimManager {
        match &mut self.slot_mut(id).object {
            Object::Manager(manager) => manager,
            _ => panic!("{id:?} is not a manager"),
        }
    }

    fn items(&self, id: SimRef) -> Vec<SimRef> {
        match &self.slot(id).object {
            Object::DeviceSet(items) | Object::ElementArray(items) => items.clone(),
            _ => panic!("{id:?} is not a collection"),
        }
    }

    fn device_matches(&self, device: SimRef, matching: &BTreeMap<MatchingKey, u32>) -> bool {
        let page = matching.get(&MatchingKey::DeviceUsagePage);
        let usage = matching.get(&MatchingKey::DeviceUsage);
        self.device(device).usages.iter().any(|(p, u)| {
            page.map_or(true, |page| page == p) && usage.map_or(true, |usage| usage == u)
        })
    }

    fn element_matches(&self, element: SimRef, matching: &BTreeMap<MatchingKey, u32>) -> bool {
        let element = self.element(element);
        matching
            .get(&MatchingKey::ElementUsagePage)
            .map_or(true, |page| *page == element.usage_page)
            && matching
                .get(&MatchingKey::ElementUsage)
                .map_or(true, |usage| *usage == element.usage)
    }

    /// Status of a value access before it touches the element.
    fn value_access_status(&self, device: SimRef, element: SimRef) -> IoReturn {
        let dev = self.device(device);
        if dev.open_depth == 0 {
            IoReturn::NotOpen
        } else if !dev.connected {
            IoReturn::NoDevice
        } else if let Some(code) = dev.value_failure {
            code
        } else if self.element(element).device != device {
            IoReturn::BadArgument
        } else {
            IoReturn::Success
        }
    }
}

/// The simulated platform.
#[derive(Debug)]
pub enum SimPlatform {}

impl Platform for SimPlatform {
    type Manager = SimRef;
    type Matching = SimRef;
    type DeviceSet = SimRef;
    type Device = SimRef;
    type ElementArray = SimRef;
    type Element = SimRef;
    type Value = SimRef;

    fn create_matching() -> Option<SimRef> {
        with_world(|w| (!w.fail_allocations).then(|| w.alloc(Object::Matching(BTreeMap::new()))))
    }

    fn matching_insert(matching: SimRef, key: MatchingKey, value: u32) -> bool {
        with_world(|w| {
            if w.fail_allocations {
                return false;
            }
            match &mut w.slot_mut(matching).object {
                Object::Matching(map) => {
                    map.insert(key, value);
                    true
                }
                _ => panic!("{matching:?} is not a matching dictionary"),
            }
        })
    }

    fn matching_len(matching: SimRef) -> usize {
        with_world(|w| w.matching(matching).len())
    }

    fn create_manager() -> Option<SimRef> {
        with_world(|w| {
            (!w.fail_allocations).then(|| {
                w.alloc(Object::Manager(SimManager {
                    matching: None,
                    open: false,
                }))
            })
        })
    }

    fn manager_set_device_matching(manager: SimRef, matching: Option<SimRef>) {
        with_world(|w| {
            let matching = matching.map(|m| w.matching(m).clone());
            w.manager_mut(manager).matching = matching;
        })
    }

    fn manager_open(manager: SimRef) -> IoReturn {
        with_world(|w| {
            if let Some(code) = w.manager_open_failure {
                return code;
            }
            w.manager_mut(manager).open = true;
            IoReturn::Success
        })
    }

    fn manager_close(manager: SimRef) -> IoReturn {
        with_world(|w| {
            let manager = w.manager_mut(manager);
            if std::mem::replace(&mut manager.open, false) {
                IoReturn::Success
            } else {
                IoReturn::NotOpen
            }
        })
    }

    fn manager_copy_devices(manager: SimRef) -> Option<SimRef> {
        with_world(|w| {
            let matching = w.manager_mut(manager).matching.clone().unwrap_or_default();
            let devices: Vec<SimRef> = w
                .connected
                .iter()
                .copied()
                .filter(|&d| w.device_matches(d, &matching))
                .collect();
            if devices.is_empty() {
                return None;
            }
            for &device in &devices {
                w.retain(device);
            }
            Some(w.alloc(Object::DeviceSet(devices)))
        })
    }

    fn device_set_items(set: SimRef) -> Vec<SimRef> {
        with_world(|w| w.items(set))
    }

    fn device_conforms_to(device: SimRef, usage_page: u32, usage: u32) -> bool {
        with_world(|w| {
            w.device(device)
                .usages
                .iter()
                .any(|&(p, u)| p == usage_page && (usage == 0 || u == usage))
        })
    }

    fn device_string_property(device: SimRef, property: DeviceProperty) -> Option<String> {
        with_world(|w| {
            let device = w.device(device);
            match property {
                DeviceProperty::Manufacturer => device.manufacturer.clone(),
                DeviceProperty::Product => device.product.clone(),
            }
        })
    }

    fn device_copy_matching_elements(device: SimRef, matching: Option<SimRef>) -> Option<SimRef> {
        with_world(|w| {
            let matching = matching.map(|m| w.matching(m).clone()).unwrap_or_default();
            let elements: Vec<SimRef> = w
                .device(device)
                .elements
                .iter()
                .copied()
                .filter(|&e| w.element_matches(e, &matching))
                .collect();
            if elements.is_empty() {
                return None;
            }
            for &element in &elements {
                w.retain(element);
            }
            Some(w.alloc(Object::ElementArray(elements)))
        })
    }

    fn element_array_items(array: SimRef) -> Vec<SimRef> {
        with_world(|w| w.items(array))
    }

    fn device_open(device: SimRef) -> IoReturn {
        with_world(|w| {
            let device = w.device_mut(device);
            if !device.connected {
                IoReturn::NoDevice
            } else if device.busy {
                IoReturn::ExclusiveAccess
            } else {
                device.open_depth += 1;
                device.open_calls += 1;
                IoReturn::Success
            }
        })
    }

    fn device_close(device: SimRef) -> IoReturn {
        with_world(|w| {
            let device = w.device_mut(device);
            if device.open_depth == 0 {
                IoReturn::NotOpen
            } else {
                device.open_depth -= 1;
                IoReturn::Success
            }
        })
    }

    fn device_get_value(device: SimRef, element: SimRef) -> Result<SimRef, IoReturn> {
        with_world(|w| {
            let status = w.value_access_status(device, element);
            if !status.is_success() {
                return Err(status);
            }
            let value = SimValue {
                element,
                timestamp: w.clock,
                value: w.element(element).value,
            };
            let value = w.alloc(Object::Value(value));
            let dev = w.device_mut(device);
            dev.value_calls += 1;
            let previous = dev.last_value.replace(value);
            if let Some(previous) = previous {
                w.release(previous);
            }
            Ok(value)
        })
    }

    fn device_set_value(device: SimRef, element: SimRef, value: SimRef) -> IoReturn {
        with_world(|w| {
            let status = w.value_access_status(device, element);
            if !status.is_success() {
                return status;
            }
            let value = w.value(value);
            if value.element != element {
                return IoReturn::BadArgument;
            }
            let value = value.value;
            w.element_mut(element).value = value;
            w.device_mut(device).value_calls += 1;
            IoReturn::Success
        })
    }

    fn element_device(element: SimRef) -> SimRef {
        with_world(|w| w.element(element).device)
    }

    fn element_usage(element: SimRef) -> u32 {
        with_world(|w| w.element(element).usage)
    }

    fn element_usage_page(element: SimRef) -> u32 {
        with_world(|w| w.element(element).usage_page)
    }

    fn element_type(element: SimRef) -> u32 {
        with_world(|w| w.element(element).element_type.raw())
    }

    fn element_name(element: SimRef) -> Option<String> {
        with_world(|w| w.element(element).name.clone())
    }

    fn element_logical_min(element: SimRef) -> isize {
        with_world(|w| w.element(element).logical_min)
    }

    fn element_logical_max(element: SimRef) -> isize {
        with_world(|w| w.element(element).logical_max)
    }

    fn value_create_integer(element: SimRef, timestamp: u64, value: isize) -> Option<SimRef> {
        with_world(|w| {
            (!w.fail_allocations).then(|| {
                w.alloc(Object::Value(SimValue {
                    element,
                    timestamp,
                    value,
                }))
            })
        })
    }

    fn value_integer(value: SimRef) -> isize {
        with_world(|w| w.value(value).value)
    }

    fn timestamp() -> u64 {
        with_world(|w| {
            w.clock += 1;
            w.clock
        })
    }
}

/// Control and inspection of the current thread's simulated world.
pub struct SimWorld;

impl SimWorld {
    /// Start over with an empty world. Handles from the previous world must
    /// all have been dropped.
    pub fn reset() {
        with_world(|w| *w = World::default());
    }

    /// Plug a device in; returns its handle.
    pub fn add_device(spec: SimDeviceSpec) -> SimRef {
        with_world(|w| {
            let device = w.alloc(Object::Device(SimDevice {
                manufacturer: spec.manufacturer,
                product: spec.product,
                usages: spec.usages,
                elements: Vec::new(),
                connected: true,
                busy: false,
                open_depth: 0,
                open_calls: 0,
                value_calls: 0,
                value_failure: None,
                last_value: None,
            }));
            let elements: Vec<SimRef> = spec
                .elements
                .into_iter()
                .map(|e| {
                    w.alloc(Object::Element(SimElement {
                        device,
                        usage_page: e.usage_page,
                        usage: e.usage,
                        element_type: e.element_type,
                        name: e.name,
                        logical_min: e.logical_min,
                        logical_max: e.logical_max,
                        value: e.value,
                    }))
                })
                .collect();
            w.device_mut(device).elements = elements;
            w.connected.push(device);
            device
        })
    }

    /// Unplug a device. Outstanding handles stay valid but every access
    /// fails with `NoDevice`.
    pub fn remove_device(device: SimRef) {
        with_world(|w| {
            w.connected.retain(|&d| d != device);
            w.device_mut(device).connected = false;
            w.release(device);
        })
    }

    /// While busy, opening the device fails with `ExclusiveAccess`.
    pub fn set_busy(device: SimRef, busy: bool) {
        with_world(|w| w.device_mut(device).busy = busy)
    }

    /// Make value accesses on an open device fail with `code`.
    pub fn fail_value_access(device: SimRef, code: Option<IoReturn>) {
        with_world(|w| w.device_mut(device).value_failure = code)
    }

    /// Make every allocation (dictionaries, numbers, managers, values) fail.
    pub fn fail_allocations(fail: bool) {
        with_world(|w| w.fail_allocations = fail)
    }

    /// Make opening a HID manager fail with `code`.
    pub fn fail_manager_open(code: Option<IoReturn>) {
        with_world(|w| w.manager_open_failure = code)
    }

    /// Plug an element into an existing device; returns its handle.
    pub fn add_element(device: SimRef, spec: SimElementSpec) -> SimRef {
        with_world(|w| {
            let element = w.alloc(Object::Element(SimElement {
                device,
                usage_page: spec.usage_page,
                usage: spec.usage,
                element_type: spec.element_type,
                name: spec.name,
                logical_min: spec.logical_min,
                logical_max: spec.logical_max,
                value: spec.value,
            }));
            w.device_mut(device).elements.push(element);
            element
        })
    }

    /// Detach an element from its device. Arrays already holding it keep
    /// it alive.
    pub fn remove_element(element: SimRef) {
        with_world(|w| {
            let device = w.element(element).device;
            let elements = &mut w.device_mut(device).elements;
            let before = elements.len();
            elements.retain(|&e| e != element);
            if elements.len() < before {
                w.release(element);
            }
        })
    }

    pub fn is_open(device: SimRef) -> bool {
        with_world(|w| w.device(device).open_depth > 0)
    }

    /// Number of successful opens since the device was plugged in.
    pub fn open_calls(device: SimRef) -> usize {
        with_world(|w| w.device(device).open_calls)
    }

    /// Number of successful value reads and writes.
    pub fn value_calls(device: SimRef) -> usize {
        with_world(|w| w.device(device).value_calls)
    }

    pub fn elements(device: SimRef) -> Vec<SimRef> {
        with_world(|w| w.device(device).elements.clone())
    }

    pub fn element_value(element: SimRef) -> isize {
        with_world(|w| w.element(element).value)
    }

    /// Change an element's value behind the caller's back.
    pub fn set_element_value(element: SimRef, value: isize) {
        with_world(|w| w.element_mut(element).value = value)
    }

    /// Timestamp carried by a value object.
    pub fn value_timestamp(value: SimRef) -> u64 {
        with_world(|w| w.value(value).timestamp)
    }

    /// Zero for released objects.
    pub fn retain_count(id: SimRef) -> usize {
        with_world(|w| w.slots[id.0 as usize - 1].retain)
    }

    pub fn live_objects() -> usize {
        with_world(|w| w.slots.iter().filter(|s| s.retain > 0).count())
    }

    /// Managers currently open.
    pub fn open_managers() -> usize {
        with_world(|w| {
            w.slots
                .iter()
                .filter(|s| s.retain > 0 && matches!(&s.object, Object::Manager(m) if m.open))
                .count()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::owned::Owned;

    #[test]
    fn collections_retain_their_items() {
        let device = SimWorld::add_device(
            SimDeviceSpec::keyboard("Acme", "Board").element(SimElementSpec::led(1, "Num Lock")),
        );
        let element = SimWorld::elements(device)[0];

        let array = Owned::from_option(SimPlatform::device_copy_matching_elements(device, None));
        assert_eq!(SimWorld::retain_count(element), 2);
        drop(array);
        assert_eq!(SimWorld::retain_count(element), 1);
    }

    #[test]
    fn released_device_keeps_elements_while_referenced() {
        let device = SimWorld::add_device(
            SimDeviceSpec::keyboard("Acme", "Board").element(SimElementSpec::led(1, "Num Lock")),
        );
        let element = SimWorld::elements(device)[0];
        let array = Owned::from_option(SimPlatform::device_copy_matching_elements(device, None));

        SimWorld::remove_device(device);
        assert_eq!(SimWorld::retain_count(device), 0);
        assert_eq!(SimWorld::retain_count(element), 1);
        drop(array);
        assert_eq!(SimWorld::retain_count(element), 0);
    }

    #[test]
    #[should_panic(expected = "double release")]
    fn double_release_panics() {
        let matching = SimPlatform::create_matching().unwrap();
        matching.release();
        matching.release();
    }

    #[test]
    fn open_is_counted() {
        let device = SimWorld::add_device(SimDeviceSpec::keyboard("Acme", "Board"));
        assert_eq!(SimPlatform::device_close(device), IoReturn::NotOpen);
        assert_eq!(SimPlatform::device_open(device), IoReturn::Success);
        assert!(SimWorld::is_open(device));
        assert_eq!(SimPlatform::device_close(device), IoReturn::Success);
        assert!(!SimWorld::is_open(device));
        assert_eq!(SimWorld::open_calls(device), 1);

        SimWorld::set_busy(device, true);
        assert_eq!(SimPlatform::device_open(device), IoReturn::ExclusiveAccess);
    }

    #[test]
    fn unplugged_device_reports_not_open_until_opened() {
        let device = SimWorld::add_device(
            SimDeviceSpec::keyboard("Acme", "Board").element(SimElementSpec::led(1, "Num Lock")),
        );
        let element = SimWorld::elements(device)[0];
        let manager = Owned::from_option(SimPlatform::create_manager());
        let set = Owned::from_option(SimPlatform::manager_copy_devices(manager.get().unwrap()));
        assert!(set.get().is_some());

        SimWorld::remove_device(device);
        assert_eq!(
            SimPlatform::device_get_value(device, element),
            Err(IoReturn::NotOpen)
        );
        assert_eq!(SimPlatform::device_open(device), IoReturn::NoDevice);
    }

    #[test]
    fn manager_open_failure_is_injected() {
        SimWorld::fail_manager_open(Some(IoReturn::NotPrivileged));
        let manager = Owned::from_option(SimPlatform::create_manager());
        let raw = manager.get().unwrap();
        assert_eq!(SimPlatform::manager_open(raw), IoReturn::NotPrivileged);
        assert_eq!(SimWorld::open_managers(), 0);
    }

    #[test]
    fn removed_element_lives_on_in_arrays() {
        let device = SimWorld::add_device(SimDeviceSpec::keyboard("Acme", "Board"));
        let element = SimWorld::add_element(device, SimElementSpec::led(1, "Num Lock"));
        let array = Owned::from_option(SimPlatform::device_copy_matching_elements(device, None));
        assert_eq!(SimWorld::retain_count(element), 2);

        SimWorld::remove_element(element);
        assert!(SimWorld::elements(device).is_empty());
        assert_eq!(SimWorld::retain_count(element), 1);
        drop(array);
        assert_eq!(SimWorld::retain_count(element), 0);
    }

    #[test]
    #[should_panic(expected = "while the simulated world is borrowed")]
    fn release_inside_world_access_panics() {
        let matching = SimPlatform::create_matching().unwrap();
        with_world(|_| matching.release());
    }
}
