//! Device elements, their values, and element enumeration.

use std::fmt;
use std::marker::PhantomData;

use tracing::{debug, trace};

use crate::backend::Platform;
use crate::device::{Device, DeviceOpener};
use crate::error::{HidError, HidResult};
use crate::io_return::IoReturn;
use crate::matching::{MatchTarget, MatchingCriteria, UsageFilter};
use crate::owned::Owned;

/// Kind of a HID element, as reported by the platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementType {
    InputMisc,
    InputButton,
    InputAxis,
    InputScanCodes,
    InputNull,
    Output,
    Feature,
    Collection,
    Unknown(u32),
}

impl ElementType {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => ElementType::InputMisc,
            2 => ElementType::InputButton,
            3 => ElementType::InputAxis,
            4 => ElementType::InputScanCodes,
            5 => ElementType::InputNull,
            129 => ElementType::Output,
            257 => ElementType::Feature,
            513 => ElementType::Collection,
            other => ElementType::Unknown(other),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            ElementType::InputMisc => 1,
            ElementType::InputButton => 2,
            ElementType::InputAxis => 3,
            ElementType::InputScanCodes => 4,
            ElementType::InputNull => 5,
            ElementType::Output => 129,
            ElementType::Feature => 257,
            ElementType::Collection => 513,
            ElementType::Unknown(other) => other,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::InputMisc => f.write_str("input (misc)"),
            ElementType::InputButton => f.write_str("input (button)"),
            ElementType::InputAxis => f.write_str("input (axis)"),
            ElementType::InputScanCodes => f.write_str("input (scan codes)"),
            ElementType::InputNull => f.write_str("input (null)"),
            ElementType::Output => f.write_str("output"),
            ElementType::Feature => f.write_str("feature"),
            ElementType::Collection => f.write_str("collection"),
            ElementType::Unknown(raw) => write!(f, "unknown ({raw})"),
        }
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for isize {}
}

/// Rust type an element value can be read as and written from.
///
/// Closed set; only integer values are supported.
pub trait ValueKind: Copy + sealed::Sealed {
    fn from_value<P: Platform>(value: P::Value) -> Self;

    /// Create rule; `None` when the value object cannot be allocated.
    fn create_value<P: Platform>(element: P::Element, timestamp: u64, value: Self)
        -> Option<P::Value>;
}

impl ValueKind for isize {
    fn from_value<P: Platform>(value: P::Value) -> Self {
        P::value_integer(value)
    }

    fn create_value<P: Platform>(element: P::Element, timestamp: u64, value: Self)
        -> Option<P::Value> {
        P::value_create_integer(element, timestamp, value)
    }
}

/// One reportable field of a device, e.g. a single LED.
///
/// A view borrowed from the [`ElementEnumerator`] that produced it.
pub struct Element<'e, P: Platform> {
    raw: P::Element,
    _enumerator: PhantomData<&'e ()>,
}

impl<P: Platform> Clone for Element<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: Platform> Copy for Element<'_, P> {}

impl<'e, P: Platform> Element<'e, P> {
    pub(crate) fn from_raw(raw: P::Element) -> Self {
        Self {
            raw,
            _enumerator: PhantomData,
        }
    }

    pub fn as_raw(&self) -> P::Element {
        self.raw
    }

    pub fn usage(&self) -> u32 {
        P::element_usage(self.raw)
    }

    pub fn usage_page(&self) -> u32 {
        P::element_usage_page(self.raw)
    }

    pub fn element_type(&self) -> ElementType {
        ElementType::from_raw(P::element_type(self.raw))
    }

    pub fn name(&self) -> Option<String> {
        P::element_name(self.raw)
    }

    pub fn logical_min(&self) -> isize {
        P::element_logical_min(self.raw)
    }

    pub fn logical_max(&self) -> isize {
        P::element_logical_max(self.raw)
    }

    /// The device this element belongs to.
    pub fn device(&self) -> Device<'e, P> {
        Device::from_raw(P::element_device(self.raw))
    }

    /// Accessor for the element's current value.
    pub fn value<T: ValueKind>(&self) -> ElementValue<'e, P, T> {
        ElementValue {
            element: *self,
            _kind: PhantomData,
        }
    }
}

impl<P: Platform> fmt::Debug for Element<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("usage_page", &self.usage_page())
            .field("usage", &self.usage())
            .field("type", &self.element_type())
            .field("name", &self.name())
            .field("logical_min", &self.logical_min())
            .field("logical_max", &self.logical_max())
            .finish()
    }
}

/// Reads and writes go straight to the device; nothing is cached.
///
/// When the device is not open, a session is opened for the single access
/// and closed right after. Hold a [`DeviceOpener`] across several accesses
/// to avoid reopening the device each time.
pub struct ElementValue<'e, P: Platform, T: ValueKind> {
    element: Element<'e, P>,
    _kind: PhantomData<T>,
}

impl<'e, P: Platform, T: ValueKind> ElementValue<'e, P, T> {
    pub fn get(&self) -> HidResult<T> {
        let element = self.element.raw;
        let device = P::element_device(element);
        with_open_device::<P, _, _>(device, "get value", || {
            P::device_get_value(device, element).map(T::from_value::<P>)
        })
    }

    /// Write `value`. The logical range is not checked here.
    ///
    /// # Panic
    /// Panics if the platform cannot allocate the value object.
    pub fn set(&self, value: T) -> HidResult<()> {
        let element = self.element.raw;
        let device = P::element_device(element);
        let object = Owned::from_option(T::create_value::<P>(element, P::timestamp(), value));
        let Some(raw_value) = object.get() else {
            panic!("cannot allocate element value");
        };
        with_open_device::<P, _, _>(device, "set value", || {
            let code = P::device_set_value(device, element, raw_value);
            if code.is_success() {
                Ok(())
            } else {
                Err(code)
            }
        })
    }
}

/// Run `access`; if the device turns out not to be open, open it for the
/// duration of one retry.
fn with_open_device<P, T, F>(device: P::Device, operation: &'static str, mut access: F) -> HidResult<T>
where
    P: Platform,
    F: FnMut() -> Result<T, IoReturn>,
{
    match access() {
        Err(IoReturn::NotOpen) => {}
        other => return other.map_err(|code| HidError::UnexpectedStatus { operation, code }),
    }

    let session = DeviceOpener::<P>::open_raw(device);
    if !session.is_open() {
        return Err(HidError::CannotOpen {
            code: session.result(),
        });
    }
    trace!(operation, "device opened for a single access");
    access().map_err(|code| HidError::UnexpectedStatus { operation, code })
}

/// Snapshot of a device's elements matching a filter.
///
/// The enumerator owns the platform array; the [`Element`]s it hands out
/// borrow it. Re-querying needs a new enumerator.
pub struct ElementEnumerator<'d, P: Platform> {
    elements: Vec<P::Element>,
    _array: Owned<P::ElementArray>,
    _device: PhantomData<&'d ()>,
}

impl<'d, P: Platform> ElementEnumerator<'d, P> {
    pub fn new(device: Device<'d, P>, filter: UsageFilter) -> Self {
        let criteria = MatchingCriteria::<P>::build(MatchTarget::Elements, filter);
        let array = Owned::from_option(P::device_copy_matching_elements(
            device.as_raw(),
            criteria.as_raw(),
        ));
        drop(criteria);

        let elements = match array.get() {
            Some(raw) => P::element_array_items(raw),
            None => Vec::new(),
        };
        debug!(count = elements.len(), %filter, "enumerated elements");

        Self {
            elements,
            _array: array,
            _device: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Element<'_, P>> {
        self.elements.get(index).copied().map(Element::from_raw)
    }

    pub fn iter(&self) -> Elements<'_, P> {
        Elements {
            inner: self.elements.iter(),
        }
    }
}

impl<'a, 'd, P: Platform> IntoIterator for &'a ElementEnumerator<'d, P> {
    type Item = Element<'a, P>;
    type IntoIter = Elements<'a, P>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the elements of an [`ElementEnumerator`].
pub struct Elements<'a, P: Platform> {
    inner: std::slice::Iter<'a, P::Element>,
}

impl<'a, P: Platform> Iterator for Elements<'a, P> {
    type Item = Element<'a, P>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().copied().map(Element::from_raw)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<P: Platform> ExactSizeIterator for Elements<'_, P> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_type_raw_values() {
        for raw in [1, 2, 3, 4, 5, 129, 257, 513, 77] {
            assert_eq!(ElementType::from_raw(raw).raw(), raw);
        }
        assert_eq!(ElementType::from_raw(129), ElementType::Output);
        assert_eq!(ElementType::from_raw(77), ElementType::Unknown(77));
    }
}
