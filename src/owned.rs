//! Scoped ownership of reference-counted platform objects.

use std::fmt;

/// A raw reference to a reference-counted platform object.
///
/// Implementors are plain handles (pointers, ids); copying one does not
/// retain the object. Ownership is tracked by [`Owned`].
pub trait RawRef: Copy {
    /// Drop one reference to the object.
    fn release(self);
}

/// Owns exactly one reference to a platform object, or nothing.
///
/// The reference is released once, when the wrapper is dropped, released
/// explicitly or replaced. Only references obtained under the platform's
/// create/copy rule may be handed to an `Owned`.
pub struct Owned<R: RawRef> {
    raw: Option<R>,
}

impl<R: RawRef> Owned<R> {
    pub fn new(raw: R) -> Self {
        Self { raw: Some(raw) }
    }

    /// Adopt a nullable reference; `None` yields an empty wrapper.
    pub fn from_option(raw: Option<R>) -> Self {
        Self { raw }
    }

    pub const fn empty() -> Self {
        Self { raw: None }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_none()
    }

    /// The raw reference, for passing to platform calls.
    ///
    /// The result borrows the object: it stays valid only while `self` holds it.
    pub fn get(&self) -> Option<R> {
        self.raw
    }

    /// Release the held reference, if any. Calling it again is a no-op.
    pub fn release(&mut self) {
        if let Some(raw) = self.raw.take() {
            raw.release();
        }
    }

    /// Move the reference into a new wrapper, leaving this one empty.
    pub fn take(&mut self) -> Self {
        Self {
            raw: self.raw.take(),
        }
    }

    /// Release whatever is held, then adopt `other`'s reference.
    pub fn replace(&mut self, mut other: Owned<R>) {
        self.release();
        self.raw = other.raw.take();
    }

    /// Give up ownership without releasing.
    pub fn into_raw(mut self) -> Option<R> {
        self.raw.take()
    }
}

impl<R: RawRef> Default for Owned<R> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<R: RawRef> Drop for Owned<R> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<R: RawRef + fmt::Debug> fmt::Debug for Owned<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.raw {
            Some(raw) => f.debug_tuple("Owned").field(raw).finish(),
            None => f.write_str("Owned(null)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    thread_local! {
        static RELEASED: RefCell<Vec<u32>> = const { RefCell::new(Vec::new()) };
    }

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Tracked(u32);

    impl RawRef for Tracked {
        fn release(self) {
            RELEASED.with(|r| r.borrow_mut().push(self.0));
        }
    }

    fn released() -> Vec<u32> {
        RELEASED.with(|r| r.borrow().clone())
    }

    #[test]
    fn drop_releases_once() {
        {
            let _a = Owned::new(Tracked(1));
        }
        assert_eq!(released(), vec![1]);
    }

    #[test]
    fn release_is_idempotent() {
        let mut a = Owned::new(Tracked(7));
        a.release();
        a.release();
        assert!(a.is_empty());
        drop(a);
        assert_eq!(released(), vec![7]);
    }

    #[test]
    fn take_leaves_source_empty() {
        let mut a = Owned::new(Tracked(3));
        let b = a.take();
        assert!(a.is_empty());
        assert_eq!(b.get(), Some(Tracked(3)));
        a.release();
        assert!(released().is_empty());
        drop(b);
        assert_eq!(released(), vec![3]);
    }

    #[test]
    fn replace_releases_previous() {
        let mut a = Owned::new(Tracked(1));
        a.replace(Owned::new(Tracked(2)));
        assert_eq!(released(), vec![1]);
        assert_eq!(a.get(), Some(Tracked(2)));
        drop(a);
        assert_eq!(released(), vec![1, 2]);
    }

    #[test]
    fn into_raw_does_not_release() {
        let a = Owned::new(Tracked(5));
        assert_eq!(a.into_raw(), Some(Tracked(5)));
        assert!(released().is_empty());
    }

    #[test]
    fn default_and_null_are_empty() {
        let a: Owned<Tracked> = Owned::default();
        let b: Owned<Tracked> = Owned::from_option(None);
        assert!(a.is_empty() && b.is_empty());
        assert_eq!(format!("{b:?}"), "Owned(null)");
    }
}
