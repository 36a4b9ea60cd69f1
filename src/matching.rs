//! Matching criteria used to filter device and element enumeration.

use std::fmt;

use tracing::warn;

use crate::backend::{MatchingKey, Platform};
use crate::owned::Owned;

/// Whether a matching dictionary filters devices or the elements of a device.
///
/// The platform uses different property keys for the two.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchTarget {
    Devices,
    Elements,
}

impl MatchingKey {
    pub fn page_for(target: MatchTarget) -> Self {
        match target {
            MatchTarget::Devices => MatchingKey::DeviceUsagePage,
            MatchTarget::Elements => MatchingKey::ElementUsagePage,
        }
    }

    pub fn usage_for(target: MatchTarget) -> Self {
        match target {
            MatchTarget::Devices => MatchingKey::DeviceUsage,
            MatchTarget::Elements => MatchingKey::ElementUsage,
        }
    }
}

/// Usage page / usage restriction. A usage is only meaningful within a page.
///
/// Zero means "unrestricted" for both the page and the usage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UsageFilter {
    #[default]
    Any,
    Page(u32),
    PageUsage(u32, u32),
}

impl UsageFilter {
    pub fn any() -> Self {
        UsageFilter::Any
    }

    pub fn page(usage_page: u32) -> Self {
        UsageFilter::Page(usage_page)
    }

    pub fn usage(usage_page: u32, usage: u32) -> Self {
        UsageFilter::PageUsage(usage_page, usage)
    }

    /// Build a filter from independently optional parts. A usage without a
    /// page is dropped.
    pub fn from_parts(usage_page: Option<u32>, usage: Option<u32>) -> Self {
        match (usage_page, usage) {
            (Some(page), Some(usage)) => UsageFilter::PageUsage(page, usage),
            (Some(page), None) => UsageFilter::Page(page),
            (None, Some(usage)) => {
                warn!(usage, "usage given without a usage page, ignoring it");
                UsageFilter::Any
            }
            (None, None) => UsageFilter::Any,
        }
    }

    pub fn usage_page(&self) -> Option<u32> {
        match *self {
            UsageFilter::Page(page) | UsageFilter::PageUsage(page, _) if page != 0 => Some(page),
            _ => None,
        }
    }

    /// The usage, only when a page is set as well.
    pub fn usage_id(&self) -> Option<u32> {
        match *self {
            UsageFilter::PageUsage(page, usage) if page != 0 && usage != 0 => Some(usage),
            _ => None,
        }
    }
}

impl fmt::Display for UsageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.usage_page(), self.usage_id()) {
            (Some(page), Some(usage)) => write!(f, "{page:#04x}:{usage:#04x}"),
            (Some(page), None) => write!(f, "{page:#04x}:*"),
            _ => f.write_str("*"),
        }
    }
}

/// A platform matching dictionary, alive for one enumeration call.
pub struct MatchingCriteria<P: Platform> {
    dictionary: Owned<P::Matching>,
}

impl<P: Platform> MatchingCriteria<P> {
    /// # Panic
    /// Panics if the platform cannot allocate the dictionary or its numbers.
    pub fn build(target: MatchTarget, filter: UsageFilter) -> Self {
        let dictionary = Owned::from_option(P::create_matching());
        let Some(raw) = dictionary.get() else {
            panic!("cannot allocate matching dictionary");
        };

        if let Some(page) = filter.usage_page() {
            Self::insert(raw, MatchingKey::page_for(target), page);
            if let Some(usage) = filter.usage_id() {
                Self::insert(raw, MatchingKey::usage_for(target), usage);
            }
        }

        Self { dictionary }
    }

    fn insert(raw: P::Matching, key: MatchingKey, value: u32) {
        assert!(
            P::matching_insert(raw, key, value),
            "cannot allocate number for {key:?}"
        );
    }

    /// Number of keys in the dictionary.
    pub fn len(&self) -> usize {
        self.dictionary.get().map_or(0, P::matching_len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_raw(&self) -> Option<P::Matching> {
        self.dictionary.get()
    }
}
