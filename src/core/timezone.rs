//! Site timezone, shared between generators and the router manager.

use arc_swap::ArcSwap;
use chrono_tz::Tz;
use std::sync::Arc;

/// Lock-free holder of the site timezone
///
/// Generators read it on every permalink expansion; timezone edits
/// replace it atomically before dated routers regenerate.
#[derive(Debug)]
pub struct SiteTimezone(ArcSwap<Tz>);

impl SiteTimezone {
    pub fn new(tz: Tz) -> Self {
        Self(ArcSwap::from_pointee(tz))
    }

    #[inline]
    pub fn get(&self) -> Tz {
        **self.0.load()
    }

    /// Replace the timezone. Returns `true` if it changed.
    pub fn set(&self, tz: Tz) -> bool {
        let previous = self.0.swap(Arc::new(tz));
        *previous != tz
    }
}

impl Default for SiteTimezone {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}
