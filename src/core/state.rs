//! Lifecycle state of the routing layer.
//!
//! Three states, advanced in order:
//! - `Uninitialized`: no routers built yet
//! - `Building`: routers built, url generation in progress
//! - `Ready`: the url service finished its `init` stage

use std::sync::atomic::{AtomicU8, Ordering};

/// Router manager lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ServiceState {
    Uninitialized = 0,
    Building = 1,
    Ready = 2,
}

impl ServiceState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Uninitialized,
            1 => Self::Building,
            _ => Self::Ready,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Building => "building",
            Self::Ready => "ready",
        }
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic holder for [`ServiceState`], shareable across threads.
#[derive(Debug, Default)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub const fn new() -> Self {
        Self(AtomicU8::new(ServiceState::Uninitialized as u8))
    }

    pub fn get(&self) -> ServiceState {
        ServiceState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: ServiceState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Move from `from` to `to` only if currently in `from`.
    ///
    /// Returns `true` if the transition happened.
    pub fn advance(&self, from: ServiceState, to: ServiceState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_ready(&self) -> bool {
        self.get() == ServiceState::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_uninitialized() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), ServiceState::Uninitialized);
        assert!(!cell.is_ready());
    }

    #[test]
    fn test_advance_only_from_expected() {
        let cell = StateCell::new();
        assert!(!cell.advance(ServiceState::Building, ServiceState::Ready));
        assert!(cell.advance(ServiceState::Uninitialized, ServiceState::Building));
        assert!(cell.advance(ServiceState::Building, ServiceState::Ready));
        assert!(cell.is_ready());
    }

    #[test]
    fn test_set_resets() {
        let cell = StateCell::new();
        cell.set(ServiceState::Ready);
        cell.set(ServiceState::Uninitialized);
        assert_eq!(cell.get().as_str(), "uninitialized");
    }
}
