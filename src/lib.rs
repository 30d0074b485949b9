//! Workspace umbrella crate.
//!
//! Exposes feature flags that map to the individual workspace crates
//! (`core-offline`, `bridge-desktop`). Host applications can depend on
//! `offline-workspace` and pick a feature set instead of wiring each crate.

#[cfg(any(feature = "core-only", feature = "desktop-shims"))]
pub use core_offline as offline;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop as desktop;
