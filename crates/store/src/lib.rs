#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! On-disk package store for updraft
//!
//! `PackageStore` owns the current/previous slot pair for each deployment
//! key, plus the content-addressed bundle directories behind them. Slot
//! promotion is two-phase: the incoming record is fully written and synced
//! before any pointer moves, so a crash at any point leaves a readable
//! current package.
//!
//! Layout under the storage root:
//!
//! ```text
//! <root>/<deployment-key>/
//!     current.json          record of the running package
//!     previous.json         record of the rollback backup
//!     packages/<hash>/      unpacked bundles, keyed by content hash
//!     staging-<uuid>/       in-flight downloads
//! ```
//!
//! The store itself performs no locking; callers serialize slot mutation
//! (the deployment orchestrator holds one mutex over store and settings).

pub mod archive;
mod slots;

pub use slots::PackageStore;

pub(crate) const CURRENT_RECORD: &str = "current.json";
pub(crate) const PREVIOUS_RECORD: &str = "previous.json";
pub(crate) const INCOMING_RECORD: &str = "incoming.json";
pub(crate) const PACKAGES_DIR: &str = "packages";
