//! `approute` core: application identifiers, service modules, regions,
//! fallback URLs and router documents.
//!
//! Everything in this crate is pure: no I/O, no async, no shared state.

pub mod app_id;
pub mod clock;
pub mod document;
pub mod module;
pub mod region;

pub use app_id::{AppId, InvalidAppId};
pub use clock::{ClockSource, ManualClock, SystemClock};
pub use document::{normalize_server_url, DocumentError, RouterDocument, RtmRouterDocument};
pub use module::{Module, UnknownModule};
pub use region::{FallbackResolver, Region};
