//! # Tally Module
//!
//! Everything that touches the NextList worksheet.
//!
//! ## Contained Modules:
//! - **`store`**: the narrow `TallyStore` interface and an in-memory grid.
//! - **`sheets`**: a Google Sheets v4 implementation of `TallyStore` (feature
//!   `retrieve`).
//! - **`applier`**: applies vote intents to the store and keeps it sorted.

/// Applies vote intents and resorts the worksheet.
pub mod applier;
/// Google Sheets backed store.
#[cfg(feature = "retrieve")]
pub mod sheets;
/// Store interface and in-memory implementation.
pub mod store;

pub use applier::{TallyApplier, TallyError, TallyUpdate};
#[cfg(feature = "retrieve")]
pub use sheets::{SheetsStore, SHEETS_SCOPES};
pub use store::{CellRef, MemorySheet, RowRange, SortKey, SortOrder, StoreError, TallyStore};
