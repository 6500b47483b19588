//! Storage contracts consumed by the resolution layer.
//!
//! The stores that actually persist and version entities live outside this
//! crate; these traits describe the narrow boundary this crate needs, and
//! [`InMemoryObjectStore`] is a thread-safe reference backend for embedded
//! use and tests.

mod memory;
mod traits;

pub use memory::InMemoryObjectStore;
pub use traits::{ObjectResolver, SecuritySource, StorageError};
