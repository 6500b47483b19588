//! Compute-once building blocks shared by both proxy families.
//!
//! [`Memo`] is a single-assignment slot with a double-checked initializer;
//! [`LazyList`] is an index-addressed sequence of memos whose elements are
//! produced by a [`SlotSource`] only when read.

mod list;
mod memo;

pub use list::{LazyList, SlotSource};
pub use memo::Memo;
