#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Pending-entry buffering and validation.

pub mod entry_pool;
