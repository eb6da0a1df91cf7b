#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Chain orchestration.

pub mod blockchain;
