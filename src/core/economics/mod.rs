#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Economics: mining reward distribution.

pub mod incentive;
