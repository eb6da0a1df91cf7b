#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Security: wallet keys and signatures.

pub mod keystore;
