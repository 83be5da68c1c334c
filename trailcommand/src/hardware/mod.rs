//! Hardware access

pub mod gpio;
