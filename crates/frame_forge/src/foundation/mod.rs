//! Foundation module - logging and other crate-wide utilities

pub mod logging;
