//! Command handlers.

pub mod catalog;
pub mod serve;
