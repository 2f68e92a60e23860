//! HTTP middleware applied to every route.

pub mod timing;

pub use timing::process_timing;
