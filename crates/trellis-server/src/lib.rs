//! HTTP gateway for the Trellis search core.
//!
//! This crate is primarily used by the `trellis` server binary; the
//! [`gateway`] module exposes the router so integration tests can drive it
//! in-process.

pub mod gateway;
