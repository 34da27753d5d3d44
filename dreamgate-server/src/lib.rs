//! Dreamgate HTTP surface.
//!
//! Library half of the server crate: the router, handlers, error
//! mapping, and credential extraction. The `dreamgate` binary in
//! `main.rs` is a thin clap wrapper around [`server::serve`].

pub mod auth;
pub mod error;
pub mod routes;
pub mod server;
