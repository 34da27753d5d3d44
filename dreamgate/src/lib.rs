//! Dreamgate - gateway library for the Jimeng/Dreamina generation service
//!
//! This library implements the core of an OpenAI-style gateway in front of
//! the upstream AI image/video generation service: credential handling,
//! the signed upload handshake, payload construction, smart polling, a
//! per-session daily quota ledger, and an asynchronous task engine.
//!
//! # High-Level API
//!
//! ```ignore
//! use dreamgate::config::GatewayConfig;
//! use dreamgate::engine::Engine;
//!
//! let config = GatewayConfig::load()?;
//! let engine = Engine::new(config)?;
//! engine.start();
//!
//! let urls = engine
//!     .controller()
//!     .generate_image(request, &credential)
//!     .await?;
//! ```
//!
//! The HTTP surface lives in the `dreamgate-server` crate; this library is
//! deliberately free of any router or CLI concerns.

pub mod config;
pub mod credential;
pub mod engine;
pub mod generation;
pub mod logging;
pub mod payload;
pub mod poll;
pub mod quota;
pub mod task;
pub mod upload;
pub mod upstream;

/// Version of the Dreamgate library and server.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
