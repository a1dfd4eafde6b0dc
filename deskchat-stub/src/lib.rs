//! `DeskChat` stub backend library.
//!
//! Exposes the stub server for use in tests and local development. The
//! server keeps one support conversation in memory and speaks the same REST
//! endpoints as the real support backend.

pub mod config;
pub mod server;
pub mod store;
