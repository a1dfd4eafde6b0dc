//! Shared wire definitions for the `DeskChat` support-chat REST API.

pub mod codec;
pub mod message;
