//! Support chat client core for `DeskChat`: optimistic sends, history
//! polling and reconciliation of the visible message list.

pub mod chat;
pub mod config;
pub mod screen;
pub mod transcript;
pub mod transport;
