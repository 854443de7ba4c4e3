//! Core types for tessera.

pub mod conversation;
pub mod generation;
pub mod items;
pub mod message;
pub mod stream;
pub mod usage;

pub use conversation::*;
pub use generation::*;
pub use items::*;
pub use message::*;
pub use stream::*;
pub use usage::*;
