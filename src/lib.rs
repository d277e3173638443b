//! Growable bump arenas that keep outside pointers valid when their buffer moves.
//!
//! A [`Registry`] owns a bounded set of [`Arena`]s. Each arena is one
//! contiguous buffer with a bump cursor: allocation returns a [`Region`] at the
//! cursor and advances it. When a request does not fit, the buffer grows to the
//! next power of two above the bytes needed, and may move while doing so.
//!
//! Regions are offsets into the buffer and stay valid across moves. Raw
//! pointers into the buffer only stay valid if the variables holding them are
//! registered with the unsafe [`Arena::register_slot`]; the arena then rewrites
//! them after every move.
//!
//! With the `logging` feature enabled every arena event is reported through the
//! `log` crate.

#[macro_use]
mod logging;

mod arena;
pub mod backing;
mod buffer;
mod config;
mod error;
mod region;
mod registry;
mod relocation;

pub use arena::{next_capacity, Arena, ArenaId};
pub use backing::Backing;
pub use config::RegistryConfig;
pub use error::ArenaError;
pub use region::Region;
pub use registry::Registry;
