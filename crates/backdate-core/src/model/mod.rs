//! Plain data types shared by the store, the reconstructor and the resolver.

pub mod event;
pub mod item;
pub mod rule;
pub mod snapshot;
pub mod tag;
