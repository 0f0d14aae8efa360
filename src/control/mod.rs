//! Migration control loop.
//!
//! Rules flow in through the listener and out as address-source swaps:
//! - [`step`] - address-resolution policies
//! - [`identity`] - consumer identity used for rule matching
//! - [`rule`] - rule snapshots and per-consumer resolution
//! - [`source`] - address sources, comparators and routing snapshots
//! - [`invoker`] - invoker contract and the hot-swapping implementation
//! - [`handler`] - per-consumer orchestration and committed state
//! - [`listener`] - fan-out of rule snapshots to handlers
//!
//! # Ordering
//!
//! Transitions for one consumer are serialized by its handler's lock; the
//! invoker additionally serializes its own slot updates. Nothing here is
//! cancellable: once a transition starts it runs to completion on the calling
//! thread.

pub mod handler;
pub mod identity;
pub mod invoker;
pub mod listener;
pub mod rule;
pub mod source;
pub mod step;
