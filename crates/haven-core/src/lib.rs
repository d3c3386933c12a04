//! Core types, rules and collaborator traits for the Haven accommodation
//! lifecycle engine.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Storage backends implement [`store::AccommodationStore`]; message buses
//! implement [`outbox::EventBus`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod bedspace;
pub mod calendar;
pub mod clock;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod event;
pub mod memory;
pub mod model;
pub mod outbox;
pub mod premises;
pub mod store;
pub mod validation;

pub use engine::{Engine, Rules, Transition};
pub use error::{Error, Result};
pub use validation::{Outcome, Rejection, ValidationCode};

#[cfg(test)]
mod tests;
