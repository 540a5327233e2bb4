//! Core types and evaluation logic for Warden.
//!
//! Everything here is pure and synchronous: the compliance evaluator and the
//! remediation generator are functions of their inputs. Storage backends
//! implement [`store::ComplianceStore`]; nothing in this crate performs I/O.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod evaluate;
pub mod exemption;
pub mod lifecycle;
pub mod registry;
pub mod remediation;
pub mod report;
pub mod resource;
pub mod rule;
pub mod snapshot;
pub mod store;
pub mod tag;
pub mod value;

pub use error::{Error, Result};
