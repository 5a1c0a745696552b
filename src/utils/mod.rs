//! Shared utilities used across the engine.
//!
//! Small, dependency-light helpers that several layers reach for:
//!
//! - [`collections`] - update-map construction sugar for node authors
//! - [`id_generator`] - run/session/record id generation, seedable for tests
//! - [`json_ext`] - deep merge, dotted-path access, JSON serialization trait

pub mod collections;
pub mod id_generator;
pub mod json_ext;
