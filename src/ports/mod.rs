//! Ports - Trait definitions implemented by adapters.

pub mod probe;
pub mod queue;
pub mod repository;
pub mod transcoder;
