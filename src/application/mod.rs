//! Application layer - Services wiring domain logic to ports.

pub mod dispatcher;
pub mod publish;
pub mod registry;
pub mod transcode;
pub mod worker;
