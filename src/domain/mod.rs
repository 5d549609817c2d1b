//! Domain layer - Pure business logic.

pub mod cmd;
pub mod jobs;
pub mod publish;
pub mod stream;
