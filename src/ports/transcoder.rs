use async_trait::async_trait;
use std::error::Error;

/// Contract for starting and stopping encoder processes for one user.
/// The publish gate calls this after acknowledging a main publish; the
/// call must not block the publish handshake, so the gate detaches it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Probe `source` and spawn the encoder ladder for `user_id`.
    /// Returns once the process has been spawned, not once it produces
    /// output.
    async fn start(&self, user_id: &str, source: &str)
        -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Tear down the registered encoder. `Ok(false)` when nothing is
    /// registered under the key.
    async fn stop(&self, user_id: &str) -> Result<bool, Box<dyn Error + Send + Sync>>;
}
