use std::time::Duration;

use async_trait::async_trait;

/// Spacing between consecutive calls to an external service.
#[async_trait]
pub trait Pacer: Send + Sync {
    /// Called once after every external call, successful or not.
    async fn pause(&self);
}

/// Sleep for a fixed interval.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

#[async_trait]
impl Pacer for FixedDelay {
    async fn pause(&self) {
        if !self.0.is_zero() {
            tokio::time::sleep(self.0).await;
        }
    }
}

/// No spacing at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

#[async_trait]
impl Pacer for NoDelay {
    async fn pause(&self) {}
}
