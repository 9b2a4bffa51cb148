use std::time::Duration;
use tokio::time::sleep;

/// Request pacing policy for the Moltbook API.
///
/// The API tolerates roughly one request per second from a single client, so
/// the pacer enforces a fixed delay before every request rather than a
/// sliding window. The delay applies to the first request of a session too:
/// it costs one wasted delay at startup but keeps the policy unconditional.
#[derive(Debug, Clone)]
pub struct PacerConfig {
    pub delay: Duration,
}

impl PacerConfig {
    pub fn moltbook() -> Self {
        Self {
            delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
pub struct RequestPacer {
    delay: Duration,
}

impl RequestPacer {
    pub fn new(config: PacerConfig) -> Self {
        Self {
            delay: config.delay,
        }
    }

    /// Block until the next request is allowed to go out.
    pub async fn wait(&self) {
        sleep(self.delay).await;
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}
