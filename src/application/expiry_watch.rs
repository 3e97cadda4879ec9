use super::token_lifecycle::{TickOutcome, TokenLifecycleManager};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Background ticker that regenerates the payment token once it expires.
///
/// Ticks that land while a regeneration is still running are no-ops, so a
/// slow gateway never causes a burst of requests. The task stops when the
/// watch is dropped.
pub struct ExpiryWatch {
    handle: JoinHandle<()>,
}

impl ExpiryWatch {
    /// Starts checking `manager` every `period`.
    pub fn spawn(manager: Arc<TokenLifecycleManager>, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if manager.on_tick().await == TickOutcome::Started {
                    tracing::debug!("expiry watch started a regeneration");
                }
            }
        });
        Self { handle }
    }

    /// Stops the watch. Dropping it has the same effect.
    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for ExpiryWatch {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenPolicy;
    use crate::domain::token::Receiver;
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::in_memory::InMemoryGateway;
    use crate::application::token_lifecycle::RegenerateOutcome;

    #[tokio::test(start_paused = true)]
    async fn test_watch_replaces_expired_token() {
        let clock = ManualClock::default();
        let gateway = InMemoryGateway::with_clock(Arc::new(clock.clone()));
        let manager = Arc::new(TokenLifecycleManager::new(
            Arc::new(gateway.clone()),
            Arc::new(clock.clone()),
            Receiver::new("+250788000000", "Alice"),
            TokenPolicy::default(),
        ));
        let RegenerateOutcome::Applied(first) = manager.regenerate().await else {
            panic!("initial generation failed");
        };

        let watch = ExpiryWatch::spawn(Arc::clone(&manager), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(gateway.create_token_calls(), 1);

        clock.advance(Duration::from_secs(300));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(gateway.create_token_calls(), 2);
        let current = manager.current_token().await.unwrap();
        assert_ne!(current.token_id(), first.token_id());

        watch.stop();
        clock.advance(Duration::from_secs(600));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(gateway.create_token_calls(), 2);
    }
}
