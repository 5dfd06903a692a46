//! Circuit breakers for external providers.
//!
//! Each provider (text, image, speech) gets its own breaker so an image
//! outage never blocks text generation. The breaker trips after a run of
//! consecutive failures, fails fast while open, and lets exactly one probe
//! call through once the recovery timeout elapses.

use std::sync::Arc;
use std::time::{Duration, Instant};

use taleforge_common::{AppError, AppResult};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Breaker configuration.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// Time the breaker stays open before allowing a probe.
    pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(120),
        }
    }
}

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls pass through. Consecutive failures are counted.
    Closed,
    /// Calls fail fast without touching the provider.
    Open,
    /// One probe call is in flight; its outcome decides the next state.
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Set while a half-open probe is in flight, so concurrent callers
    /// keep failing fast instead of piling onto the recovering provider.
    probing: bool,
}

/// A circuit breaker guarding one external provider.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: &'static str,
    config: BreakerConfig,
    inner: Arc<Mutex<BreakerInner>>,
}

impl CircuitBreaker {
    /// Create a closed breaker for the named provider.
    #[must_use]
    pub fn new(name: &'static str, config: BreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Arc::new(Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probing: false,
            })),
        }
    }

    /// Current state, transitioning OPEN to HALF_OPEN if the recovery
    /// timeout has elapsed.
    pub async fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock().await;
        self.refresh(&mut inner);
        inner.state
    }

    /// Run `operation` through the breaker.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ServiceUnavailable`] without calling the
    /// provider while the breaker is open (or a probe is already in
    /// flight), otherwise propagates the operation's own error.
    pub async fn call<F, Fut, T>(&self, operation: F) -> AppResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        {
            let mut inner = self.inner.lock().await;
            self.refresh(&mut inner);

            match inner.state {
                BreakerState::Open => {
                    return Err(AppError::ServiceUnavailable(format!(
                        "{} provider circuit open",
                        self.name
                    )));
                }
                BreakerState::HalfOpen => {
                    if inner.probing {
                        return Err(AppError::ServiceUnavailable(format!(
                            "{} provider circuit half-open, probe in flight",
                            self.name
                        )));
                    }
                    inner.probing = true;
                }
                BreakerState::Closed => {}
            }
        }

        let result = operation().await;

        let mut inner = self.inner.lock().await;
        match &result {
            Ok(_) => self.on_success(&mut inner),
            // Fast-fail rejections from a nested breaker are not provider
            // failures and must not move this breaker's counters.
            Err(AppError::ServiceUnavailable(_)) => inner.probing = false,
            Err(_) => self.on_failure(&mut inner),
        }

        result
    }

    /// Consecutive failure count, for maintenance logging.
    pub async fn failure_count(&self) -> u32 {
        self.inner.lock().await.consecutive_failures
    }

    fn refresh(&self, inner: &mut BreakerInner) {
        if inner.state == BreakerState::Open {
            let elapsed = inner.opened_at.map(|t| t.elapsed());
            if elapsed.is_some_and(|e| e >= self.config.recovery_timeout) {
                info!(provider = self.name, "circuit breaker half-open, allowing probe");
                inner.state = BreakerState::HalfOpen;
                inner.probing = false;
            }
        }
    }

    fn on_success(&self, inner: &mut BreakerInner) {
        if inner.state != BreakerState::Closed {
            info!(provider = self.name, "circuit breaker closed after successful probe");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.probing = false;
    }

    fn on_failure(&self, inner: &mut BreakerInner) {
        inner.probing = false;

        match inner.state {
            BreakerState::HalfOpen => {
                warn!(provider = self.name, "probe failed, circuit breaker re-opened");
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
            }
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        provider = self.name,
                        failures = inner.consecutive_failures,
                        "failure threshold reached, circuit breaker opened"
                    );
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            BreakerState::Open => {}
        }
    }
}

/// One breaker per external provider.
#[derive(Debug, Clone)]
pub struct ProviderBreakers {
    /// Guards the text generation provider.
    pub text: CircuitBreaker,
    /// Guards the image generation provider.
    pub image: CircuitBreaker,
    /// Guards the speech synthesis provider.
    pub speech: CircuitBreaker,
}

impl ProviderBreakers {
    /// Create one breaker per provider, all sharing the same configuration.
    #[must_use]
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            text: CircuitBreaker::new("text", config.clone()),
            image: CircuitBreaker::new("image", config.clone()),
            speech: CircuitBreaker::new("speech", config.clone()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn fast_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_millis(50),
        }
    }

    async fn fail(breaker: &CircuitBreaker) -> AppResult<()> {
        breaker
            .call(|| async { Err(AppError::ExternalService("provider down".into())) })
            .await
    }

    #[tokio::test]
    async fn test_opens_after_consecutive_failures() {
        let breaker = CircuitBreaker::new("text", fast_config());

        for _ in 0..3 {
            assert!(matches!(fail(&breaker).await, Err(AppError::ExternalService(_))));
        }

        assert_eq!(breaker.state().await, BreakerState::Open);

        // While open the provider is never called.
        let result = breaker.call(|| async { Ok::<_, AppError>(1) }).await;
        assert!(matches!(result, Err(AppError::ServiceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let breaker = CircuitBreaker::new("text", fast_config());

        fail(&breaker).await.ok();
        fail(&breaker).await.ok();
        breaker.call(|| async { Ok::<_, AppError>(()) }).await.unwrap();
        fail(&breaker).await.ok();
        fail(&breaker).await.ok();

        // Failures were not consecutive, so the breaker stays closed.
        assert_eq!(breaker.state().await, BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_probe_success_closes_breaker() {
        let breaker = CircuitBreaker::new("text", fast_config());
        for _ in 0..3 {
            fail(&breaker).await.ok();
        }
        assert_eq!(breaker.state().await, BreakerState::Open);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(breaker.state().await, BreakerState::HalfOpen);

        breaker.call(|| async { Ok::<_, AppError>(()) }).await.unwrap();
        assert_eq!(breaker.state().await, BreakerState::Closed);
        assert_eq!(breaker.failure_count().await, 0);
    }

    #[tokio::test]
    async fn test_probe_failure_reopens_breaker() {
        let breaker = CircuitBreaker::new("image", fast_config());
        for _ in 0..3 {
            fail(&breaker).await.ok();
        }

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(breaker.state().await, BreakerState::HalfOpen);

        fail(&breaker).await.ok();
        assert_eq!(breaker.state().await, BreakerState::Open);
    }

    #[tokio::test]
    async fn test_half_open_admits_single_probe() {
        let breaker = CircuitBreaker::new("speech", fast_config());
        for _ in 0..3 {
            fail(&breaker).await.ok();
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        let slow_probe = breaker.call(|| async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok::<_, AppError>(())
        });
        let concurrent = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            breaker.call(|| async { Ok::<_, AppError>(()) }).await
        };

        let (probe_result, concurrent_result) = tokio::join!(slow_probe, concurrent);
        assert!(probe_result.is_ok());
        assert!(matches!(
            concurrent_result,
            Err(AppError::ServiceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_breakers_are_independent() {
        let breakers = ProviderBreakers::new(&fast_config());
        for _ in 0..3 {
            fail(&breakers.image).await.ok();
        }

        assert_eq!(breakers.image.state().await, BreakerState::Open);
        assert_eq!(breakers.text.state().await, BreakerState::Closed);
        assert_eq!(breakers.speech.state().await, BreakerState::Closed);
    }
}
