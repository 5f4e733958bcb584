use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use vaamoose_core::payment::{GatewayInit, GatewayInitRequest, GatewayVerification, PaymentGateway};
use vaamoose_core::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

pub struct CircuitBreaker {
    pub name: String,
    state: RwLock<CircuitState>,
    failure_count: AtomicUsize,
    failure_threshold: usize,
    reset_timeout: Duration,
    last_failure: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(name: &str, threshold: usize, timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicUsize::new(0),
            failure_threshold: threshold.max(1),
            reset_timeout: timeout,
            last_failure: RwLock::new(None),
        }
    }

    pub async fn state(&self) -> CircuitState {
        *self.state.read().await
    }

    /// Whether a call may go through.
    ///
    /// An open circuit past its timeout admits exactly one trial call and turns
    /// half-open; everyone else is refused until that call is recorded. A trial
    /// whose outcome never arrives is replaced after another timeout.
    pub async fn check(&self) -> bool {
        if *self.state.read().await == CircuitState::Closed {
            return true;
        }

        let mut state = self.state.write().await;
        match *state {
            CircuitState::Closed => true,
            CircuitState::Open | CircuitState::HalfOpen => {
                let mut last = self.last_failure.write().await;
                if !last.is_some_and(|at| at.elapsed() >= self.reset_timeout) {
                    return false;
                }
                if *state == CircuitState::Open {
                    tracing::info!(breaker = %self.name, "Circuit breaker half-open");
                }
                *state = CircuitState::HalfOpen;
                // restarts the wait for the trial's outcome
                *last = Some(Instant::now());
                true
            }
        }
    }

    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        if *state == CircuitState::HalfOpen {
            tracing::info!(breaker = %self.name, "Circuit breaker closed");
        }
        *state = CircuitState::Closed;
        self.failure_count.store(0, Ordering::SeqCst);
    }

    pub async fn record_failure(&self) {
        let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.write().await;
        if count >= self.failure_threshold || *state == CircuitState::HalfOpen {
            *state = CircuitState::Open;
            *self.last_failure.write().await = Some(Instant::now());
            tracing::error!(breaker = %self.name, failures = count, "Circuit breaker opened");
        }
    }
}

/// Fails fast with `GatewayUnavailable` while the gateway keeps erroring.
///
/// Only `GatewayUnavailable` counts as a failure. Any other error is the
/// gateway answering (a declined payment, an unknown reference) and counts as
/// a healthy call.
pub struct CircuitBreakerGateway<G> {
    inner: G,
    breaker: CircuitBreaker,
}

impl<G: PaymentGateway> CircuitBreakerGateway<G> {
    pub fn new(inner: G, breaker: CircuitBreaker) -> Self {
        Self { inner, breaker }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn guard<T>(&self, result: impl std::future::Future<Output = CoreResult<T>>) -> CoreResult<T> {
        if !self.breaker.check().await {
            return Err(CoreError::GatewayUnavailable(format!(
                "payment gateway unavailable ({} circuit open)",
                self.breaker.name
            )));
        }
        let result = result.await;
        match &result {
            Err(CoreError::GatewayUnavailable(_)) => self.breaker.record_failure().await,
            _ => self.breaker.record_success().await,
        }
        result
    }
}

#[async_trait]
impl<G: PaymentGateway> PaymentGateway for CircuitBreakerGateway<G> {
    async fn initialize(&self, request: &GatewayInitRequest) -> CoreResult<GatewayInit> {
        self.guard(self.inner.initialize(request)).await
    }

    async fn verify(&self, reference: &str) -> CoreResult<GatewayVerification> {
        self.guard(self.inner.verify(reference)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::MockPaymentGateway;

    fn request(reference: &str) -> GatewayInitRequest {
        GatewayInitRequest {
            reference: reference.to_string(),
            email: "ada@uni.edu.ng".to_string(),
            amount: 3500,
            callback_url: None,
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_breaker_opens_after_threshold_and_recovers() {
        let mock = MockPaymentGateway::new();
        mock.fail_initialize(true);
        let gateway = CircuitBreakerGateway::new(
            mock,
            CircuitBreaker::new("paystack", 2, Duration::from_millis(20)),
        );

        assert!(gateway.initialize(&request("VMS-1")).await.is_err());
        assert!(gateway.initialize(&request("VMS-2")).await.is_err());
        assert_eq!(gateway.breaker().state().await, CircuitState::Open);

        gateway.inner.fail_initialize(false);
        let err = gateway.initialize(&request("VMS-3")).await.unwrap_err();
        assert!(err.to_string().contains("circuit open"));

        tokio::time::sleep(Duration::from_millis(30)).await;
        gateway.initialize(&request("VMS-4")).await.unwrap();
        assert_eq!(gateway.breaker().state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_declines_do_not_open_the_breaker() {
        let gateway = CircuitBreakerGateway::new(
            MockPaymentGateway::new(),
            CircuitBreaker::new("paystack", 2, Duration::from_secs(60)),
        );

        for reference in ["VMS-unknown-1", "VMS-unknown-2", "VMS-unknown-3"] {
            let err = gateway.verify(reference).await.unwrap_err();
            assert!(matches!(err, CoreError::PaymentError(_)));
        }
        assert_eq!(gateway.breaker().state().await, CircuitState::Closed);

        gateway.initialize(&request("VMS-1")).await.unwrap();
        gateway.verify("VMS-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_half_open_admits_a_single_trial() {
        let breaker = CircuitBreaker::new("paystack", 1, Duration::from_millis(20));
        breaker.record_failure().await;
        assert!(!breaker.check().await);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(breaker.check().await);
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);
        assert!(!breaker.check().await);
        assert!(!breaker.check().await);

        breaker.record_failure().await;
        assert_eq!(breaker.state().await, CircuitState::Open);
        assert!(!breaker.check().await);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(breaker.check().await);
        breaker.record_success().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
        assert!(breaker.check().await);
        assert!(breaker.check().await);
    }
}
