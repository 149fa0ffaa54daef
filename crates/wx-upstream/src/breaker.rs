//! Circuit breaker protecting the upstream.
//!
//! One breaker is shared process-wide and decorates the whole client, so a
//! struggling upstream is fenced off for every endpoint at once. Only
//! transport faults count as failures: an errcode response proves the
//! upstream reachable, and a cancelled call says nothing about its health.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::client::WechatApi;
use crate::error::{UpstreamError, UpstreamResult};
use crate::models::{
    ArticleBatchRequest, ArticleBatchResponse, ArticleDetailRequest, ArticleDetailResponse,
    PlatformTokenRequest, PlatformTokenResponse, SimpleTokenResponse, TenantTokenRequest,
    TenantTokenResponse,
};

/// Breaker tuning parameters.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Stable identifier used in logs.
    pub name: String,
    /// Consecutive failures that trip the breaker.
    pub failure_threshold: u32,
    /// Time spent open before the next call becomes a probe.
    pub open_timeout: Duration,
    /// Concurrent probes allowed while half-open.
    pub half_open_max_concurrent: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            name: "wechat-api".to_string(),
            failure_threshold: 5,
            open_timeout: Duration::from_secs(60),
            half_open_max_concurrent: 3,
        }
    }
}

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation; failures are counted.
    Closed,
    /// Failing fast; no calls reach the network.
    Open,
    /// Probing whether the upstream recovered.
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        };
        f.write_str(name)
    }
}

/// Outcome of a call admitted by [`CircuitBreaker::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// The upstream answered (even with an application errcode).
    Success,
    /// The call failed at the transport level.
    Failure,
    /// The call was cancelled before a verdict; releases the slot only.
    Aborted,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_in_flight: u32,
}

/// Consecutive-failure circuit breaker with half-open probing.
///
/// Failure counts are not time-windowed while closed; they reset on any
/// success and on every state transition. The open state lapses into
/// half-open on the first observation after `open_timeout`.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Creates a breaker in the closed state.
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                half_open_in_flight: 0,
            }),
        }
    }

    /// Returns the current state, applying the open-timeout transition.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock();
        self.transition_if_due(&mut inner);
        inner.state
    }

    /// Reserves a call slot, failing fast when the breaker rejects it.
    pub fn acquire(&self) -> Result<(), UpstreamError> {
        let mut inner = self.inner.lock();
        self.transition_if_due(&mut inner);
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => Err(UpstreamError::BreakerOpen),
            BreakerState::HalfOpen => {
                if inner.half_open_in_flight >= self.config.half_open_max_concurrent {
                    Err(UpstreamError::BreakerOverloaded)
                } else {
                    inner.half_open_in_flight += 1;
                    Ok(())
                }
            }
        }
    }

    /// Records the outcome of a call admitted by [`Self::acquire`].
    pub fn record(&self, outcome: CallOutcome) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => match outcome {
                CallOutcome::Success => inner.consecutive_failures = 0,
                CallOutcome::Failure => {
                    inner.consecutive_failures += 1;
                    if inner.consecutive_failures >= self.config.failure_threshold {
                        self.change_state(&mut inner, BreakerState::Open);
                    }
                }
                CallOutcome::Aborted => {}
            },
            BreakerState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                match outcome {
                    CallOutcome::Success => self.change_state(&mut inner, BreakerState::Closed),
                    CallOutcome::Failure => self.change_state(&mut inner, BreakerState::Open),
                    CallOutcome::Aborted => {}
                }
            }
            // The breaker moved under an admitted call; the verdict is stale.
            BreakerState::Open => {}
        }
    }

    fn transition_if_due(&self, inner: &mut Inner) {
        if inner.state == BreakerState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.config.open_timeout {
                    self.change_state(inner, BreakerState::HalfOpen);
                }
            }
        }
    }

    fn change_state(&self, inner: &mut Inner, to: BreakerState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        inner.consecutive_failures = 0;
        inner.half_open_in_flight = 0;
        inner.opened_at = if to == BreakerState::Open {
            Some(Instant::now())
        } else {
            None
        };
        warn!(
            breaker = %self.config.name,
            %from,
            %to,
            "circuit breaker state changed"
        );
    }
}

fn outcome_of<T>(result: &UpstreamResult<T>) -> CallOutcome {
    match result {
        Ok(_) => CallOutcome::Success,
        Err(err) if err.is_transport() => CallOutcome::Failure,
        Err(UpstreamError::Cancelled) => CallOutcome::Aborted,
        Err(_) => CallOutcome::Success,
    }
}

/// Client decorator that routes every call through a shared breaker.
pub struct BreakerClient<C> {
    inner: C,
    breaker: Arc<CircuitBreaker>,
}

impl<C> BreakerClient<C> {
    /// Wraps `inner` with the given breaker.
    pub fn new(inner: C, breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, breaker }
    }

    /// Returns the breaker, for state inspection.
    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn guard<T, F>(&self, call: F) -> UpstreamResult<T>
    where
        F: Future<Output = UpstreamResult<T>> + Send,
    {
        self.breaker.acquire()?;
        let result = call.await;
        self.breaker.record(outcome_of(&result));
        result
    }
}

#[async_trait]
impl<C: WechatApi> WechatApi for BreakerClient<C> {
    async fn simple_token(
        &self,
        appid: &str,
        secret: &str,
        cancel: &CancellationToken,
    ) -> UpstreamResult<SimpleTokenResponse> {
        self.guard(self.inner.simple_token(appid, secret, cancel))
            .await
    }

    async fn platform_token(
        &self,
        req: &PlatformTokenRequest,
        cancel: &CancellationToken,
    ) -> UpstreamResult<PlatformTokenResponse> {
        self.guard(self.inner.platform_token(req, cancel)).await
    }

    async fn tenant_token(
        &self,
        platform_token: &str,
        req: &TenantTokenRequest,
        cancel: &CancellationToken,
    ) -> UpstreamResult<TenantTokenResponse> {
        self.guard(self.inner.tenant_token(platform_token, req, cancel))
            .await
    }

    async fn batch_articles(
        &self,
        access_token: &str,
        req: &ArticleBatchRequest,
        cancel: &CancellationToken,
    ) -> UpstreamResult<ArticleBatchResponse> {
        self.guard(self.inner.batch_articles(access_token, req, cancel))
            .await
    }

    async fn article(
        &self,
        access_token: &str,
        req: &ArticleDetailRequest,
        cancel: &CancellationToken,
    ) -> UpstreamResult<ArticleDetailResponse> {
        self.guard(self.inner.article(access_token, req, cancel))
            .await
    }
}
