//! Three-state circuit breaker guarding one named resource.
//!
//! CLOSED lets every call through and counts consecutive failures. Reaching the threshold opens
//! the circuit; OPEN rejects without invoking the operation until the cooldown since the last
//! failure has elapsed. The first call after that becomes the single HALF_OPEN trial: success
//! closes the circuit, failure reopens it with a fresh failure time.
//!
//! Dimension mismatches are data-quality errors, not resource-health signals. They leave counters
//! and state untouched.

use std::{
	future::Future,
	sync::{Arc, Mutex, MutexGuard},
	time::Duration,
};

use serde::Serialize;
use tokio::time::{self, Instant};

use crate::{Error, Result};

pub const EMBEDDING_PROVIDER: &str = "embedding_provider";
pub const VECTOR_SEARCH: &str = "vector_search";
pub const VECTOR_WRITE: &str = "vector_write";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
	Closed,
	Open,
	HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerSettings {
	pub failure_threshold: u32,
	pub cooldown: Duration,
	/// Calls running longer than this fail with [`Error::Timeout`] and count as failures.
	pub call_timeout: Option<Duration>,
}
impl BreakerSettings {
	pub fn from_config(cfg: &rembed_config::CircuitBreaker, call_timeout: Option<Duration>) -> Self {
		Self {
			failure_threshold: cfg.failure_threshold.max(1),
			cooldown: Duration::from_millis(cfg.cooldown_ms),
			call_timeout,
		}
	}
}

/// Point-in-time view of a breaker. `state` is the stored state; an OPEN circuit whose cooldown
/// has elapsed moves to HALF_OPEN on its next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
	pub state: CircuitState,
	pub failure_count: u32,
	pub last_failure_time: Option<Instant>,
}

/// One breaker per protected resource, shared by every caller of that resource.
#[derive(Clone)]
pub struct Breakers {
	pub provider: Arc<CircuitBreaker>,
	pub vector_search: Arc<CircuitBreaker>,
	pub vector_write: Arc<CircuitBreaker>,
}
impl Breakers {
	pub fn from_config(cfg: &rembed_config::Config) -> Self {
		let provider_timeout = Duration::from_millis(cfg.providers.embedding.timeout_ms);
		let store_timeout = Duration::from_millis(cfg.reconcile.store_timeout_ms);
		let breaker = |resource: &str, timeout: Duration| {
			Arc::new(CircuitBreaker::new(
				resource,
				BreakerSettings::from_config(&cfg.circuit_breaker, Some(timeout)),
			))
		};

		Self {
			provider: breaker(EMBEDDING_PROVIDER, provider_timeout),
			vector_search: breaker(VECTOR_SEARCH, store_timeout),
			vector_write: breaker(VECTOR_WRITE, store_timeout),
		}
	}
}

pub struct CircuitBreaker {
	resource: String,
	settings: BreakerSettings,
	inner: Mutex<BreakerInner>,
}
impl CircuitBreaker {
	pub fn new(resource: impl Into<String>, settings: BreakerSettings) -> Self {
		Self {
			resource: resource.into(),
			settings,
			inner: Mutex::new(BreakerInner {
				state: CircuitState::Closed,
				failure_count: 0,
				last_failure_time: None,
				trial_in_flight: false,
			}),
		}
	}

	pub fn resource(&self) -> &str {
		&self.resource
	}

	pub fn snapshot(&self) -> BreakerSnapshot {
		let inner = self.lock();

		BreakerSnapshot {
			state: inner.state,
			failure_count: inner.failure_count,
			last_failure_time: inner.last_failure_time,
		}
	}

	/// Runs `op` under the breaker. A rejected call fails with [`Error::CircuitOpen`]; operation
	/// errors are returned as-is after being counted.
	pub async fn call<T, F, Fut>(&self, op: F) -> Result<T>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		match self.attempt(op).await {
			Attempt::Done(value) => Ok(value),
			Attempt::Rejected => Err(Error::CircuitOpen { resource: self.resource.clone() }),
			Attempt::Bypassed(err) | Attempt::Failed(err) => Err(err),
		}
	}

	/// Like [`CircuitBreaker::call`], but any rejection or operation error is answered by
	/// `fallback`. The fallback runs outside the breaker and its own errors propagate.
	pub async fn call_or_else<T, F, Fut, G, GFut>(&self, op: F, fallback: G) -> Result<T>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T>>,
		G: FnOnce() -> GFut,
		GFut: Future<Output = Result<T>>,
	{
		match self.attempt(op).await {
			Attempt::Done(value) => return Ok(value),
			Attempt::Rejected => {
				tracing::debug!(resource = %self.resource, "Circuit open. Serving fallback.");
			},
			Attempt::Bypassed(err) => {
				tracing::debug!(
					resource = %self.resource,
					error = %err,
					"Dimension mismatch. Serving fallback."
				);
			},
			Attempt::Failed(err) => {
				tracing::warn!(
					resource = %self.resource,
					error = %err,
					"Protected call failed. Serving fallback."
				);
			},
		}

		fallback().await
	}

	async fn attempt<T, F, Fut>(&self, op: F) -> Attempt<T>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let mut permit = match self.admit() {
			Admission::Reject => return Attempt::Rejected,
			Admission::Pass => TrialPermit { breaker: self, armed: false },
			Admission::Trial => TrialPermit { breaker: self, armed: true },
		};
		let result = self.bounded(op()).await;

		// Settling below clears the trial flag under the same lock that records the outcome.
		permit.armed = false;

		match result {
			Ok(value) => {
				self.record_success();

				Attempt::Done(value)
			},
			Err(err) if err.is_dimension_mismatch() => {
				self.release_trial();

				Attempt::Bypassed(err)
			},
			Err(err) => {
				self.record_failure();

				Attempt::Failed(err)
			},
		}
	}

	async fn bounded<T, Fut>(&self, fut: Fut) -> Result<T>
	where
		Fut: Future<Output = Result<T>>,
	{
		let Some(limit) = self.settings.call_timeout else {
			return fut.await;
		};

		match time::timeout(limit, fut).await {
			Ok(result) => result,
			Err(_) => Err(Error::Timeout {
				resource: self.resource.clone(),
				timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
			}),
		}
	}

	fn admit(&self) -> Admission {
		let mut inner = self.lock();

		match inner.state {
			CircuitState::Closed => Admission::Pass,
			CircuitState::Open => {
				let cooled = inner
					.last_failure_time
					.is_none_or(|at| at.elapsed() >= self.settings.cooldown);

				if !cooled || inner.trial_in_flight {
					return Admission::Reject;
				}

				inner.state = CircuitState::HalfOpen;
				inner.trial_in_flight = true;

				tracing::info!(resource = %self.resource, "Circuit half-open. Admitting trial call.");

				Admission::Trial
			},
			CircuitState::HalfOpen => {
				if inner.trial_in_flight {
					return Admission::Reject;
				}

				inner.trial_in_flight = true;

				Admission::Trial
			},
		}
	}

	fn record_success(&self) {
		let mut inner = self.lock();
		let was = inner.state;

		inner.state = CircuitState::Closed;
		inner.failure_count = 0;
		inner.last_failure_time = None;
		inner.trial_in_flight = false;

		if was != CircuitState::Closed {
			tracing::info!(resource = %self.resource, "Circuit closed.");
		}
	}

	fn record_failure(&self) {
		let mut inner = self.lock();

		inner.failure_count = inner.failure_count.saturating_add(1);
		inner.last_failure_time = Some(Instant::now());
		inner.trial_in_flight = false;

		let trip = match inner.state {
			CircuitState::Closed => inner.failure_count >= self.settings.failure_threshold,
			CircuitState::HalfOpen => true,
			CircuitState::Open => false,
		};

		if trip {
			inner.state = CircuitState::Open;

			tracing::warn!(
				resource = %self.resource,
				failure_count = inner.failure_count,
				cooldown_ms = u64::try_from(self.settings.cooldown.as_millis()).unwrap_or(u64::MAX),
				"Circuit opened."
			);
		}
	}

	fn release_trial(&self) {
		self.lock().trial_in_flight = false;
	}

	fn lock(&self) -> MutexGuard<'_, BreakerInner> {
		self.inner.lock().unwrap_or_else(|err| err.into_inner())
	}
}

struct BreakerInner {
	state: CircuitState,
	failure_count: u32,
	last_failure_time: Option<Instant>,
	trial_in_flight: bool,
}

enum Admission {
	Pass,
	Trial,
	Reject,
}

enum Attempt<T> {
	Done(T),
	Rejected,
	Bypassed(Error),
	Failed(Error),
}

/// Frees the HALF_OPEN trial slot if the trial future is dropped before it settles.
struct TrialPermit<'a> {
	breaker: &'a CircuitBreaker,
	armed: bool,
}
impl Drop for TrialPermit<'_> {
	fn drop(&mut self) {
		if self.armed {
			self.breaker.release_trial();
		}
	}
}
