use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Per-service concurrency cap with published `current/total/rejected/max_reached`
/// counters (§5 "Backpressure"), the generalized form of the teacher's
/// `trace_middleware` tower layer.
pub struct ConcurrencyLimiter {
    semaphore: Semaphore,
    max: usize,
    current: AtomicU64,
    total: AtomicU64,
    rejected: AtomicU64,
    max_reached: AtomicU64,
}

impl ConcurrencyLimiter {
    pub fn new(max: usize) -> Arc<Self> {
        Arc::new(Self {
            semaphore: Semaphore::new(max),
            max,
            current: AtomicU64::new(0),
            total: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            max_reached: AtomicU64::new(0),
        })
    }

    pub fn snapshot(&self) -> ConcurrencySnapshot {
        ConcurrencySnapshot {
            current: self.current.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            max_reached: self.max_reached.load(Ordering::Relaxed),
            max: self.max as u64,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ConcurrencySnapshot {
    pub current: u64,
    pub total: u64,
    pub rejected: u64,
    pub max_reached: u64,
    pub max: u64,
}

pub async fn concurrency_cap_middleware(
    State(limiter): State<Arc<ConcurrencyLimiter>>,
    request: axum::extract::Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Ok(permit) = limiter.semaphore.try_acquire() else {
        limiter.rejected.fetch_add(1, Ordering::Relaxed);
        return Err(StatusCode::TOO_MANY_REQUESTS);
    };

    limiter.total.fetch_add(1, Ordering::Relaxed);
    let current = limiter.current.fetch_add(1, Ordering::Relaxed) + 1;
    limiter.max_reached.fetch_max(current, Ordering::Relaxed);

    let response = next.run(request).await;

    limiter.current.fetch_sub(1, Ordering::Relaxed);
    drop(permit);

    Ok(response)
}
