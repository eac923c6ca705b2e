//! Token-bucket rate limiter.
//!
//! Tokens refill continuously at the configured QPS up to the burst
//! capacity. Acquisition sleeps for exactly the refill time it is short by,
//! so waiters wake in the order they computed their deficit without a
//! background filler task.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

struct State {
    tokens: f64,
    last: Instant,
}

/// Token bucket with a QPS fill rate and burst capacity.
pub struct RateLimiter {
    qps: f64,
    burst: f64,
    state: Mutex<State>,
}

impl RateLimiter {
    /// A limiter filling at `qps` tokens per second, holding at most
    /// `burst`. A non-positive `qps` disables limiting entirely.
    pub fn new(qps: f64, burst: u32) -> Self {
        Self {
            qps,
            burst: f64::from(burst.max(1)),
            state: Mutex::new(State {
                tokens: f64::from(burst.max(1)),
                last: Instant::now(),
            }),
        }
    }

    /// Take one token, sleeping until one is available.
    pub async fn acquire(&self) {
        if self.qps <= 0.0 {
            return;
        }
        loop {
            let wait = {
                let mut st = self.state.lock().expect("rate limiter poisoned");
                let now = Instant::now();
                let elapsed = now.duration_since(st.last).as_secs_f64();
                st.tokens = (st.tokens + elapsed * self.qps).min(self.burst);
                st.last = now;
                if st.tokens >= 1.0 {
                    st.tokens -= 1.0;
                    None
                } else {
                    Some(Duration::from_secs_f64((1.0 - st.tokens) / self.qps))
                }
            };
            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_is_immediate() {
        let rl = RateLimiter::new(1.0, 5);
        let start = Instant::now();
        for _ in 0..5 {
            rl.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn refill_paces_at_qps() {
        let rl = RateLimiter::new(10.0, 1);
        rl.acquire().await; // drains the bucket
        let start = Instant::now();
        rl.acquire().await;
        // 10 qps -> next token roughly 100ms out
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(95), "waited {waited:?}");
        assert!(waited <= Duration::from_millis(150), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_qps_is_unlimited() {
        let rl = RateLimiter::new(0.0, 1);
        let start = Instant::now();
        for _ in 0..1000 {
            rl.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
