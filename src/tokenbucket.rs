use std::time::{SystemTime, UNIX_EPOCH};

/// A per-caller rate limiter. Not internally synchronized — each pump
/// direction owns one. `Take` grants up to the requested token count;
/// callers that receive less should `Return` the partial grant and retry
/// after a short sleep.
#[derive(Debug)]
pub struct TokenBucket {
    /// Unix timestamp in nanoseconds of the last refill accounting.
    time_ns: i128,
    /// Tokens added per second. `<= 0` means unlimited.
    rate: i64,
    fill: u64,
    size: u64,
}

fn now_ns() -> i128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as i128
}

impl TokenBucket {
    pub fn new(rate: i64, size: u64) -> TokenBucket {
        TokenBucket {
            time_ns: now_ns(),
            rate,
            fill: 0,
            size,
        }
    }

    /// Attempts to remove `tokens` tokens. Returns the number actually
    /// granted, which is `tokens` unless the bucket is rate-limited and
    /// underfilled, in which case it's whatever was available.
    pub fn take(&mut self, tokens: u64) -> u64 {
        if self.rate <= 0 {
            return tokens;
        }

        if self.fill >= tokens {
            self.fill -= tokens;
            return tokens;
        }

        let now = now_ns();
        let elapsed_ns = (now - self.time_ns).max(0) as u64;
        let new_tokens = (self.rate as u64).saturating_mul(elapsed_ns) / 1_000_000_000;

        if new_tokens > 0 {
            self.fill = self.fill.saturating_add(new_tokens);
            self.time_ns = now;
        }

        if self.fill > self.size {
            self.fill = self.size;
        }

        if self.fill >= tokens {
            self.fill -= tokens;
            tokens
        } else {
            let granted = self.fill;
            self.fill = 0;
            granted
        }
    }

    /// Returns up to `tokens` tokens to the bucket, clamped at capacity.
    /// Returns the number actually accepted back.
    pub fn return_tokens(&mut self, tokens: u64) -> u64 {
        if self.fill >= self.size {
            return 0;
        }

        self.fill += tokens;
        if self.fill > self.size {
            let accepted = tokens - (self.fill - self.size);
            self.fill = self.size;
            accepted
        } else {
            tokens
        }
    }
}
