//! Policy gate — budget, rate limiting, and per-tool circuit breaking.
//!
//! The shield answers one question before every tool call: may this
//! action run right now? The agent loop feeds call outcomes back via
//! [`Shield::record_result`] and actual spend via [`Shield::record_spend`]
//! so the breaker and budget converge on observed behavior.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use quarry_domain::config::SafetyConfig;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Verdict
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShieldDecision {
    Allow,
    Block,
}

#[derive(Debug, Clone)]
pub struct ShieldVerdict {
    pub decision: ShieldDecision,
    pub reason: String,
    pub rate_limited: bool,
    /// When rate-limited, how long the caller should wait before
    /// retrying the same action.
    pub retry_after: Option<Duration>,
}

impl ShieldVerdict {
    fn allow() -> Self {
        Self {
            decision: ShieldDecision::Allow,
            reason: String::new(),
            rate_limited: false,
            retry_after: None,
        }
    }

    fn block(reason: String) -> Self {
        Self {
            decision: ShieldDecision::Block,
            reason,
            rate_limited: false,
            retry_after: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Budget
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tracks spend against an optional ceiling for one investigation.
struct BudgetEnforcer {
    limit: Option<f64>,
    spent: Mutex<f64>,
}

impl BudgetEnforcer {
    fn new(limit: Option<f64>) -> Self {
        Self {
            limit,
            spent: Mutex::new(0.0),
        }
    }

    fn check(&self, cost: f64) -> Result<(), String> {
        let Some(limit) = self.limit else {
            return Ok(());
        };
        let spent = *self.spent.lock();
        if spent + cost > limit {
            Err(format!("budget exceeded: {:.2} + {cost:.2} > {limit:.2}", spent))
        } else {
            Ok(())
        }
    }

    fn record_spend(&self, cost: f64) {
        *self.spent.lock() += cost;
    }

    fn spent(&self) -> f64 {
        *self.spent.lock()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rate limiter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Per-tool sliding-window limiter. A successful check records the call.
struct RateLimiter {
    per_minute: usize,
    calls: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    fn new(per_minute: u32) -> Self {
        Self {
            per_minute: per_minute as usize,
            calls: Mutex::new(HashMap::new()),
        }
    }

    fn check(&self, tool: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let mut calls = self.calls.lock();
        let window = calls.entry(tool.to_string()).or_default();
        while let Some(front) = window.front() {
            if now.duration_since(*front) >= RATE_WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }
        if window.len() >= self.per_minute {
            let retry_after = window
                .front()
                .map(|oldest| RATE_WINDOW.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(RATE_WINDOW);
            return Err(retry_after);
        }
        window.push_back(now);
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Circuit breaker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Opens after `threshold` consecutive failures, stays open for the
/// cooldown, then allows a single trial call.
struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    state: Mutex<HashMap<String, BreakerState>>,
}

impl CircuitBreaker {
    fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            state: Mutex::new(HashMap::new()),
        }
    }

    fn check(&self, tool: &str) -> Result<(), Duration> {
        let mut state = self.state.lock();
        let Some(entry) = state.get_mut(tool) else {
            return Ok(());
        };
        if let Some(until) = entry.open_until {
            let now = Instant::now();
            if now < until {
                return Err(until.duration_since(now));
            }
            // Cooldown elapsed: half-open, one more failure re-opens.
            entry.open_until = None;
            entry.consecutive_failures = self.threshold.saturating_sub(1);
        }
        Ok(())
    }

    fn record_result(&self, tool: &str, success: bool) {
        let mut state = self.state.lock();
        let entry = state.entry(tool.to_string()).or_default();
        if success {
            entry.consecutive_failures = 0;
            entry.open_until = None;
        } else {
            entry.consecutive_failures += 1;
            if entry.consecutive_failures >= self.threshold {
                entry.open_until = Some(Instant::now() + self.cooldown);
                tracing::warn!(tool, failures = entry.consecutive_failures, "circuit breaker opened");
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shield
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Shield {
    budget: BudgetEnforcer,
    rate: RateLimiter,
    breaker: CircuitBreaker,
}

impl Shield {
    pub fn new(config: &SafetyConfig) -> Self {
        Self {
            budget: BudgetEnforcer::new(config.budget_limit),
            rate: RateLimiter::new(config.rate_limit_per_minute),
            breaker: CircuitBreaker::new(
                config.breaker_threshold,
                Duration::from_secs(config.breaker_cooldown_secs),
            ),
        }
    }

    /// Gate one action. Check order: breaker, budget, rate limit.
    pub fn check_action(&self, tool: &str, cost: f64) -> ShieldVerdict {
        if let Err(remaining) = self.breaker.check(tool) {
            return ShieldVerdict::block(format!(
                "circuit breaker open for '{tool}' ({}s remaining)",
                remaining.as_secs().max(1)
            ));
        }
        if let Err(reason) = self.budget.check(cost) {
            return ShieldVerdict::block(reason);
        }
        if let Err(retry_after) = self.rate.check(tool) {
            let mut verdict =
                ShieldVerdict::block(format!("rate limit reached for '{tool}'"));
            verdict.rate_limited = true;
            verdict.retry_after = Some(retry_after);
            return verdict;
        }
        ShieldVerdict::allow()
    }

    pub fn record_result(&self, tool: &str, success: bool) {
        self.breaker.record_result(tool, success);
    }

    pub fn record_spend(&self, cost: f64) {
        self.budget.record_spend(cost);
    }

    pub fn total_spent(&self) -> f64 {
        self.budget.spent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SafetyConfig {
        SafetyConfig {
            budget_limit: Some(10.0),
            rate_limit_per_minute: 3,
            breaker_threshold: 2,
            breaker_cooldown_secs: 60,
            ..SafetyConfig::default()
        }
    }

    #[test]
    fn allows_within_limits() {
        let shield = Shield::new(&config());
        let verdict = shield.check_action("search_entities", 1.0);
        assert_eq!(verdict.decision, ShieldDecision::Allow);
    }

    #[test]
    fn budget_blocks_when_exceeded() {
        let shield = Shield::new(&config());
        shield.record_spend(9.5);
        let verdict = shield.check_action("search_entities", 1.0);
        assert_eq!(verdict.decision, ShieldDecision::Block);
        assert!(verdict.reason.contains("budget"));
        assert!(!verdict.rate_limited);
    }

    #[test]
    fn rate_limit_blocks_with_retry_delay() {
        let shield = Shield::new(&config());
        for _ in 0..3 {
            assert_eq!(
                shield.check_action("check_news", 0.0).decision,
                ShieldDecision::Allow
            );
        }
        let verdict = shield.check_action("check_news", 0.0);
        assert_eq!(verdict.decision, ShieldDecision::Block);
        assert!(verdict.rate_limited);
        assert!(verdict.retry_after.is_some());
        // Other tools are unaffected.
        assert_eq!(
            shield.check_action("search_entities", 0.0).decision,
            ShieldDecision::Allow
        );
    }

    #[test]
    fn breaker_opens_after_consecutive_failures() {
        let shield = Shield::new(&config());
        shield.record_result("trace_ownership", false);
        shield.record_result("trace_ownership", false);

        let verdict = shield.check_action("trace_ownership", 0.0);
        assert_eq!(verdict.decision, ShieldDecision::Block);
        assert!(verdict.reason.contains("circuit breaker"));
    }

    #[test]
    fn success_resets_breaker() {
        let shield = Shield::new(&config());
        shield.record_result("trace_ownership", false);
        shield.record_result("trace_ownership", true);
        shield.record_result("trace_ownership", false);
        // One failure after a success: still below threshold.
        let verdict = shield.check_action("trace_ownership", 0.0);
        assert_eq!(verdict.decision, ShieldDecision::Allow);
    }

    #[test]
    fn breaker_half_opens_after_cooldown() {
        let mut cfg = config();
        cfg.breaker_cooldown_secs = 0;
        let shield = Shield::new(&cfg);
        shield.record_result("check_news", false);
        shield.record_result("check_news", false);

        // Zero cooldown: breaker is immediately half-open again.
        let verdict = shield.check_action("check_news", 0.0);
        assert_eq!(verdict.decision, ShieldDecision::Allow);
        // A single failure in half-open state re-opens.
        shield.record_result("check_news", false);
        shield.record_result("check_news", true);
        assert_eq!(shield.check_action("check_news", 0.0).decision, ShieldDecision::Allow);
    }
}
