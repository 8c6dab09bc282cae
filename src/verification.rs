use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use rand::Rng;
use thiserror::Error;
use uuid::Uuid;

use crate::cache::Cache;

/// Codes are valid for 24 hours from issuance.
pub const TOKEN_VALIDITY: chrono::Duration = chrono::Duration::hours(24);

const ATTEMPT_LIMIT: u32 = 5;
const ATTEMPT_WINDOW: Duration = Duration::from_secs(300);
const BLOCK_DURATION: Duration = Duration::from_secs(3600);

/// Six-digit numeric verification code. The leading digit may be zero, so the
/// code is a string, never an integer.
pub fn generate_verification_code() -> String {
    let mut rng = rand::thread_rng();
    loop {
        let code = format!("{:06}", rng.gen_range(0..1_000_000u32));
        if code.len() == 6 && code.chars().all(|c| c.is_ascii_digit()) {
            return code;
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("no verification is pending for this account")]
    NoPendingToken,
    #[error("invalid verification code")]
    Mismatch,
    #[error("verification code has expired")]
    Expired,
}

/// Checks a presented code against the stored one. The presented value is
/// trimmed before the exact comparison; the stored value is compared as-is.
pub fn evaluate_token(
    stored: Option<&str>,
    issued_at: Option<NaiveDateTime>,
    presented: &str,
    now: NaiveDateTime,
) -> Result<(), VerifyError> {
    let stored = stored.filter(|s| !s.is_empty()).ok_or(VerifyError::NoPendingToken)?;
    let issued_at = issued_at.ok_or(VerifyError::NoPendingToken)?;

    if presented.trim() != stored {
        return Err(VerifyError::Mismatch);
    }
    if now - issued_at > TOKEN_VALIDITY {
        return Err(VerifyError::Expired);
    }
    Ok(())
}

/// Link embedded in the verification email. Redundant query parameters are
/// kept for older frontend builds that read `uid` instead of `user_id`.
pub fn verification_link(frontend_base_url: &str, code: &str, user_id: Uuid, email: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!(
        "{base}/auth/email-verification?token={code}&uid={user_id}&user_id={user_id}&email={email}"
    )
}

#[derive(Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Blocked { retry_after: Duration },
}

/// Per-email sliding lockout for verification attempts: more than five
/// attempts inside five minutes blocks the address for an hour. Counters are
/// cache entries, so restarting the process clears them.
pub struct VerificationRateLimiter {
    cache: Arc<dyn Cache>,
}

impl VerificationRateLimiter {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    fn attempts_key(email: &str) -> String {
        format!("email_verification_attempts_{email}")
    }

    fn blocked_key(email: &str) -> String {
        format!("email_verification_blocked_{email}")
    }

    /// Records one attempt and decides whether it may proceed. The attempt
    /// that crosses the threshold is itself rejected.
    pub async fn check(&self, email: &str) -> RateLimitDecision {
        let blocked_key = Self::blocked_key(email);
        if self.cache.get(&blocked_key).await.is_some() {
            let retry_after = self
                .cache
                .ttl(&blocked_key)
                .await
                .unwrap_or(BLOCK_DURATION);
            return RateLimitDecision::Blocked { retry_after };
        }

        let attempts_key = Self::attempts_key(email);
        let attempts = self
            .cache
            .get(&attempts_key)
            .await
            .and_then(|raw| raw.parse::<u32>().ok())
            .unwrap_or(0)
            + 1;

        if attempts > ATTEMPT_LIMIT {
            self.cache
                .set(&blocked_key, "1".to_string(), BLOCK_DURATION)
                .await;
            self.cache.delete(&attempts_key).await;
            return RateLimitDecision::Blocked {
                retry_after: BLOCK_DURATION,
            };
        }

        self.cache
            .set(&attempts_key, attempts.to_string(), ATTEMPT_WINDOW)
            .await;
        RateLimitDecision::Allowed
    }

    /// Clears counters after a successful verification so a verified user is
    /// not locked out by their earlier typos.
    pub async fn reset(&self, email: &str) {
        self.cache.delete(&Self::attempts_key(email)).await;
        self.cache.delete(&Self::blocked_key(email)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use chrono::{Duration as ChronoDuration, NaiveDate};

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 10)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..100 {
            let code = generate_verification_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn matching_code_within_window_verifies() {
        let issued = at(9, 0);
        assert_eq!(
            evaluate_token(Some("042311"), Some(issued), "042311", at(10, 0)),
            Ok(())
        );
    }

    #[test]
    fn presented_code_is_trimmed_before_comparison() {
        let issued = at(9, 0);
        assert_eq!(
            evaluate_token(Some("042311"), Some(issued), "  042311\n", at(10, 0)),
            Ok(())
        );
    }

    #[test]
    fn wrong_code_is_a_mismatch() {
        let issued = at(9, 0);
        assert_eq!(
            evaluate_token(Some("042311"), Some(issued), "042312", at(10, 0)),
            Err(VerifyError::Mismatch)
        );
    }

    #[test]
    fn code_expires_after_24_hours() {
        let issued = at(9, 0);
        let expired = issued + TOKEN_VALIDITY + ChronoDuration::seconds(1);
        assert_eq!(
            evaluate_token(Some("042311"), Some(issued), "042311", expired),
            Err(VerifyError::Expired)
        );
        // exactly at the boundary is still valid
        assert_eq!(
            evaluate_token(Some("042311"), Some(issued), "042311", issued + TOKEN_VALIDITY),
            Ok(())
        );
    }

    #[test]
    fn missing_token_reports_no_pending_verification() {
        assert_eq!(
            evaluate_token(None, None, "042311", at(10, 0)),
            Err(VerifyError::NoPendingToken)
        );
        assert_eq!(
            evaluate_token(Some(""), Some(at(9, 0)), "042311", at(10, 0)),
            Err(VerifyError::NoPendingToken)
        );
    }

    #[test]
    fn link_carries_code_and_user_identifiers() {
        let user_id = Uuid::nil();
        let link = verification_link("https://app.example.com/", "042311", user_id, "a@b.se");
        assert_eq!(
            link,
            format!(
                "https://app.example.com/auth/email-verification?token=042311&uid={user_id}&user_id={user_id}&email=a@b.se"
            )
        );
    }

    #[tokio::test]
    async fn first_five_attempts_pass_then_lockout() {
        let limiter = VerificationRateLimiter::new(Arc::new(MemoryCache::new()));
        for _ in 0..5 {
            assert_eq!(limiter.check("a@b.se").await, RateLimitDecision::Allowed);
        }
        match limiter.check("a@b.se").await {
            RateLimitDecision::Blocked { retry_after } => {
                assert!(retry_after <= BLOCK_DURATION);
                assert!(retry_after > Duration::from_secs(3500));
            }
            other => panic!("expected lockout, got {other:?}"),
        }
        // still blocked on the next attempt
        assert!(matches!(
            limiter.check("a@b.se").await,
            RateLimitDecision::Blocked { .. }
        ));
    }

    #[tokio::test]
    async fn lockout_is_scoped_per_email() {
        let limiter = VerificationRateLimiter::new(Arc::new(MemoryCache::new()));
        for _ in 0..6 {
            limiter.check("locked@b.se").await;
        }
        assert_eq!(
            limiter.check("fresh@b.se").await,
            RateLimitDecision::Allowed
        );
    }

    #[tokio::test]
    async fn reset_clears_counters() {
        let limiter = VerificationRateLimiter::new(Arc::new(MemoryCache::new()));
        for _ in 0..6 {
            limiter.check("a@b.se").await;
        }
        limiter.reset("a@b.se").await;
        assert_eq!(limiter.check("a@b.se").await, RateLimitDecision::Allowed);
    }
}
