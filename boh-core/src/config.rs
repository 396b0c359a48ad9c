//! Engine configuration
//!
//! All knobs can be overridden through environment variables (a `.env`
//! file is honored via `dotenv`):
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | CURRENCY_DECIMALS | 2 | Decimal places for monetary rounding |
//! | CASH_ROUNDING_STEP | 0.01 | Grand total is rounded to this step |
//! | REQUIRE_RECIPE | false | Missing recipe is an error instead of "not tracked" |
//! | SEQUENCE_PAD_WIDTH | 4 | Zero padding of generated sequence numbers |
//! | MAX_COMMIT_RETRIES | 3 | Bounded retry on storage commit contention |

use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Decimal places for monetary rounding
    pub currency_decimals: u32,
    /// Step the grand total is rounded to (0.01 = cent, 0.05 = cash nickel)
    pub cash_rounding_step: Decimal,
    /// Whether a product without an active recipe fails ingredient demand
    pub require_recipe: bool,
    /// Zero padding width of the NNNN suffix in generated identifiers
    pub sequence_pad_width: usize,
    /// Attempts before commit contention surfaces as a transient error
    pub max_commit_retries: u32,
    /// Backoff between commit retries
    pub commit_retry_backoff_ms: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            currency_decimals: 2,
            cash_rounding_step: Decimal::new(1, 2), // 0.01
            require_recipe: false,
            sequence_pad_width: 4,
            max_commit_retries: 3,
            commit_retry_backoff_ms: 10,
        }
    }
}

impl CoreConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let defaults = Self::default();
        Self {
            currency_decimals: std::env::var("CURRENCY_DECIMALS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.currency_decimals),
            cash_rounding_step: std::env::var("CASH_ROUNDING_STEP")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|step: &Decimal| step.is_sign_positive() && !step.is_zero())
                .unwrap_or(defaults.cash_rounding_step),
            require_recipe: std::env::var("REQUIRE_RECIPE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.require_recipe),
            sequence_pad_width: std::env::var("SEQUENCE_PAD_WIDTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.sequence_pad_width),
            max_commit_retries: std::env::var("MAX_COMMIT_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_commit_retries),
            commit_retry_backoff_ms: std::env::var("COMMIT_RETRY_BACKOFF_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.commit_retry_backoff_ms),
        }
    }
}
