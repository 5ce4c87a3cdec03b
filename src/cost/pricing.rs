//! Simulated model pricing.
//!
//! Per-million-token rates for the models the simulator serves. Pricing data
//! is hardcoded and must be manually updated when the upstream providers
//! being simulated change their pricing.
//!
//! ## Pricing Strategy
//!
//! - **Input tokens**: charged at the per-million rate for prompt/context
//! - **Cached input tokens**: charged at the discounted cached rate when the
//!   model has one, otherwise at the full input rate (no discount)
//! - **Output tokens**: charged at the per-million rate for completions
//! - **Batch processing**: a flat 50% discount applies to batch-endpoint
//!   traffic (used by the optimization heuristics)
//!
//! All arithmetic is decimal to avoid cumulative rounding drift across
//! millions of small charges.

use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;
use std::sync::Arc;

/// Decimal places kept on a stored per-record cost.
pub const COST_SCALE: u32 = 6;

/// Flat discount applied to batch-endpoint traffic.
pub fn batch_discount() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

/// Pricing for a specific model, in USD per million tokens.
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    /// Input (prompt) cost per million tokens
    pub input_per_million: Decimal,

    /// Output (completion) cost per million tokens
    pub output_per_million: Decimal,

    /// Cached-input cost per million tokens; None means the model offers no
    /// cache discount
    pub cached_input_per_million: Option<Decimal>,
}

impl ModelPricing {
    fn new(input_cents: i64, output_cents: i64) -> Self {
        Self {
            input_per_million: Decimal::new(input_cents, 2),
            output_per_million: Decimal::new(output_cents, 2),
            cached_input_per_million: None,
        }
    }

    fn with_cached(mut self, cached_cents: i64) -> Self {
        self.cached_input_per_million = Some(Decimal::new(cached_cents, 2));
        self
    }
}

/// Pricing table for all simulated models.
///
/// Initialized once at startup and shared across the tracker.
#[derive(Debug, Clone)]
pub struct PricingTable {
    prices: Arc<HashMap<String, ModelPricing>>,
}

impl PricingTable {
    /// Create a new pricing table with the simulator's model catalog.
    pub fn new() -> Self {
        let mut prices = HashMap::new();

        // OpenAI-style models (rates in cents per million tokens)
        prices.insert(
            "gpt-4o".to_string(),
            ModelPricing::new(250, 1_000).with_cached(125),
        );
        prices.insert(
            "gpt-4o-mini".to_string(),
            ModelPricing::new(15, 60).with_cached(8),
        );
        prices.insert("gpt-4-turbo".to_string(), ModelPricing::new(1_000, 3_000));
        prices.insert("gpt-3.5-turbo".to_string(), ModelPricing::new(50, 150));

        // Anthropic-style models
        prices.insert(
            "claude-3-opus".to_string(),
            ModelPricing::new(1_500, 7_500),
        );
        prices.insert(
            "claude-3-5-sonnet".to_string(),
            ModelPricing::new(300, 1_500).with_cached(30),
        );
        prices.insert(
            "claude-3-haiku".to_string(),
            ModelPricing::new(25, 125).with_cached(3),
        );

        // Embeddings
        prices.insert(
            "text-embedding-3-small".to_string(),
            ModelPricing::new(2, 0),
        );

        // Local models simulate at no charge
        prices.insert("llama3:8b".to_string(), ModelPricing::new(0, 0));
        prices.insert("llama3:70b".to_string(), ModelPricing::new(0, 0));

        Self {
            prices: Arc::new(prices),
        }
    }

    /// Compute the cost of one usage record.
    ///
    /// `cached_tokens` must not exceed `prompt_tokens` (enforced at the
    /// publish boundary); the non-cached remainder is billed at the input
    /// rate. Returns `None` if the model is not in the table.
    pub fn calculate_cost(
        &self,
        model: &str,
        prompt_tokens: u64,
        completion_tokens: u64,
        cached_tokens: u64,
    ) -> Option<Decimal> {
        let pricing = self.prices.get(model)?;
        let million = Decimal::from(1_000_000u64);

        let cached_rate = pricing
            .cached_input_per_million
            .unwrap_or(pricing.input_per_million);
        let uncached = prompt_tokens.saturating_sub(cached_tokens);

        let cost = Decimal::from(uncached) * pricing.input_per_million / million
            + Decimal::from(cached_tokens) * cached_rate / million
            + Decimal::from(completion_tokens) * pricing.output_per_million / million;

        Some(cost.round_dp_with_strategy(COST_SCALE, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Check if a model has pricing data available.
    pub fn has_pricing(&self, model: &str) -> bool {
        self.prices.contains_key(model)
    }

    /// Get pricing details for a model.
    pub fn get_pricing(&self, model: &str) -> Option<ModelPricing> {
        self.prices.get(model).copied()
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::new()
    }
}
