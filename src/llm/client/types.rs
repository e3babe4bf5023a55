use serde::{Deserialize, Serialize};

/// Token usage of one completion, estimated when the provider does not report it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

impl TokenUsage {
    pub fn new(input_tokens: usize, output_tokens: usize) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }

    /// Rough USD cost using per-million-token list prices.
    pub fn estimate_cost(&self, model_name: &str) -> f64 {
        let (input_price, output_price) = match model_name {
            name if name.contains("mini") || name.contains("haiku") || name.contains("flash") => {
                (0.15, 0.60)
            }
            name if name.contains("deepseek") => (0.27, 1.10),
            name if name.contains("opus") => (15.0, 75.0),
            _ => (2.50, 10.0),
        };
        (self.input_tokens as f64 * input_price + self.output_tokens as f64 * output_price)
            / 1_000_000.0
    }
}
