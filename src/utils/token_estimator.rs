use serde::{Deserialize, Serialize};

/// Character-ratio token estimator, good enough for prompt budgeting.
pub struct TokenEstimator {
    rules: TokenCalculationRules,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenCalculationRules {
    /// Latin-script characters per token
    pub latin_char_per_token: f64,
    /// CJK characters per token
    pub cjk_char_per_token: f64,
    /// Fixed overhead per estimated text
    pub base_token_overhead: usize,
}

impl Default for TokenCalculationRules {
    fn default() -> Self {
        Self {
            latin_char_per_token: 4.0,
            cjk_char_per_token: 1.5,
            base_token_overhead: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenEstimation {
    pub estimated_tokens: usize,
    pub character_count: usize,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenEstimator {
    pub fn new() -> Self {
        Self {
            rules: TokenCalculationRules::default(),
        }
    }

    pub fn estimate_tokens(&self, text: &str) -> TokenEstimation {
        let character_count = text.chars().count();
        let cjk_char_count = text.chars().filter(|c| is_cjk_char(*c)).count();
        let latin_char_count = character_count - cjk_char_count;

        let cjk_tokens = (cjk_char_count as f64 / self.rules.cjk_char_per_token).ceil() as usize;
        let latin_tokens =
            (latin_char_count as f64 / self.rules.latin_char_per_token).ceil() as usize;

        TokenEstimation {
            estimated_tokens: cjk_tokens + latin_tokens + self.rules.base_token_overhead,
            character_count,
        }
    }

    pub fn exceeds_limit(&self, text: &str, limit: usize) -> bool {
        self.estimate_tokens(text).estimated_tokens > limit
    }

    /// Cut `text` so its estimate stays within `max_tokens`, on a char boundary.
    ///
    /// Returns the input unchanged when it already fits.
    pub fn truncate_to_tokens<'a>(&self, text: &'a str, max_tokens: usize) -> &'a str {
        if !self.exceeds_limit(text, max_tokens) {
            return text;
        }

        let mut budget = max_tokens.saturating_sub(self.rules.base_token_overhead) as f64;
        for (index, c) in text.char_indices() {
            let cost = if is_cjk_char(c) {
                1.0 / self.rules.cjk_char_per_token
            } else {
                1.0 / self.rules.latin_char_per_token
            };
            if budget < cost {
                return &text[..index];
            }
            budget -= cost;
        }
        text
    }
}

fn is_cjk_char(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF |
        0x3400..=0x4DBF |
        0x3040..=0x30FF |
        0xAC00..=0xD7AF |
        0x20000..=0x2A6DF
    )
}
