//! Per-model pricing.
//!
//! Manually update this table to match the provider's published pricing.
//! There is a cost API but only for orgs currently.

/// USD prices per 1M tokens for one model.
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    pub usd_per_1m_input: f64,
    pub usd_per_1m_input_cached: f64,
    pub usd_per_1m_output: f64,
}

impl ModelPricing {
    /// Estimate the cost of one call in USD.
    ///
    /// `input` is the full prompt token count; `cached` of those were served
    /// from the provider's prompt cache at the discounted rate.
    pub fn estimate(&self, input: u32, cached: u32, output: u32) -> f64 {
        let non_cached = input.saturating_sub(cached);
        (non_cached as f64 * self.usd_per_1m_input
            + cached as f64 * self.usd_per_1m_input_cached
            + output as f64 * self.usd_per_1m_output)
            / 1_000_000.0
    }
}

/// Pricing for a model ID, if known.
pub fn pricing_for(model: &str) -> Option<ModelPricing> {
    let pricing = match model {
        "gpt-5" => ModelPricing {
            usd_per_1m_input: 1.250,
            usd_per_1m_input_cached: 0.125,
            usd_per_1m_output: 10.000,
        },
        "gpt-5-mini" => ModelPricing {
            usd_per_1m_input: 0.250,
            usd_per_1m_input_cached: 0.025,
            usd_per_1m_output: 2.000,
        },
        "gpt-5-nano" => ModelPricing {
            usd_per_1m_input: 0.050,
            usd_per_1m_input_cached: 0.005,
            usd_per_1m_output: 0.400,
        },
        "gpt-4o-mini" => ModelPricing {
            usd_per_1m_input: 0.150,
            usd_per_1m_input_cached: 0.075,
            usd_per_1m_output: 0.600,
        },
        _ => return None,
    };
    Some(pricing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_applies_cached_discount() {
        let pricing = pricing_for("gpt-5-nano").unwrap();
        // 1M uncached input tokens cost exactly the listed rate.
        assert!((pricing.estimate(1_000_000, 0, 0) - 0.050).abs() < 1e-12);
        // Fully cached input is 10x cheaper for this model.
        assert!((pricing.estimate(1_000_000, 1_000_000, 0) - 0.005).abs() < 1e-12);
        // Mixed call.
        let cost = pricing.estimate(1000, 400, 60);
        let expected = (600.0 * 0.050 + 400.0 * 0.005 + 60.0 * 0.400) / 1_000_000.0;
        assert!((cost - expected).abs() < 1e-15);
    }

    #[test]
    fn unknown_model_has_no_pricing() {
        assert!(pricing_for("some/unknown").is_none());
    }
}
