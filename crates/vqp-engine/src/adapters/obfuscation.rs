use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value};

use vqp_core::{
    ObfuscationApplied, ObfuscationConfig, ObfuscationMethod, ObfuscationPort, Obfuscated,
    VqpError,
};
use vqp_logic::eval::number_value;

pub const DEFAULT_RANGE_WIDTH: f64 = 10.0;
pub const DEFAULT_NOISE_LEVEL: f64 = 1.0;
pub const DEFAULT_SIGNIFICANT_DIGITS: f64 = 2.0;
pub const MAX_SIGNIFICANT_DIGITS: u32 = 15;

/// Range bucketing, bounded additive noise and significant-digit rounding.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardObfuscator;

fn positive(value: Option<f64>, default: f64, name: &str) -> Result<f64, VqpError> {
    let v = value.unwrap_or(default);
    if v.is_finite() && v > 0.0 {
        Ok(v)
    } else {
        Err(VqpError::obfuscation(format!("{} must be a positive number", name)))
    }
}

fn number(f: f64) -> Result<Value, VqpError> {
    number_value(f).map_err(|e| VqpError::obfuscation(e.to_string()))
}

/// Round to `digits` significant digits.
pub fn round_significant(value: f64, digits: u32) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let magnitude = value.abs().log10().floor() as i32;
    let exponent = magnitude - digits as i32 + 1;
    if exponent >= 0 {
        let step = 10f64.powi(exponent);
        (value / step).round() * step
    } else {
        let scale = 10f64.powi(-exponent);
        (value * scale).round() / scale
    }
}

/// The half-open bucket `[min, max)` of `width` containing `v`.
///
/// `v / width` may land one bucket off under float rounding, so the index
/// is nudged until the bucket holds `v`.
pub fn bucket(v: f64, width: f64) -> Result<(f64, f64), VqpError> {
    let mut index = (v / width).floor();
    if index * width > v {
        index -= 1.0;
    }
    if (index + 1.0) * width <= v {
        index += 1.0;
    }
    let (min, max) = (index * width, (index + 1.0) * width);
    if min <= v && v < max {
        Ok((min, max))
    } else {
        Err(VqpError::obfuscation(format!(
            "range precision {} is too fine for {}",
            width, v
        )))
    }
}

impl StandardObfuscator {
    pub fn new() -> Self {
        Self
    }

    fn range(&self, v: f64, config: &ObfuscationConfig) -> Result<Obfuscated, VqpError> {
        let width = positive(config.precision, DEFAULT_RANGE_WIDTH, "range precision")?;
        let (min, max) = bucket(v, width)?;
        let (min, max) = (number(min)?, number(max)?);
        Ok(Obfuscated {
            scalar: Value::String(format!("{}..{}", min, max)),
            value: json!({ "min": min, "max": max }),
            applied: ObfuscationApplied {
                method: ObfuscationMethod::Range,
                precision: Some(width),
                noise_level: None,
                privacy_budget: None,
                budget_spent: None,
            },
        })
    }

    fn noise(&self, v: f64, config: &ObfuscationConfig) -> Result<Obfuscated, VqpError> {
        let level = positive(config.noise_level, DEFAULT_NOISE_LEVEL, "noise level")?;
        let cost = 1.0 / level;
        if let Some(budget) = config.privacy_budget {
            if !budget.is_finite() || budget < 0.0 {
                return Err(VqpError::obfuscation("privacy budget must be non-negative"));
            }
            if cost > budget {
                return Err(VqpError::obfuscation(format!(
                    "noise level {} costs {:.4}, exceeding the privacy budget {}",
                    level, cost, budget
                ))
                .with_details(json!({ "budgetSpent": cost, "privacyBudget": budget })));
            }
        }
        let noisy = v + rand::thread_rng().gen_range(-level..=level);
        let noisy = number(noisy)?;
        Ok(Obfuscated {
            scalar: noisy.clone(),
            value: noisy,
            applied: ObfuscationApplied {
                method: ObfuscationMethod::Noise,
                precision: None,
                noise_level: Some(level),
                privacy_budget: config.privacy_budget,
                budget_spent: Some(cost),
            },
        })
    }

    fn rounding(&self, v: f64, config: &ObfuscationConfig) -> Result<Obfuscated, VqpError> {
        let requested = config.precision.unwrap_or(DEFAULT_SIGNIFICANT_DIGITS);
        if !requested.is_finite() || requested < 1.0 {
            return Err(VqpError::obfuscation(
                "rounding precision must be at least one significant digit",
            ));
        }
        let digits = (requested.floor() as u32).min(MAX_SIGNIFICANT_DIGITS);
        let rounded = number(round_significant(v, digits))?;
        Ok(Obfuscated {
            scalar: rounded.clone(),
            value: rounded,
            applied: ObfuscationApplied {
                method: ObfuscationMethod::Rounding,
                precision: Some(f64::from(digits)),
                noise_level: None,
                privacy_budget: None,
                budget_spent: None,
            },
        })
    }
}

#[async_trait]
impl ObfuscationPort for StandardObfuscator {
    async fn obfuscate(
        &self,
        value: &Value,
        config: &ObfuscationConfig,
    ) -> Result<Obfuscated, VqpError> {
        let v = value.as_f64().ok_or_else(|| {
            VqpError::obfuscation(format!("{} requires a numeric value", config.method))
        })?;
        match config.method {
            ObfuscationMethod::Range => self.range(v, config),
            ObfuscationMethod::Noise => self.noise(v, config),
            ObfuscationMethod::Rounding => self.rounding(v, config),
        }
    }
}
