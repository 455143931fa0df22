//! Jump-rate interest model, projected to yearly percentages

use crate::units::{bn_to_number, ETH_MANTISSA};
use crate::upstream::RawInterestModel;
use ethers::types::U256;
use serde::{Deserialize, Serialize};

pub const BLOCKS_PER_DAY: u64 = 5_760;
pub const DAYS_PER_YEAR: u64 = 365;
pub const BLOCKS_PER_YEAR: u64 = BLOCKS_PER_DAY * DAYS_PER_YEAR;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InterestModel {
    /// Utilisation rate at which the jump multiplier kicks in, in percent
    pub kink: f64,
    pub multiplier_per_year: f64,
    pub jump_multiplier_per_year: f64,
    pub base_rate_per_year: f64,
    pub blocks_per_year: u64,
}

fn mantissa(value: U256) -> f64 {
    bn_to_number(value, 0) / ETH_MANTISSA
}

fn per_block_to_yearly_percent(value: U256) -> f64 {
    mantissa(value) * BLOCKS_PER_YEAR as f64 * 100.0
}

impl InterestModel {
    /// The on-chain `blocksPerYear` is ignored in favour of [`BLOCKS_PER_YEAR`]
    pub fn from_raw(raw: &RawInterestModel) -> Self {
        Self {
            kink: mantissa(raw.kink) * 100.0,
            multiplier_per_year: per_block_to_yearly_percent(raw.multiplier_per_block),
            jump_multiplier_per_year: per_block_to_yearly_percent(raw.jump_multiplier_per_block),
            base_rate_per_year: per_block_to_yearly_percent(raw.base_rate_per_block),
            blocks_per_year: BLOCKS_PER_YEAR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9 * b.abs().max(1.0)
    }

    #[test]
    fn test_projection() {
        let raw = RawInterestModel {
            blocks_per_year: U256::from(2_628_000u64),
            // 80%
            kink: U256::from_dec_str("800000000000000000").unwrap(),
            multiplier_per_block: U256::from(23_782_343_987u64),
            jump_multiplier_per_block: U256::from(0u64),
            base_rate_per_block: U256::from(1_000_000_000u64),
        };

        let model = InterestModel::from_raw(&raw);
        assert!(close(model.kink, 80.0));
        assert!(close(model.multiplier_per_year, 23_782_343_987.0 / 1e18 * 2_102_400.0 * 100.0));
        assert_eq!(model.jump_multiplier_per_year, 0.0);
        assert!(close(model.base_rate_per_year, 1e9 / 1e18 * 2_102_400.0 * 100.0));
        assert_eq!(model.blocks_per_year, 2_102_400);
    }

    #[test]
    fn test_payload_field_names() {
        let json = serde_json::to_value(InterestModel::from_raw(&RawInterestModel {
            blocks_per_year: U256::zero(),
            kink: U256::zero(),
            multiplier_per_block: U256::zero(),
            jump_multiplier_per_block: U256::zero(),
            base_rate_per_block: U256::zero(),
        }))
        .unwrap();
        assert!(json.get("jumpMultiplierPerYear").is_some());
        assert_eq!(json["blocksPerYear"], 2_102_400);
    }
}
