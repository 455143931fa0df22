//! Bond markets and their return on investment

use crate::config::BondListing;
use crate::units::{bn_to_number, format_balance, shorten_number};
use crate::upstream::{BondMarketReads, RawBondPosition};
use ethers::types::U256;
use serde::{Deserialize, Serialize};

/// Scale of the aggregator's `marketPrice`
pub const BOND_PRICE_DECIMALS: u32 = 35;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bond {
    pub id: u64,
    pub bond_contract: String,
    pub input_token: String,
    pub input_decimals: u32,
    pub input_usd_price: f64,
    /// Reward token market price; `None` when the feed has no quote
    pub market_price: Option<f64>,
    pub bond_price: Option<f64>,
    pub roi: f64,
    pub positive_roi: bool,
    pub vesting_days: Option<u64>,
    /// Milliseconds since the epoch
    pub conclusion: Option<i64>,
    pub max_payout: Option<f64>,
    pub capacity: Option<f64>,
    /// `capacity` with a k/M/B suffix
    pub capacity_display: Option<String>,
    pub teller: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BondsPayload {
    pub bonds: Vec<Bond>,
}

/// A bond token held by an account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserBond {
    pub tx_hash: String,
    #[serde(rename = "blocknumber")]
    pub block_number: u64,
    /// Reward tokens received when the bond was bought
    pub payout: f64,
    /// Token id as a decimal string; ids use the full 256 bits
    pub id: String,
    pub current_balance: f64,
    pub active: bool,
    /// Milliseconds since the epoch
    pub expiry: i64,
    pub supply: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BondPositionsPayload {
    pub user_bonds: Vec<UserBond>,
}

/// Reward tokens a purchase of `amount` input tokens would pay out
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BondPayout {
    pub id: u64,
    pub amount: String,
    pub payout: f64,
    pub formatted: String,
}

impl UserBond {
    pub fn from_raw(raw: &RawBondPosition, reward_decimals: u32) -> Self {
        Self {
            tx_hash: format!("{:?}", raw.tx_hash),
            block_number: raw.block,
            payout: bn_to_number(raw.amount, reward_decimals),
            id: raw.id.to_string(),
            current_balance: bn_to_number(raw.balance, reward_decimals),
            active: raw.active,
            expiry: raw.expiry as i64 * 1000,
            supply: bn_to_number(raw.supply, reward_decimals),
        }
    }
}

impl BondPayout {
    pub fn new(id: u64, amount: &str, payout: U256, reward_decimals: u32, symbol: &str) -> Self {
        Self {
            id,
            amount: amount.to_string(),
            payout: bn_to_number(payout, reward_decimals),
            formatted: format_balance(payout, reward_decimals, symbol),
        }
    }
}

/// Percentage return of buying at `bond_price` instead of `market_price`
pub fn compute_roi(market_price: f64, bond_price: f64) -> f64 {
    if bond_price == 0.0 || !bond_price.is_finite() {
        return 0.0;
    }
    (market_price / bond_price - 1.0) * 100.0
}

pub fn is_positive_roi(market_price: f64, bond_price: f64) -> bool {
    bond_price > 0.0 && market_price > bond_price
}

impl Bond {
    /// Merge live market reads over the listing; missing reads keep the
    /// listing's values
    pub fn project(
        listing: &BondListing,
        reads: Option<&BondMarketReads>,
        market_price: Option<f64>,
        reward_decimals: u32,
    ) -> Self {
        let bond_price = reads
            .map(|r| bn_to_number(r.market_price, BOND_PRICE_DECIMALS))
            .or(listing.bond_price);
        let vesting_days = reads
            .map(|r| (r.vesting as f64 / SECONDS_PER_DAY).round() as u64)
            .or(listing.vesting_days);
        let conclusion = reads
            .map(|r| r.conclusion as i64 * 1000)
            .or(listing.conclusion);
        let max_payout = reads
            .map(|r| bn_to_number(r.max_payout, reward_decimals))
            .or(listing.max_payout);
        let capacity = reads
            .map(|r| bn_to_number(r.capacity, reward_decimals))
            .or(listing.capacity);
        let teller = reads
            .map(|r| format!("{:?}", r.teller))
            .or_else(|| listing.teller.clone());

        let (roi, positive_roi) = match (market_price, bond_price) {
            (Some(market), Some(bond)) => (compute_roi(market, bond), is_positive_roi(market, bond)),
            _ => (0.0, false),
        };

        Self {
            id: listing.id,
            bond_contract: listing.bond_contract.clone(),
            input_token: listing.input_token.clone(),
            input_decimals: listing.input_decimals,
            input_usd_price: 1.0,
            market_price,
            bond_price,
            roi,
            positive_roi,
            vesting_days,
            conclusion,
            max_payout,
            capacity,
            capacity_display: capacity.map(|c| shorten_number(c, 2)),
            teller,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{Address, H256};

    fn listing() -> BondListing {
        BondListing {
            id: 4,
            bond_contract: "0x007F7735baF391e207E3aA380bb53c4Bd9a5Fed6".to_string(),
            input_token: "DOLA".to_string(),
            input_decimals: 18,
            underlying_cg_id: Some("dola-usd".to_string()),
            bond_price: Some(40.0),
            vesting_days: Some(7),
            conclusion: Some(1_700_000_000_000),
            max_payout: Some(10.0),
            capacity: Some(100.0),
            teller: None,
        }
    }

    fn reads() -> BondMarketReads {
        BondMarketReads {
            // 45 * 1e35
            market_price: U256::from(45u64) * U256::exp10(35),
            teller: Address::from([0x11u8; 20]),
            capacity: U256::exp10(18) * U256::from(250u64),
            max_payout: U256::exp10(18) * U256::from(5u64),
            vesting: 14 * 86_400 + 3_600,
            conclusion: 1_800_000_000,
        }
    }

    #[test]
    fn test_roi_formula() {
        assert_eq!(compute_roi(50.0, 40.0), 25.0);
        assert_eq!(compute_roi(30.0, 40.0), -25.0);
        assert_eq!(compute_roi(50.0, 0.0), 0.0);
        assert_eq!(compute_roi(50.0, f64::NAN), 0.0);
    }

    #[test]
    fn test_positive_roi_flag() {
        assert!(is_positive_roi(50.0, 40.0));
        assert!(!is_positive_roi(40.0, 40.0));
        assert!(!is_positive_roi(50.0, 0.0));
    }

    #[test]
    fn test_projection_prefers_live_reads() {
        let bond = Bond::project(&listing(), Some(&reads()), Some(54.0), 18);

        assert_eq!(bond.bond_price, Some(45.0));
        assert!((bond.roi - 20.0).abs() < 1e-9);
        assert!(bond.positive_roi);
        assert_eq!(bond.vesting_days, Some(14));
        assert_eq!(bond.conclusion, Some(1_800_000_000_000));
        assert_eq!(bond.capacity, Some(250.0));
        assert_eq!(bond.capacity_display.as_deref(), Some("250.00"));
        assert_eq!(bond.max_payout, Some(5.0));
        assert_eq!(
            bond.teller.as_deref(),
            Some("0x1111111111111111111111111111111111111111")
        );
    }

    #[test]
    fn test_projection_falls_back_to_listing() {
        let bond = Bond::project(&listing(), None, Some(30.0), 18);

        assert_eq!(bond.bond_price, Some(40.0));
        assert_eq!(bond.roi, -25.0);
        assert!(!bond.positive_roi);
        assert_eq!(bond.vesting_days, Some(7));
        assert_eq!(bond.capacity, Some(100.0));
        assert!(bond.teller.is_none());
    }

    #[test]
    fn test_missing_market_price_gives_zero_roi() {
        let bond = Bond::project(&listing(), Some(&reads()), None, 18);
        assert_eq!(bond.roi, 0.0);
        assert!(!bond.positive_roi);
    }

    #[test]
    fn test_zero_bond_price_gives_zero_roi() {
        let mut reads = reads();
        reads.market_price = U256::zero();
        let bond = Bond::project(&listing(), Some(&reads), Some(10.0), 18);
        assert_eq!(bond.bond_price, Some(0.0));
        assert_eq!(bond.roi, 0.0);
        assert!(!bond.positive_roi);
    }

    #[test]
    fn test_large_capacity_is_shortened() {
        let mut reads = reads();
        reads.capacity = U256::exp10(18) * U256::from(1_250_000u64);
        let bond = Bond::project(&listing(), Some(&reads), Some(54.0), 18);
        assert_eq!(bond.capacity_display.as_deref(), Some("1.25M"));

        let unlisted = BondListing {
            capacity: None,
            ..listing()
        };
        assert!(Bond::project(&unlisted, None, None, 18).capacity_display.is_none());
    }

    #[test]
    fn test_user_bond_from_raw() {
        let raw = RawBondPosition {
            tx_hash: H256::from([0xab; 32]),
            block: 15_000_000,
            id: U256::from(77u64),
            amount: U256::exp10(18) * U256::from(3u64),
            balance: U256::exp10(17) * U256::from(15u64),
            active: true,
            expiry: 1_700_000_000,
            supply: U256::exp10(18) * U256::from(40u64),
        };

        let bond = UserBond::from_raw(&raw, 18);
        assert_eq!(bond.tx_hash, format!("0x{}", "ab".repeat(32)));
        assert_eq!(bond.payout, 3.0);
        assert_eq!(bond.current_balance, 1.5);
        assert_eq!(bond.expiry, 1_700_000_000_000);
        assert_eq!(bond.supply, 40.0);
        assert_eq!(bond.id, "77");

        let json = serde_json::to_value(&bond).unwrap();
        assert_eq!(json["blocknumber"], 15_000_000);
        assert_eq!(json["currentBalance"], 1.5);
        assert_eq!(json["txHash"], bond.tx_hash.as_str());
    }

    #[test]
    fn test_payout_formatting() {
        let payout = BondPayout::new(4, "1.5", U256::exp10(17) * U256::from(25u64), 18, "INV");
        assert_eq!(payout.payout, 2.5);
        assert_eq!(payout.formatted, "2.5000000000 INV");

        let nothing = BondPayout::new(4, "0", U256::zero(), 18, "INV");
        assert_eq!(nothing.formatted, "0.00 INV");
    }
}
