//! Fed revenue aggregation
//!
//! Profits a fed sends to the treasury are read from the transfer indexer,
//! ordered by block height and folded into running totals: one per fed,
//! and one across all feds in timestamp order.

use crate::config::FedConfig;
use crate::upstream::{TransferTx, TransfersPage};
use crate::units::parse_integer_amount;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stablecoin decimals
const PROFIT_DECIMALS: u32 = 18;

/// Recipient placeholder for transfers without a `to_address` (burns)
const NULL_RECIPIENT: &str = "null";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RevenueError {
    #[error("Malformed transfer {tx_hash}: {reason}")]
    Malformed { tx_hash: String, reason: String },
}

pub type Result<T> = std::result::Result<T, RevenueError>;

/// A profit transfer from one fed to the treasury
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FedTransfer {
    pub block_number: u64,
    /// Milliseconds since the epoch
    pub timestamp: i64,
    pub profit: f64,
    pub transaction_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RevenueEvent {
    pub block_number: u64,
    pub timestamp: i64,
    pub profit: f64,
    pub transaction_hash: String,
    pub fed_index: usize,
    /// Running profit of this fed
    pub acc_profit: f64,
    /// Running profit of all feds
    pub total_acc_profit: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FedRevenues {
    pub total_events: Vec<RevenueEvent>,
}

/// Address a fed's profits are sent to, lower-cased
pub fn revenue_target(fed: &FedConfig, treasury: &str) -> String {
    if fed.is_xchain {
        NULL_RECIPIENT.to_string()
    } else {
        treasury.to_lowercase()
    }
}

fn recipient(to_address: &Option<String>) -> String {
    to_address
        .as_deref()
        .unwrap_or(NULL_RECIPIENT)
        .to_lowercase()
}

fn parse_timestamp(tx: &TransferTx) -> Result<i64> {
    DateTime::parse_from_rfc3339(&tx.block_signed_at)
        .map(|dt| dt.timestamp_millis())
        .map_err(|e| RevenueError::Malformed {
            tx_hash: tx.tx_hash.clone(),
            reason: format!("block_signed_at: {}", e),
        })
}

/// Successful transfers to `target`, oldest block first
pub fn filter_fed_transfers(target: &str, page: &TransfersPage) -> Result<Vec<FedTransfer>> {
    let mut items: Vec<&TransferTx> = page
        .items
        .iter()
        .filter(|tx| tx.successful)
        .filter(|tx| tx.transfers.iter().any(|t| recipient(&t.to_address) == target))
        .collect();
    items.sort_by_key(|tx| tx.block_height);

    items
        .into_iter()
        .map(|tx| {
            // the filter above guarantees a match
            let transfer = tx
                .transfers
                .iter()
                .find(|t| recipient(&t.to_address) == target)
                .ok_or_else(|| RevenueError::Malformed {
                    tx_hash: tx.tx_hash.clone(),
                    reason: "no transfer to target".to_string(),
                })?;
            let profit = parse_integer_amount(&transfer.delta, PROFIT_DECIMALS).ok_or_else(|| {
                RevenueError::Malformed {
                    tx_hash: tx.tx_hash.clone(),
                    reason: format!("invalid delta {}", transfer.delta),
                }
            })?;

            Ok(FedTransfer {
                block_number: tx.block_height,
                timestamp: parse_timestamp(tx)?,
                profit,
                transaction_hash: tx.tx_hash.clone(),
            })
        })
        .collect()
}

/// Fold per-fed transfer lists into running totals.
///
/// `per_fed[i]` holds the transfers of `feds[i]`, already in block order.
pub fn aggregate_revenues(feds: &[FedConfig], per_fed: Vec<Vec<FedTransfer>>) -> FedRevenues {
    let mut acc_profits: HashMap<&str, f64> = HashMap::new();

    let mut events: Vec<RevenueEvent> = per_fed
        .into_iter()
        .zip(feds.iter())
        .enumerate()
        .flat_map(|(fed_index, (transfers, fed))| {
            let acc = acc_profits.entry(fed.address.as_str()).or_insert(0.0);
            transfers
                .into_iter()
                .map(|t| {
                    *acc += t.profit;
                    RevenueEvent {
                        block_number: t.block_number,
                        timestamp: t.timestamp,
                        profit: t.profit,
                        transaction_hash: t.transaction_hash,
                        fed_index,
                        acc_profit: *acc,
                        total_acc_profit: 0.0,
                    }
                })
                .collect::<Vec<_>>()
        })
        .collect();

    // stable: same-timestamp events keep fed order
    events.sort_by_key(|e| e.timestamp);

    let mut total = 0.0;
    for event in events.iter_mut() {
        total += event.profit;
        event.total_acc_profit = total;
    }

    FedRevenues {
        total_events: events,
    }
}
