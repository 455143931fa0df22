//! On-chain reads through JSON-RPC using ethers-rs
//!
//! Calls that make up one view are dispatched together and awaited jointly.

use super::{Result, UpstreamError};
use crate::config::{BondListing, Config, NetworkId};
use async_trait::async_trait;
use ethers::abi::{Abi, Detokenize, ParamType, Token, Tokenize};
use ethers::contract::{BaseContract, Contract};
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Filter, Log, TransactionRequest, H256, U256};
use ethers::utils::keccak256;
use futures::future::try_join_all;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;

const SERVICE: &str = "rpc";

const INTEREST_MODEL_ABI: &[&str] = &[
    "function blocksPerYear() external view returns (uint256)",
    "function kink() external view returns (uint256)",
    "function multiplierPerBlock() external view returns (uint256)",
    "function jumpMultiplierPerBlock() external view returns (uint256)",
    "function baseRatePerBlock() external view returns (uint256)",
];

const BOND_AGGREGATOR_ABI: &[&str] = &[
    "function marketPrice(uint256 id) external view returns (uint256)",
    "function getTeller() external view returns (address)",
    "function markets(uint256 id) external view returns (address owner, address payoutToken, address quoteToken, address callbackAddr, bool capacityInQuote, uint256 capacity, uint256 totalDebt, uint256 minPrice, uint256 maxPayout, uint256 sold, uint256 purchased, uint256 scale)",
    "function terms(uint256 id) external view returns (uint256 controlVariable, uint256 maxDebt, uint48 vesting, uint48 conclusion)",
    "function payoutFor(uint256 amount, uint256 id, address referrer) external view returns (uint256)",
];

const BOND_TELLER_ABI: &[&str] = &[
    "function balanceOf(address account, uint256 id) external view returns (uint256)",
    "function tokenMetadata(uint256 id) external view returns (bool active, address underlying, uint48 expiry, uint256 supply)",
];

const GOVERNOR_ABI: &[&str] = &[
    "function proposalCount() external view returns (uint256)",
    "function proposals(uint256 id) external view returns (uint256 id, address proposer, uint256 eta, uint256 startBlock, uint256 endBlock, uint256 forVotes, uint256 againstVotes, bool canceled, bool executed)",
    "function state(uint256 proposalId) external view returns (uint8)",
];

const DELEGATE_CHANGED: &str = "DelegateChanged(address,address,address)";
const DELEGATE_VOTES_CHANGED: &str = "DelegateVotesChanged(address,uint256,uint256)";
const TRANSFER_SINGLE: &str = "TransferSingle(address,address,address,uint256,uint256)";

type RpcContract = Contract<Provider<Http>>;

type MarketTuple = (
    Address,
    Address,
    Address,
    Address,
    bool,
    U256,
    U256,
    U256,
    U256,
    U256,
    U256,
    U256,
);

type ProposalTuple = (U256, Address, U256, U256, U256, U256, U256, bool, bool);

/// Jump-rate interest model parameters, as stored on chain (1e18 mantissa)
#[derive(Debug, Clone, PartialEq)]
pub struct RawInterestModel {
    pub blocks_per_year: U256,
    pub kink: U256,
    pub multiplier_per_block: U256,
    pub jump_multiplier_per_block: U256,
    pub base_rate_per_block: U256,
}

/// Live state of one bond market
#[derive(Debug, Clone, PartialEq)]
pub struct BondMarketReads {
    /// Quoted price, scaled by 1e35
    pub market_price: U256,
    pub teller: Address,
    pub capacity: U256,
    pub max_payout: U256,
    /// Vesting duration in seconds
    pub vesting: u64,
    /// Market end, in seconds since the epoch
    pub conclusion: u64,
}

/// A bond token received by an account, with the token's current state
#[derive(Debug, Clone, PartialEq)]
pub struct RawBondPosition {
    pub tx_hash: H256,
    pub block: u64,
    pub id: U256,
    /// Amount received in the transfer
    pub amount: U256,
    pub balance: U256,
    pub active: bool,
    /// Seconds since the epoch
    pub expiry: u64,
    pub supply: U256,
}

/// `TransferSingle` log of the bond teller
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TellerTransfer {
    pub tx_hash: H256,
    pub block: u64,
    pub id: U256,
    pub amount: U256,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawProposal {
    pub id: u64,
    pub proposer: Address,
    pub eta: u64,
    pub start_block: u64,
    pub end_block: u64,
    pub for_votes: U256,
    pub against_votes: U256,
    pub canceled: bool,
    pub executed: bool,
    /// GovernorAlpha `state()` ordinal
    pub state: u8,
}

/// Delegation log of the governance token
#[derive(Debug, Clone, PartialEq)]
pub enum DelegateEvent {
    Changed {
        delegator: Address,
        from_delegate: Address,
        to_delegate: Address,
        block: u64,
        log_index: u64,
    },
    VotesChanged {
        delegate: Address,
        new_balance: U256,
        block: u64,
        log_index: u64,
    },
}

impl DelegateEvent {
    pub fn position(&self) -> (u64, u64) {
        match self {
            DelegateEvent::Changed { block, log_index, .. }
            | DelegateEvent::VotesChanged { block, log_index, .. } => (*block, *log_index),
        }
    }
}

#[async_trait]
pub trait InterestModelSource: Send + Sync {
    async fn interest_model(&self, address: &str) -> Result<RawInterestModel>;
}

#[async_trait]
pub trait BondMarketSource: Send + Sync {
    async fn bond_market(&self, listing: &BondListing) -> Result<BondMarketReads>;

    /// Bond tokens `account` received from `teller`
    async fn bond_positions(&self, teller: &str, account: &str) -> Result<Vec<RawBondPosition>>;

    /// Reward tokens quoted for `amount` of the listing's input token
    async fn payout_for(&self, listing: &BondListing, amount: U256, referrer: Address) -> Result<U256>;
}

#[async_trait]
pub trait GovernanceSource: Send + Sync {
    async fn proposals(&self, governor: &str) -> Result<Vec<RawProposal>>;

    async fn delegate_events(&self, token: &str, from_block: u64) -> Result<Vec<DelegateEvent>>;
}

/// JSON-RPC client with one HTTP provider per configured network
pub struct EthersChainClient {
    providers: HashMap<NetworkId, Arc<Provider<Http>>>,
}

impl EthersChainClient {
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut providers = HashMap::new();
        for network in &config.networks {
            let provider = Provider::<Http>::try_from(network.rpc_url.as_str()).map_err(|e| {
                UpstreamError::NotConfigured(format!(
                    "invalid RPC url for chain {}: {}",
                    network.chain_id, e
                ))
            })?;
            providers.insert(network.chain_id, Arc::new(provider));
        }
        info!("Chain client ready for {} networks", providers.len());
        Ok(Self { providers })
    }

    fn provider(&self, chain: NetworkId) -> Result<Arc<Provider<Http>>> {
        self.providers
            .get(&chain)
            .cloned()
            .ok_or_else(|| UpstreamError::NotConfigured(format!("no RPC provider for chain {}", chain)))
    }

    fn contract(&self, chain: NetworkId, address: &str, abi: &[&str]) -> Result<RpcContract> {
        let address = parse_address(address)?;
        let abi: Abi = ethers::abi::parse_abi(abi).map_err(|e| UpstreamError::malformed(SERVICE, e))?;
        Ok(Contract::new(address, abi, self.provider(chain)?))
    }
}

fn parse_address(value: &str) -> Result<Address> {
    value
        .parse::<Address>()
        .map_err(|_| UpstreamError::NotConfigured(format!("invalid address {}", value)))
}

async fn call<T, A>(contract: &RpcContract, name: &str, args: A) -> Result<T>
where
    T: Detokenize,
    A: Tokenize,
{
    contract
        .method::<A, T>(name, args)
        .map_err(|e| UpstreamError::malformed(SERVICE, format!("{}: {}", name, e)))?
        .call()
        .await
        .map_err(|e| UpstreamError::unavailable(SERVICE, format!("{}: {}", name, e)))
}

fn low_u64(value: U256, field: &str) -> Result<u64> {
    if value > U256::from(u64::MAX) {
        return Err(UpstreamError::malformed(SERVICE, format!("{} overflows u64", field)));
    }
    Ok(value.as_u64())
}

#[async_trait]
impl InterestModelSource for EthersChainClient {
    async fn interest_model(&self, address: &str) -> Result<RawInterestModel> {
        let contract = self.contract(NetworkId::Mainnet, address, INTEREST_MODEL_ABI)?;

        let (blocks_per_year, kink, multiplier_per_block, jump_multiplier_per_block, base_rate_per_block) = tokio::try_join!(
            call::<U256, _>(&contract, "blocksPerYear", ()),
            call::<U256, _>(&contract, "kink", ()),
            call::<U256, _>(&contract, "multiplierPerBlock", ()),
            call::<U256, _>(&contract, "jumpMultiplierPerBlock", ()),
            call::<U256, _>(&contract, "baseRatePerBlock", ()),
        )?;

        Ok(RawInterestModel {
            blocks_per_year,
            kink,
            multiplier_per_block,
            jump_multiplier_per_block,
            base_rate_per_block,
        })
    }
}

#[async_trait]
impl BondMarketSource for EthersChainClient {
    async fn bond_market(&self, listing: &BondListing) -> Result<BondMarketReads> {
        let contract = self.contract(NetworkId::Mainnet, &listing.bond_contract, BOND_AGGREGATOR_ABI)?;
        let id = U256::from(listing.id);

        let (market_price, teller, market, terms) = tokio::try_join!(
            call::<U256, _>(&contract, "marketPrice", id),
            call::<Address, _>(&contract, "getTeller", ()),
            call::<MarketTuple, _>(&contract, "markets", id),
            call::<(U256, U256, U256, U256), _>(&contract, "terms", id),
        )?;

        Ok(BondMarketReads {
            market_price,
            teller,
            capacity: market.5,
            max_payout: market.8,
            vesting: low_u64(terms.2, "vesting")?,
            conclusion: low_u64(terms.3, "conclusion")?,
        })
    }

    async fn bond_positions(&self, teller: &str, account: &str) -> Result<Vec<RawBondPosition>> {
        let provider = self.provider(NetworkId::Mainnet)?;
        let account = parse_address(account)?;
        let filter = Filter::new()
            .address(parse_address(teller)?)
            .event(TRANSFER_SINGLE)
            .topic3(address_topic(account));

        let logs = provider
            .get_logs(&filter)
            .await
            .map_err(|e| UpstreamError::unavailable(SERVICE, e))?;
        let transfers = logs
            .iter()
            .map(decode_transfer_single)
            .collect::<Result<Vec<_>>>()?;
        debug!("{} bond transfers to {:?}", transfers.len(), account);

        let contract = self.contract(NetworkId::Mainnet, teller, BOND_TELLER_ABI)?;
        let reads = transfers.into_iter().map(|transfer| {
            let contract = &contract;
            async move {
                let (balance, metadata) = tokio::try_join!(
                    call::<U256, _>(contract, "balanceOf", (account, transfer.id)),
                    call::<(bool, Address, U256, U256), _>(contract, "tokenMetadata", transfer.id),
                )?;
                Ok::<_, UpstreamError>(RawBondPosition {
                    tx_hash: transfer.tx_hash,
                    block: transfer.block,
                    id: transfer.id,
                    amount: transfer.amount,
                    balance,
                    active: metadata.0,
                    expiry: low_u64(metadata.2, "expiry")?,
                    supply: metadata.3,
                })
            }
        });

        try_join_all(reads).await
    }

    async fn payout_for(&self, listing: &BondListing, amount: U256, referrer: Address) -> Result<U256> {
        let provider = self.provider(NetworkId::Mainnet)?;
        let abi = ethers::abi::parse_abi(BOND_AGGREGATOR_ABI).map_err(|e| UpstreamError::malformed(SERVICE, e))?;
        let calldata = BaseContract::from(abi)
            .encode("payoutFor", (amount, U256::from(listing.id), referrer))
            .map_err(|e| UpstreamError::malformed(SERVICE, e))?;

        let tx: TypedTransaction = TransactionRequest::new()
            .to(parse_address(&listing.bond_contract)?)
            .data(calldata)
            .into();
        let raw = provider
            .call(&tx, None)
            .await
            .map_err(|e| UpstreamError::unavailable(SERVICE, format!("payoutFor: {}", e)))?;

        decode_payout(&raw)
    }
}

/// Some aggregator deployments return `(payout, fee)` rather than `payout`
pub(crate) fn decode_payout(raw: &[u8]) -> Result<U256> {
    let words = if raw.len() >= 64 { 2 } else { 1 };
    let tokens = ethers::abi::decode(&vec![ParamType::Uint(256); words], raw)
        .map_err(|e| UpstreamError::malformed(SERVICE, format!("payoutFor: {}", e)))?;
    match tokens.first() {
        Some(Token::Uint(payout)) => Ok(*payout),
        _ => Err(UpstreamError::malformed(SERVICE, "payoutFor returned no amount")),
    }
}

#[async_trait]
impl GovernanceSource for EthersChainClient {
    async fn proposals(&self, governor: &str) -> Result<Vec<RawProposal>> {
        let contract = self.contract(NetworkId::Mainnet, governor, GOVERNOR_ABI)?;
        let count = low_u64(call::<U256, _>(&contract, "proposalCount", ()).await?, "proposalCount")?;
        debug!("Governor {} has {} proposals", governor, count);

        let reads = (1..=count).map(|id| {
            let contract = &contract;
            async move {
                let (proposal, state) = tokio::try_join!(
                    call::<ProposalTuple, _>(contract, "proposals", U256::from(id)),
                    call::<u8, _>(contract, "state", U256::from(id)),
                )?;
                Ok::<_, UpstreamError>(RawProposal {
                    id,
                    proposer: proposal.1,
                    eta: low_u64(proposal.2, "eta")?,
                    start_block: low_u64(proposal.3, "startBlock")?,
                    end_block: low_u64(proposal.4, "endBlock")?,
                    for_votes: proposal.5,
                    against_votes: proposal.6,
                    canceled: proposal.7,
                    executed: proposal.8,
                    state,
                })
            }
        });

        try_join_all(reads).await
    }

    async fn delegate_events(&self, token: &str, from_block: u64) -> Result<Vec<DelegateEvent>> {
        let provider = self.provider(NetworkId::Mainnet)?;
        let filter = Filter::new()
            .address(parse_address(token)?)
            .from_block(from_block)
            .events([DELEGATE_CHANGED, DELEGATE_VOTES_CHANGED]);

        let logs = provider
            .get_logs(&filter)
            .await
            .map_err(|e| UpstreamError::unavailable(SERVICE, e))?;
        debug!("Fetched {} delegation logs", logs.len());

        logs.iter().map(decode_delegate_log).collect()
    }
}

fn topic_address(topic: &H256) -> Address {
    Address::from_slice(&topic.as_bytes()[12..])
}

fn address_topic(address: Address) -> H256 {
    let mut raw = [0u8; 32];
    raw[12..].copy_from_slice(address.as_bytes());
    H256::from(raw)
}

pub(crate) fn decode_transfer_single(log: &Log) -> Result<TellerTransfer> {
    if log.topics.first() != Some(&H256::from(keccak256(TRANSFER_SINGLE))) {
        return Err(UpstreamError::malformed(SERVICE, "not a TransferSingle log"));
    }
    let tokens = ethers::abi::decode(&[ParamType::Uint(256), ParamType::Uint(256)], &log.data)
        .map_err(|e| UpstreamError::malformed(SERVICE, e))?;
    match (tokens.first(), tokens.get(1)) {
        (Some(Token::Uint(id)), Some(Token::Uint(amount))) => Ok(TellerTransfer {
            tx_hash: log.transaction_hash.unwrap_or_default(),
            block: log.block_number.map(|b| b.as_u64()).unwrap_or_default(),
            id: *id,
            amount: *amount,
        }),
        _ => Err(UpstreamError::malformed(SERVICE, "TransferSingle data")),
    }
}

pub(crate) fn decode_delegate_log(log: &Log) -> Result<DelegateEvent> {
    let block = log.block_number.map(|b| b.as_u64()).unwrap_or_default();
    let log_index = log.log_index.map(|i| i.low_u64()).unwrap_or_default();
    let topic0 = log
        .topics
        .first()
        .ok_or_else(|| UpstreamError::malformed(SERVICE, "log without topics"))?;

    if *topic0 == H256::from(keccak256(DELEGATE_CHANGED)) {
        if log.topics.len() < 4 {
            return Err(UpstreamError::malformed(SERVICE, "DelegateChanged missing topics"));
        }
        return Ok(DelegateEvent::Changed {
            delegator: topic_address(&log.topics[1]),
            from_delegate: topic_address(&log.topics[2]),
            to_delegate: topic_address(&log.topics[3]),
            block,
            log_index,
        });
    }

    if *topic0 == H256::from(keccak256(DELEGATE_VOTES_CHANGED)) {
        if log.topics.len() < 2 {
            return Err(UpstreamError::malformed(SERVICE, "DelegateVotesChanged missing topics"));
        }
        let tokens = ethers::abi::decode(&[ParamType::Uint(256), ParamType::Uint(256)], &log.data)
            .map_err(|e| UpstreamError::malformed(SERVICE, e))?;
        let new_balance = match tokens.get(1) {
            Some(Token::Uint(value)) => *value,
            _ => return Err(UpstreamError::malformed(SERVICE, "DelegateVotesChanged data")),
        };
        return Ok(DelegateEvent::VotesChanged {
            delegate: topic_address(&log.topics[1]),
            new_balance,
            block,
            log_index,
        });
    }

    Err(UpstreamError::malformed(SERVICE, format!("unexpected event topic {:?}", topic0)))
}
