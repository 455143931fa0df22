//! Service configuration and the protocol address book

use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid address for {field}: {value}")]
    InvalidAddress { field: String, value: String },

    #[error("No RPC endpoint configured for chain {0}")]
    MissingNetwork(u64),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Chains the dashboard reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u64", try_from = "u64")]
pub enum NetworkId {
    Mainnet,
    Optimism,
    Fantom,
}

impl NetworkId {
    pub fn chain_id(self) -> u64 {
        match self {
            NetworkId::Mainnet => 1,
            NetworkId::Optimism => 10,
            NetworkId::Fantom => 250,
        }
    }
}

impl From<NetworkId> for u64 {
    fn from(id: NetworkId) -> Self {
        id.chain_id()
    }
}

impl TryFrom<u64> for NetworkId {
    type Error = String;

    fn try_from(value: u64) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(NetworkId::Mainnet),
            10 => Ok(NetworkId::Optimism),
            250 => Ok(NetworkId::Fantom),
            other => Err(format!("unsupported chain id {}", other)),
        }
    }
}

impl std::fmt::Display for NetworkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.chain_id())
    }
}

/// RPC endpoint and per-network token addresses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: NetworkId,
    pub rpc_url: String,
    /// Stablecoin deployment on this network, if any
    #[serde(default)]
    pub dola: Option<String>,
}

/// A fed: a module allowed to mint and manage the stablecoin supply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FedConfig {
    pub chain_id: NetworkId,
    pub address: String,
    pub name: String,
    /// Cross-chain feds send profits through a bridge swap-out (a burn)
    #[serde(default)]
    pub is_xchain: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supply_func_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_image: Option<String>,
}

impl FedConfig {
    fn new(chain_id: NetworkId, address: &str, name: &str) -> Self {
        Self {
            chain_id,
            address: address.to_string(),
            name: name.to_string(),
            is_xchain: false,
            old_address: None,
            supply_func_name: None,
            project_image: None,
        }
    }
}

/// An active bond market and the values shown when chain reads are missing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BondListing {
    pub id: u64,
    pub bond_contract: String,
    pub input_token: String,
    pub input_decimals: u32,
    #[serde(default)]
    pub underlying_cg_id: Option<String>,
    #[serde(default)]
    pub bond_price: Option<f64>,
    #[serde(default)]
    pub vesting_days: Option<u64>,
    #[serde(default)]
    pub conclusion: Option<i64>,
    #[serde(default)]
    pub max_payout: Option<f64>,
    #[serde(default)]
    pub capacity: Option<f64>,
    #[serde(default)]
    pub teller: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum CacheConfig {
    Memory,
    Redis { url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub base_url: String,
    pub api_key: String,
    pub page_size: u32,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.covalenthq.com/v1".to_string(),
            api_key: String::new(),
            page_size: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceFeedConfig {
    pub base_url: String,
}

impl Default for PriceFeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.coingecko.com/api/v3".to_string(),
        }
    }
}

/// Freshness windows per endpoint, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
    pub revenues: u64,
    pub interest_model: u64,
    pub bonds: u64,
    pub proposals: u64,
    pub delegates: u64,
    pub prices: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            revenues: 300,
            interest_model: 900,
            bonds: 60,
            proposals: 60,
            delegates: 300,
            prices: 60,
        }
    }
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_port: u16,
    pub cache: CacheConfig,
    pub networks: Vec<NetworkConfig>,
    /// Mainnet stablecoin
    pub dola: String,
    pub treasury: String,
    pub feds: Vec<FedConfig>,
    pub bonds: Vec<BondListing>,
    pub interest_model: Option<String>,
    /// Governor contract
    pub governance: Option<String>,
    /// Governance token, source of delegation events
    pub inv: Option<String>,
    pub inv_deploy_block: u64,
    pub indexer: IndexerConfig,
    pub prices: PriceFeedConfig,
    pub reward_token_cg_id: String,
    pub reward_token_decimals: u32,
    pub reward_token_symbol: String,
    pub upstream_timeout_secs: u64,
    pub ttl: TtlConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut scream = FedConfig::new(
            NetworkId::Fantom,
            "0x4d7928e993125A9Cefe7ffa9aB637653654222E2",
            "Scream Fed",
        );
        scream.is_xchain = true;

        let mut convex = FedConfig::new(
            NetworkId::Mainnet,
            "0x9060A61994F700632D16D6d2938CA3C7a1D344Cb",
            "Convex Fed",
        );
        convex.old_address = Some("0x57d59a73cdc15fe717d2f1d433290197732659e2".to_string());
        convex.supply_func_name = Some("dolaSupply".to_string());

        let mut velo = FedConfig::new(
            NetworkId::Mainnet,
            "0xfEd533e0Ec584D6FF40281a7850c4621D258b43d",
            "Velo Fed",
        );
        velo.supply_func_name = Some("dolaSupply".to_string());

        let mut aura = FedConfig::new(
            NetworkId::Mainnet,
            "0x5D5392505ee69f9FE7a6a1c1AF14f17Db3B3e364",
            "Aura Fed",
        );
        aura.supply_func_name = Some("dolaSupply".to_string());

        Self {
            api_port: 8080,
            cache: CacheConfig::Memory,
            networks: vec![
                NetworkConfig {
                    chain_id: NetworkId::Mainnet,
                    rpc_url: "https://cloudflare-eth.com".to_string(),
                    dola: Some("0x865377367054516e17014CcdED1e7d814EDC9ce4".to_string()),
                },
                NetworkConfig {
                    chain_id: NetworkId::Fantom,
                    rpc_url: "https://rpc.ftm.tools".to_string(),
                    dola: Some("0x3129662808bEC728a27Ab6a6b9AFd3cBacA8A43c".to_string()),
                },
                NetworkConfig {
                    chain_id: NetworkId::Optimism,
                    rpc_url: "https://mainnet.optimism.io".to_string(),
                    dola: None,
                },
            ],
            dola: "0x865377367054516e17014CcdED1e7d814EDC9ce4".to_string(),
            treasury: "0x926dF14a23BE491164dCF93f4c468A50ef659D5B".to_string(),
            feds: vec![
                FedConfig::new(NetworkId::Mainnet, "0x5E075E40D01c82B6Bf0B0ecdb4Eb1D6984357EF7", "Frontier Fed"),
                FedConfig::new(NetworkId::Mainnet, "0xe3277f1102C1ca248aD859407Ca0cBF128DB0664", "Fuse6 Fed"),
                FedConfig::new(NetworkId::Mainnet, "0x7765996dAe0Cf3eCb0E74c016fcdFf3F055A5Ad8", "Badger Fed"),
                FedConfig::new(NetworkId::Mainnet, "0x5Fa92501106d7E4e8b4eF3c4d08112b6f306194C", "0xb1 Fed"),
                FedConfig::new(NetworkId::Mainnet, "0xCBF33D02f4990BaBcba1974F1A5A8Aea21080E36", "Fuse24 Fed"),
                FedConfig::new(NetworkId::Mainnet, "0xcc180262347F84544c3a4854b87C34117ACADf94", "Yearn Fed"),
                convex,
                scream,
                velo,
                aura,
            ],
            bonds: Vec::new(),
            interest_model: None,
            governance: Some("0xBeCCB6bb0aa4ab551966A7E4B97cec74bb359Bf6".to_string()),
            inv: Some("0x41D5D79431A913C4aE7d69a668ecdfE5fF9DFB68".to_string()),
            inv_deploy_block: 0,
            indexer: IndexerConfig::default(),
            prices: PriceFeedConfig::default(),
            reward_token_cg_id: "inverse-finance".to_string(),
            reward_token_decimals: 18,
            reward_token_symbol: "INV".to_string(),
            upstream_timeout_secs: 6,
            ttl: TtlConfig::default(),
        }
    }
}

impl Config {
    /// Load a YAML config file; missing fields take their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Override endpoints and secrets from the environment
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("DASHBOARD_REDIS_URL") {
            self.cache = CacheConfig::Redis { url };
        }
        if let Ok(key) = std::env::var("DASHBOARD_INDEXER_KEY") {
            self.indexer.api_key = key;
        }
        if let Some(port) = std::env::var("DASHBOARD_API_PORT")
            .ok()
            .and_then(|p| p.trim().parse::<u16>().ok())
        {
            self.api_port = port;
        }
        for network in self.networks.iter_mut() {
            if let Ok(url) = std::env::var(format!("DASHBOARD_RPC_{}", network.chain_id)) {
                network.rpc_url = url;
            }
        }
    }

    /// Check every configured address parses
    pub fn validate(&self) -> Result<()> {
        check_address("dola", &self.dola)?;
        check_address("treasury", &self.treasury)?;
        for fed in &self.feds {
            check_address(&fed.name, &fed.address)?;
        }
        for bond in &self.bonds {
            check_address(&format!("bond {}", bond.id), &bond.bond_contract)?;
        }
        for (field, value) in [
            ("interest_model", &self.interest_model),
            ("governance", &self.governance),
            ("inv", &self.inv),
        ] {
            if let Some(value) = value {
                check_address(field, value)?;
            }
        }
        Ok(())
    }

    pub fn network(&self, id: NetworkId) -> Result<&NetworkConfig> {
        self.networks
            .iter()
            .find(|n| n.chain_id == id)
            .ok_or(ConfigError::MissingNetwork(id.chain_id()))
    }

    /// Stablecoin address on the given network
    pub fn dola_on(&self, id: NetworkId) -> Option<&str> {
        if id == NetworkId::Mainnet {
            return Some(self.dola.as_str());
        }
        self.network(id).ok().and_then(|n| n.dola.as_deref())
    }

    /// Feds whose revenues are tracked, in address-book order
    pub fn feds_for_revenue(&self) -> Vec<FedConfig> {
        self.feds
            .iter()
            .filter(|fed| fed.chain_id == NetworkId::Mainnet)
            .cloned()
            .collect()
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

fn check_address(field: &str, value: &str) -> Result<()> {
    value
        .parse::<Address>()
        .map(|_| ())
        .map_err(|_| ConfigError::InvalidAddress {
            field: field.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ttl.revenues, 300);
        assert_eq!(config.ttl.interest_model, 900);
    }

    #[test]
    fn test_revenue_feds_are_mainnet_only() {
        let config = Config::default();
        let feds = config.feds_for_revenue();
        assert!(!feds.is_empty());
        assert!(feds.iter().all(|f| f.chain_id == NetworkId::Mainnet));
        assert!(feds.iter().all(|f| f.name != "Scream Fed"));
    }

    #[test]
    fn test_yaml_overrides_keep_defaults() {
        let yaml = r#"
api_port: 9000
cache:
  backend: redis
  url: redis://127.0.0.1/
feds:
  - chain_id: 250
    address: "0x4d7928e993125A9Cefe7ffa9aB637653654222E2"
    name: Scream Fed
    is_xchain: true
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.api_port, 9000);
        assert_eq!(
            config.cache,
            CacheConfig::Redis { url: "redis://127.0.0.1/".to_string() }
        );
        assert_eq!(config.feds.len(), 1);
        assert!(config.feds[0].is_xchain);
        assert_eq!(config.feds[0].chain_id, NetworkId::Fantom);
        assert_eq!(config.ttl.bonds, 60);
        assert!(config.feds_for_revenue().is_empty());
    }

    #[test]
    fn test_partial_blocks_keep_remaining_defaults() {
        let config: Config = serde_yaml::from_str("ttl:\n  bonds: 30\n").unwrap();
        assert_eq!(config.ttl.bonds, 30);
        assert_eq!(config.ttl.revenues, 300);
        assert_eq!(config.ttl.interest_model, 900);

        let config: Config = serde_yaml::from_str("indexer:\n  api_key: abc\n").unwrap();
        assert_eq!(config.indexer.api_key, "abc");
        assert_eq!(config.indexer.page_size, 1000);
        assert_eq!(config.indexer.base_url, "https://api.covalenthq.com/v1");

        let config: Config = serde_yaml::from_str("prices: {}\n").unwrap();
        assert_eq!(config.prices.base_url, "https://api.coingecko.com/api/v3");
    }

    #[test]
    fn test_bond_listing_keys_are_snake_case() {
        let yaml = r#"
bonds:
  - id: 4
    bond_contract: "0x007F7735baF391e207E3aA380bb53c4Bd9a5Fed6"
    input_token: DOLA
    input_decimals: 18
    underlying_cg_id: dola-usd
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.bonds[0].input_token, "DOLA");
        assert_eq!(config.bonds[0].underlying_cg_id.as_deref(), Some("dola-usd"));
    }

    #[test]
    fn test_invalid_address_rejected() {
        let mut config = Config::default();
        config.treasury = "not-an-address".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_dola_lookup_per_network() {
        let config = Config::default();
        assert_eq!(config.dola_on(NetworkId::Mainnet), Some(config.dola.as_str()));
        assert!(config.dola_on(NetworkId::Fantom).is_some());
        assert!(config.dola_on(NetworkId::Optimism).is_none());
    }

    #[test]
    fn test_unknown_chain_id_rejected() {
        assert!(NetworkId::try_from(56).is_err());
        assert_eq!(NetworkId::try_from(250), Ok(NetworkId::Fantom));
    }
}
