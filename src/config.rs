//! Helper Configuration
//!
//! RPC endpoints, network selection and fee settings. Supports loading from
//! environment variables with the CKB_GIT_ prefix; binaries load a `.env`
//! file first via dotenvy.

use serde::{Deserialize, Serialize};
use std::env;

use crate::error::{HelperError, HelperResult};
use crate::types::{decode_hex32, CellDep, DepType, OutPoint};

/// CKB network type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// CKB mainnet (Lina)
    Mainnet,
    /// CKB testnet (Pudge)
    Testnet,
    /// Local development chain
    Dev,
}

impl Default for Network {
    fn default() -> Self {
        Self::Mainnet
    }
}

impl Network {
    /// Parse from string (for environment variables)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" | "lina" => Some(Self::Mainnet),
            "testnet" | "test" | "pudge" => Some(Self::Testnet),
            "dev" | "devnet" | "regtest" => Some(Self::Dev),
            _ => None,
        }
    }

    /// Out-point of the secp256k1 dep group cell, where known.
    ///
    /// Dev chains place the dep group in their own genesis, so it has to come
    /// from the environment instead.
    pub fn secp_dep_group(&self) -> Option<(&'static str, u32)> {
        match self {
            Network::Mainnet => Some((
                "0x71a7ba8fc96349fea0ed3a5c47992e3b4084b031a42264a018e0072e8172e46c",
                0,
            )),
            Network::Testnet => Some((
                "0xf8de3bb47d055cdf460d93a2a6e1b05f7432f9777c8c474abf4eec1d4aee5d37",
                0,
            )),
            Network::Dev => None,
        }
    }
}

/// CKB RPC endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CkbRpcConfig {
    /// Node RPC endpoint URL
    pub node_url: String,
    /// Indexer RPC endpoint URL (same as the node for embedded indexers)
    pub indexer_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

impl Default for CkbRpcConfig {
    fn default() -> Self {
        Self {
            node_url: "http://127.0.0.1:8114".to_string(),
            indexer_url: "http://127.0.0.1:8114".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Helper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelperConfig {
    /// RPC endpoints
    pub rpc: CkbRpcConfig,
    /// Network type
    pub network: Network,
    /// Flat transaction fee in shannons
    #[serde(default = "default_fee")]
    pub fee_shannons: u64,
    /// Override for the secp256k1 dep group out-point (required on dev chains)
    #[serde(default)]
    pub lock_dep: Option<LockDepConfig>,
    /// Signer command (ckb-cli compatible)
    #[serde(default = "default_signer_bin")]
    pub signer_bin: String,
}

/// Out-point of the lock script dep group, as configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockDepConfig {
    pub tx_hash: String,
    pub index: u32,
}

fn default_fee() -> u64 {
    // TODO: replace the flat fee with feerate estimation via the node
    1_000_000 // 0.01 CKB
}

fn default_signer_bin() -> String {
    "ckb-cli".to_string()
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            rpc: CkbRpcConfig::default(),
            network: Network::Mainnet,
            fee_shannons: default_fee(),
            lock_dep: None,
            signer_bin: default_signer_bin(),
        }
    }
}

impl HelperConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - CKB_GIT_RPC_URL: node RPC endpoint URL
    /// - CKB_GIT_INDEXER_URL: indexer RPC endpoint URL (defaults to the node)
    /// - CKB_GIT_NETWORK: network type (mainnet/testnet/dev)
    /// - CKB_GIT_FEE: flat fee in shannons
    /// - CKB_GIT_LOCK_DEP_TX_HASH / CKB_GIT_LOCK_DEP_INDEX: dep group override
    /// - CKB_GIT_SIGNER: signer command
    pub fn from_env() -> Self {
        let network = env::var("CKB_GIT_NETWORK")
            .ok()
            .and_then(|s| Network::from_str(&s))
            .unwrap_or(Network::Testnet);

        let node_url =
            env::var("CKB_GIT_RPC_URL").unwrap_or_else(|_| "http://127.0.0.1:8114".to_string());
        let indexer_url = env::var("CKB_GIT_INDEXER_URL").unwrap_or_else(|_| node_url.clone());

        let lock_dep = env::var("CKB_GIT_LOCK_DEP_TX_HASH").ok().map(|tx_hash| {
            LockDepConfig {
                tx_hash,
                index: env::var("CKB_GIT_LOCK_DEP_INDEX")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
            }
        });

        Self {
            rpc: CkbRpcConfig {
                node_url,
                indexer_url,
                timeout_secs: env::var("CKB_GIT_RPC_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            },
            network,
            fee_shannons: env::var("CKB_GIT_FEE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_fee),
            lock_dep,
            signer_bin: env::var("CKB_GIT_SIGNER").unwrap_or_else(|_| default_signer_bin()),
        }
    }

    /// Create a testnet (Pudge) configuration
    pub fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            ..Self::default()
        }
    }

    /// Create a development configuration (local dev chain)
    pub fn development() -> Self {
        Self {
            rpc: CkbRpcConfig::default(),
            network: Network::Dev,
            fee_shannons: default_fee(),
            lock_dep: None,
            signer_bin: default_signer_bin(),
        }
    }

    /// Resolve the cell dep unlocking the owner's inputs.
    ///
    /// The explicit override wins; otherwise the network's well-known secp
    /// dep group is used. Dev chains without an override are a configuration
    /// error.
    pub fn lock_dep(&self) -> HelperResult<CellDep> {
        let (tx_hash, index) = match &self.lock_dep {
            Some(dep) => (dep.tx_hash.clone(), dep.index),
            None => {
                let (tx_hash, index) = self.network.secp_dep_group().ok_or_else(|| {
                    HelperError::Configuration(
                        "dev network requires CKB_GIT_LOCK_DEP_TX_HASH".to_string(),
                    )
                })?;
                (tx_hash.to_string(), index)
            }
        };
        Ok(CellDep {
            out_point: OutPoint {
                tx_hash: decode_hex32(&tx_hash)?,
                index,
            },
            dep_type: DepType::DepGroup,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_parsing() {
        assert_eq!(Network::from_str("mainnet"), Some(Network::Mainnet));
        assert_eq!(Network::from_str("Pudge"), Some(Network::Testnet));
        assert_eq!(Network::from_str("dev"), Some(Network::Dev));
        assert_eq!(Network::from_str("banana"), None);
    }

    #[test]
    fn test_default_config() {
        let config = HelperConfig::default();
        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.fee_shannons, 1_000_000);
        assert_eq!(config.rpc.node_url, "http://127.0.0.1:8114");
    }

    #[test]
    fn test_from_env_signer_override() {
        env::set_var("CKB_GIT_SIGNER", "/opt/ckb/bin/ckb-cli");
        let config = HelperConfig::from_env();
        env::remove_var("CKB_GIT_SIGNER");
        assert_eq!(config.signer_bin, "/opt/ckb/bin/ckb-cli");

        assert_eq!(HelperConfig::from_env().signer_bin, "ckb-cli");
    }

    #[test]
    fn test_lock_dep_resolution() {
        let config = HelperConfig::default();
        let dep = config.lock_dep().unwrap();
        assert_eq!(dep.dep_type, DepType::DepGroup);
        assert_eq!(dep.out_point.index, 0);

        // Dev without an override is an error
        let dev = HelperConfig::development();
        assert!(dev.lock_dep().is_err());

        // Explicit override wins
        let mut dev = HelperConfig::development();
        dev.lock_dep = Some(LockDepConfig {
            tx_hash: format!("0x{}", "ab".repeat(32)),
            index: 1,
        });
        let dep = dev.lock_dep().unwrap();
        assert_eq!(dep.out_point.index, 1);
        assert_eq!(dep.out_point.tx_hash, [0xab; 32]);
    }
}
