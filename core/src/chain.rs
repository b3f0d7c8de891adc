//! The chain discriminant shared by every per-chain component.
//!
//! `Chain = EVM(EvmCfg) | BTC(BtcCfg)` dispatched by variant rather than by
//! subclass hierarchy. [`ChainTag`] is that discriminant with no attached
//! config, so it can
//! be used as a map key, a database column, and a `match` scrutinee alike;
//! the per-chain configuration lives in `bridge_signer::config`.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// A chain family: the shape of RPC access, address encoding, and finality
/// rule all branch on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainFamily {
    /// EVM-compatible chains reachable over JSON-RPC.
    Evm,
    /// Bitcoin and Bitcoin-compatible UTXO chains.
    Btc,
}

/// One of the chains this bridge observes and services.
///
/// Mirrors the original `ChainSymbol` enum (`zexporta/config.py`), which
/// hard-codes `POL`, `OPT`, `BSC` for production and `HOL`, `SEP`, `BST` for
/// development, plus a single Bitcoin network distinguished only by
/// mainnet/testnet parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainTag {
    /// Polygon PoS mainnet.
    Pol,
    /// Optimism mainnet.
    Opt,
    /// BNB Smart Chain mainnet.
    Bsc,
    /// Holesky testnet (Ethereum).
    Hol,
    /// Sepolia testnet (Ethereum).
    Sep,
    /// BNB Smart Chain testnet.
    Bst,
    /// Bitcoin mainnet.
    Btc,
    /// Bitcoin testnet4.
    BtcTest,
}

impl ChainTag {
    /// Which family this chain belongs to, used to dispatch to the right
    /// [`ChainClient`](crate::chain)/`AddressDeriver`/`WithdrawCoordinator`
    /// implementation.
    pub fn family(self) -> ChainFamily {
        match self {
            ChainTag::Pol | ChainTag::Opt | ChainTag::Bsc | ChainTag::Hol | ChainTag::Sep | ChainTag::Bst => {
                ChainFamily::Evm
            }
            ChainTag::Btc | ChainTag::BtcTest => ChainFamily::Btc,
        }
    }

    /// Whether this chain requires the `poa` (Clique / proof-of-authority)
    /// block header quirks handled by some EVM RPC clients. Matches the
    /// `poa` flag on the original's `EVMConfig`.
    pub fn is_poa(self) -> bool {
        matches!(self, ChainTag::Pol | ChainTag::Opt | ChainTag::Bsc | ChainTag::Sep | ChainTag::Bst)
    }
}

impl fmt::Debug for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainFamily::Evm => write!(f, "evm"),
            ChainFamily::Btc => write!(f, "btc"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_dispatch_matches_spec() {
        assert_eq!(ChainTag::Pol.family(), ChainFamily::Evm);
        assert_eq!(ChainTag::Opt.family(), ChainFamily::Evm);
        assert_eq!(ChainTag::Btc.family(), ChainFamily::Btc);
        assert_eq!(ChainTag::BtcTest.family(), ChainFamily::Btc);
    }

    #[test]
    fn display_round_trips_through_from_str() {
        use std::str::FromStr;
        for tag in [ChainTag::Pol, ChainTag::Btc, ChainTag::BtcTest] {
            let s = tag.to_string();
            assert_eq!(ChainTag::from_str(&s).unwrap(), tag);
        }
    }
}
