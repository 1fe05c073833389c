//! Network profile: which chain, node and contracts the client talks to.

use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use ethers::types::Address;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    fs,
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};

pub const MONAD_TESTNET_CHAIN_ID: u64 = 10143;
pub const MONAD_TESTNET_RPC_URL: &str = "https://testnet-rpc.monad.xyz";
const MONAD_TESTNET_USDC: &str = "0xf817257fed379853cDe0fa4F97AB987181B1E5Ea";
const MONAD_TESTNET_SLOT_MACHINE: &str = "0xe42682B8162C53BA089833b7ba8f843C05C6DE1E";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkProfile {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    pub token_address: Address,
    pub token_symbol: String,
    pub game_address: Address,
    #[serde(default = "default_refresh_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_receipt_poll_ms")]
    pub receipt_poll_ms: u64,
}

fn default_refresh_secs() -> u64 {
    10
}

fn default_receipt_poll_ms() -> u64 {
    1_000
}

impl NetworkProfile {
    pub fn monad_testnet() -> Result<Self> {
        Ok(Self {
            name: "Monad Testnet".to_string(),
            chain_id: MONAD_TESTNET_CHAIN_ID,
            rpc_url: MONAD_TESTNET_RPC_URL.to_string(),
            token_address: parse_address(MONAD_TESTNET_USDC)?,
            token_symbol: "USDC".to_string(),
            game_address: parse_address(MONAD_TESTNET_SLOT_MACHINE)?,
            refresh_interval_secs: default_refresh_secs(),
            receipt_poll_ms: default_receipt_poll_ms(),
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = expand(path.as_ref());
        let data = fs::read(&path)
            .wrap_err_with(|| format!("Failed to read network profile {}", path.display()))?;
        let profile = serde_json::from_slice::<NetworkProfile>(&data)
            .wrap_err("Failed to parse network profile JSON")?;
        profile.check()?;
        Ok(profile)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = expand(path.as_ref());
        let parent = path.parent().filter(|dir| !dir.as_os_str().is_empty());
        if let Some(parent) = parent.filter(|dir| !dir.exists()) {
            fs::create_dir_all(parent).wrap_err_with(|| {
                format!("Failed to create profile directory {}", parent.display())
            })?;
        }
        let json =
            serde_json::to_vec_pretty(self).wrap_err("Failed to serialize network profile")?;
        fs::write(&path, json).wrap_err("Failed to write network profile")?;
        Ok(path)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn receipt_poll(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_ms)
    }

    fn check(&self) -> Result<()> {
        if self.rpc_url.trim().is_empty() {
            return Err(eyre!("Network profile '{}' has no RPC URL", self.name));
        }
        if self.refresh_interval_secs == 0 || self.receipt_poll_ms == 0 {
            return Err(eyre!(
                "Network profile '{}' needs non-zero polling intervals",
                self.name
            ));
        }
        Ok(())
    }
}

impl fmt::Display for NetworkProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (chain {})", self.name, self.chain_id)
    }
}

fn parse_address(raw: &str) -> Result<Address> {
    raw.parse::<Address>()
        .map_err(|err| eyre!("Invalid address {raw}: {err}"))
}

fn expand(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}
