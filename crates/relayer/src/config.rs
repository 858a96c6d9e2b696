//! Relayer client configuration

pub mod error;

use core::{
    fmt::{Display, Error as FmtError, Formatter},
    str::FromStr,
    time::Duration,
};
use std::{
    fs,
    fs::File,
    io::Write,
    path::Path,
};

use serde::{Deserialize, Serialize};
use tendermint_rpc::Url;

use crate::types::identifier::ChainId;

pub use error::Error;

/// Keys accepted by [`ChainEndpoint::update`].
pub const UPDATABLE_FIELDS: [&str; 7] = [
    "key",
    "chain-id",
    "rpc-addr",
    "gas-adjustment",
    "gas-prices",
    "account-prefix",
    "trusting-period",
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GasPrice {
    pub price: f64,
    pub denom: String,
}

impl GasPrice {
    pub const fn new(price: f64, denom: String) -> Self {
        Self { price, denom }
    }
}

impl Display for GasPrice {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{}{}", self.price, self.denom)
    }
}

impl FromStr for GasPrice {
    type Err = Error;

    fn from_str(price_in: &str) -> Result<Self, Self::Err> {
        let price_in = price_in.trim();

        // The denomination starts at the first alphabetic character.
        let spos = price_in.find(char::is_alphabetic);

        match spos {
            Some(position) if position > 0 => {
                let (price_str, denom) = price_in.split_at(position);

                let price = price_str
                    .parse::<f64>()
                    .map_err(|_| Error::invalid_gas_price(price_in.to_string()))?;

                if !price.is_finite() || price < 0.0 || !is_valid_denom(denom) {
                    return Err(Error::invalid_gas_price(price_in.to_string()));
                }

                Ok(GasPrice {
                    price,
                    denom: denom.to_owned(),
                })
            }

            _ => Err(Error::invalid_gas_price(price_in.to_string())),
        }
    }
}

fn is_valid_denom(denom: &str) -> bool {
    let mut chars = denom.chars();

    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && (3..=128).contains(&denom.len())
        && chars.all(|c| c.is_ascii_alphanumeric() || "/:._-".contains(c))
}

/// Parses a comma-separated list of decimal coins such as `0.025uatom,0.1stake`.
///
/// An empty string is a valid, empty list. Any malformed entry fails the
/// whole list.
pub fn parse_gas_prices(prices: &str) -> Result<Vec<GasPrice>, Error> {
    if prices.trim().is_empty() {
        return Ok(Vec::new());
    }

    prices.split(',').map(GasPrice::from_str).collect()
}

/// Defaults for various fields
pub mod default {
    use super::*;

    pub fn rpc_timeout() -> Duration {
        Duration::from_secs(10)
    }

    pub fn gas_adjustment() -> f64 {
        1.5
    }

    pub fn trusting_period() -> String {
        "336h".to_string()
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    #[serde(default = "default::rpc_timeout", with = "humantime_serde")]
    pub rpc_timeout: Duration,
    #[serde(default)]
    pub log_level: LogLevel,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            rpc_timeout: default::rpc_timeout(),
            log_level: LogLevel::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default = "Vec::new", skip_serializing_if = "Vec::is_empty")]
    pub chains: Vec<ChainEndpoint>,
}

impl Config {
    pub fn has_chain(&self, id: &ChainId) -> bool {
        self.chains.iter().any(|c| c.chain_id == *id)
    }

    pub fn find_chain(&self, id: &ChainId) -> Option<&ChainEndpoint> {
        self.chains.iter().find(|c| c.chain_id == *id)
    }

    pub fn find_chain_mut(&mut self, id: &ChainId) -> Option<&mut ChainEndpoint> {
        self.chains.iter_mut().find(|c| c.chain_id == *id)
    }

    /// Looks up every requested chain, failing on the first one that is not configured.
    pub fn find_chains<'a>(
        &'a self,
        ids: impl IntoIterator<Item = &'a ChainId>,
    ) -> Result<Vec<&'a ChainEndpoint>, Error> {
        ids.into_iter()
            .map(|id| {
                self.find_chain(id)
                    .ok_or_else(|| Error::missing_chain_config(id.to_string()))
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.chains.iter().try_for_each(ChainEndpoint::validate)
    }
}

/// Identity and connection facts of one chain.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ChainEndpoint {
    pub key: String,
    pub chain_id: ChainId,
    pub rpc_addr: Url,
    pub account_prefix: String,
    #[serde(default = "default::gas_adjustment")]
    pub gas_adjustment: f64,
    #[serde(default)]
    pub gas_prices: String,
    #[serde(default = "default::trusting_period")]
    pub trusting_period: String,
}

impl ChainEndpoint {
    pub fn validate(&self) -> Result<(), Error> {
        validate_chain_id(self.chain_id.as_str())?;
        self.parse_trusting_period()?;
        parse_gas_prices(&self.gas_prices)?;
        validate_gas_adjustment(self.gas_adjustment)?;

        if self.account_prefix.is_empty() {
            return Err(Error::empty_account_prefix(self.chain_id.to_string()));
        }

        Ok(())
    }

    /// Replaces the field named `key` with `value` once `value` has been
    /// validated. On error the endpoint is left untouched.
    pub fn update(&mut self, key: &str, value: &str) -> Result<(), Error> {
        match key {
            "key" => self.key = value.to_string(),
            "chain-id" => self.chain_id = validate_chain_id(value)?,
            "rpc-addr" => {
                self.rpc_addr = value
                    .parse()
                    .map_err(|_| Error::invalid_rpc_addr(value.to_string()))?
            }
            "gas-adjustment" => {
                let adjustment = value
                    .parse::<f64>()
                    .map_err(|_| Error::invalid_gas_adjustment(value.to_string()))?;
                self.gas_adjustment = validate_gas_adjustment(adjustment)?;
            }
            "gas-prices" => {
                parse_gas_prices(value)?;
                self.gas_prices = value.to_string();
            }
            "account-prefix" => {
                if value.is_empty() {
                    return Err(Error::empty_account_prefix(self.chain_id.to_string()));
                }
                self.account_prefix = value.to_string();
            }
            "trusting-period" => {
                humantime::parse_duration(value).map_err(|e| {
                    Error::invalid_trusting_period(value.to_string(), self.chain_id.to_string(), e)
                })?;
                self.trusting_period = value.to_string();
            }
            _ => return Err(Error::unknown_field(key.to_string())),
        }

        Ok(())
    }

    pub fn parse_trusting_period(&self) -> Result<Duration, Error> {
        humantime::parse_duration(&self.trusting_period).map_err(|e| {
            Error::invalid_trusting_period(
                self.trusting_period.clone(),
                self.chain_id.to_string(),
                e,
            )
        })
    }

    pub fn parse_gas_prices(&self) -> Result<Vec<GasPrice>, Error> {
        parse_gas_prices(&self.gas_prices)
    }

    pub fn rpc_port(&self) -> u16 {
        self.rpc_addr.port()
    }
}

fn validate_chain_id(value: &str) -> Result<ChainId, Error> {
    value
        .parse()
        .map_err(|_| Error::invalid_chain_id(value.to_string()))
}

fn validate_gas_adjustment(adjustment: f64) -> Result<f64, Error> {
    if adjustment.is_finite() && adjustment > 0.0 {
        Ok(adjustment)
    } else {
        Err(Error::invalid_gas_adjustment(adjustment.to_string()))
    }
}

/// Attempt to load and parse the TOML config file as a `Config`.
pub fn load(path: impl AsRef<Path>) -> Result<Config, Error> {
    let config_toml = std::fs::read_to_string(&path).map_err(Error::io)?;

    let config = toml::from_str::<Config>(&config_toml[..]).map_err(Error::decode)?;

    Ok(config)
}

/// Serialize the given `Config` as TOML to the given config file.
pub fn store(config: &Config, path: impl AsRef<Path>) -> Result<(), Error> {
    let mut file = if path.as_ref().exists() {
        fs::OpenOptions::new().write(true).truncate(true).open(path)
    } else {
        File::create(path)
    }
    .map_err(Error::io)?;

    store_writer(config, &mut file)
}

/// Serialize the given `Config` as TOML to the given writer.
pub fn store_writer(config: &Config, mut writer: impl Write) -> Result<(), Error> {
    let toml_config = toml::to_string_pretty(&config).map_err(Error::encode)?;

    writeln!(writer, "{toml_config}").map_err(Error::io)?;

    Ok(())
}
