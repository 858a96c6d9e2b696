//! Client of a Cosmos SDK chain reached through a Tendermint node.

use core::time::Duration;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use once_cell::sync::OnceCell;
use tendermint::Hash as TxHash;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::chain::cosmos::query::account::query_account;
use crate::chain::cosmos::retry::retry_transient;
use crate::chain::cosmos::types::account::Account;
use crate::chain::rpc::node::TendermintRpc;
use crate::chain::rpc::{NodeStatus, RpcClient, TxResult};
use crate::config::{ChainEndpoint, GasPrice};
use crate::error::Error;
use crate::event::{queries, ListenOptions, Listener, Subscription};
use crate::keyring::errors::Error as KeyringError;
use crate::keyring::{create_mnemonic, CoinType, KeyRing, Store};
use crate::light_client::LightProvider;
use crate::namespace::AddressNamespace;
use crate::types::identifier::ChainId;
use crate::types::path::PathEnd;
use crate::util::retry::RetryPolicy;

pub mod encode;
pub mod estimate;
pub mod gas;
pub mod proof;
pub mod query;
pub mod retry;
pub mod tx;
pub mod types;
pub mod upgrade;
pub mod validate;
pub mod wait;

#[cfg(test)]
pub mod test_utils;

/// Below this height the node is not considered ready for bulk work.
pub const MIN_READY_HEIGHT: u64 = 3;

/// Runtime handle bound to one chain endpoint.
///
/// A client is either fully initialized or not constructed at all: every
/// field is validated and every connection built in [`ChainClient::init`].
pub struct ChainClient {
    config: ChainEndpoint,
    home: PathBuf,
    rpc: Arc<dyn RpcClient>,
    keybase: KeyRing,
    light_provider: LightProvider,
    namespace: Arc<AddressNamespace>,
    gas_prices: Vec<GasPrice>,
    timeout: Duration,
    debug: bool,
    retry: RetryPolicy,

    /// Signing address, resolved on first use.
    address: OnceCell<String>,

    /// Signing account, cached between transactions.
    account: Mutex<Option<Account>>,

    path_end: Option<PathEnd>,
}

impl ChainClient {
    /// Validates `config`, connects to its node over JSON-RPC and opens the
    /// on-disk key store under `home`.
    pub fn init(
        config: ChainEndpoint,
        home: &Path,
        timeout: Duration,
        debug: bool,
        namespace: Arc<AddressNamespace>,
    ) -> Result<Self, Error> {
        let rpc = TendermintRpc::new(config.rpc_addr.clone(), timeout)?;

        Self::init_with(
            config,
            home,
            timeout,
            debug,
            namespace,
            Arc::new(rpc),
            Store::Test,
        )
    }

    /// Same as [`ChainClient::init`], over an already built RPC client and
    /// key store backend.
    pub fn init_with(
        config: ChainEndpoint,
        home: &Path,
        timeout: Duration,
        debug: bool,
        namespace: Arc<AddressNamespace>,
        rpc: Arc<dyn RpcClient>,
        store: Store,
    ) -> Result<Self, Error> {
        config.validate().map_err(Error::config)?;

        let trusting_period = config.parse_trusting_period().map_err(Error::config)?;
        let gas_prices = config.parse_gas_prices().map_err(Error::config)?;

        let light_provider = LightProvider::new(
            config.chain_id.clone(),
            config.rpc_addr.clone(),
            trusting_period,
        );

        let keybase = KeyRing::new(store, home, &config.chain_id).map_err(Error::key_base)?;

        debug!(chain = %config.chain_id, rpc = %rpc.address(), "chain client initialized");

        Ok(Self {
            config,
            home: home.to_path_buf(),
            rpc,
            keybase,
            light_provider,
            namespace,
            gas_prices,
            timeout,
            debug,
            retry: RetryPolicy::default(),
            address: OnceCell::new(),
            account: Mutex::new(None),
            path_end: None,
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn chain_id(&self) -> &ChainId {
        &self.config.chain_id
    }

    pub fn endpoint(&self) -> &ChainEndpoint {
        &self.config
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn rpc(&self) -> &Arc<dyn RpcClient> {
        &self.rpc
    }

    pub fn namespace(&self) -> &Arc<AddressNamespace> {
        &self.namespace
    }

    pub fn light_provider(&self) -> &LightProvider {
        &self.light_provider
    }

    pub fn keybase(&self) -> &KeyRing {
        &self.keybase
    }

    /// The revision number encoded in the chain identifier.
    pub fn self_version(&self) -> u64 {
        self.config.chain_id.version()
    }

    pub fn trusting_period(&self) -> Duration {
        self.light_provider.trusting_period()
    }

    pub fn key_exists(&self, name: &str) -> bool {
        self.keybase.key_exists(name)
    }

    pub fn set_path_end(&mut self, path_end: PathEnd) {
        self.path_end = Some(path_end);
    }

    pub fn path_end(&self) -> Result<&PathEnd, Error> {
        self.path_end
            .as_ref()
            .ok_or_else(|| Error::missing_path_end(self.config.chain_id.clone()))
    }

    /// Creates the configured key from a fresh mnemonic, which is returned.
    /// Fails if the key already exists.
    pub fn create_test_key(&mut self) -> Result<String, Error> {
        let name = self.config.key.clone();

        if self.keybase.key_exists(&name) {
            return Err(Error::key_base(KeyringError::existing_key(name)));
        }

        let mnemonic = create_mnemonic();
        self.keybase
            .add_key_from_mnemonic(&name, &mnemonic, CoinType::ATOM)
            .map_err(Error::key_base)?;

        info!(chain = %self.config.chain_id, key = %name, "created key");

        Ok(mnemonic)
    }

    pub async fn query_latest_height(&self) -> Result<u64, Error> {
        let status = retry_transient(&self.retry, "status query", || self.rpc.status()).await?;
        Ok(status.latest_height)
    }

    /// Fails unless the node has produced at least [`MIN_READY_HEIGHT`] blocks.
    pub async fn status(&self) -> Result<NodeStatus, Error> {
        let status = retry_transient(&self.retry, "status query", || self.rpc.status()).await?;

        if status.latest_height < MIN_READY_HEIGHT {
            return Err(Error::chain_not_ready(
                self.config.chain_id.clone(),
                status.latest_height,
            ));
        }

        if status.catching_up {
            warn!(chain = %self.config.chain_id, "node is still catching up");
        }

        if !self
            .light_provider
            .is_within_trusting_period(status.latest_block_time, SystemTime::now())
        {
            warn!(
                chain = %self.config.chain_id,
                latest_block_time = %status.latest_block_time,
                "latest block is older than the trusting period",
            );
        }

        Ok(status)
    }

    /// The bech32 address of the configured key, encoded under this chain's
    /// prefixes. Resolved once, then served from cache.
    pub fn get_address(&self) -> Result<String, Error> {
        self.address
            .get_or_try_init(|| {
                let key = self
                    .keybase
                    .get_key(&self.config.key)
                    .map_err(Error::key_base)?;

                self.namespace
                    .with_chain(&self.config.account_prefix, |ctx| {
                        ctx.encode_account(&key.address)
                    })
            })
            .cloned()
    }

    pub async fn query_account(&self) -> Result<Account, Error> {
        let address = self.get_address()?;
        let account = query_account(self.rpc.as_ref(), &self.retry, &address).await?;
        Ok(account.into())
    }

    pub async fn query_tx(&self, hash: TxHash) -> Result<Option<TxResult>, Error> {
        retry_transient(&self.retry, "tx query", || self.rpc.tx_by_hash(hash)).await
    }

    pub async fn subscribe(&self, query: &str) -> Result<Subscription, Error> {
        self.rpc.subscribe(query).await
    }

    /// Starts rendering the transaction and block events of the chain as JSON
    /// lines on the returned receiver until the listener is stopped.
    pub async fn listen(
        &self,
        options: ListenOptions,
    ) -> Result<(Listener, mpsc::UnboundedReceiver<String>), Error> {
        let tx_events = self.subscribe(queries::TX).await?;
        let block_events = self.subscribe(queries::NEW_BLOCK).await?;

        Ok(Listener::spawn(
            self.config.chain_id.clone(),
            tx_events,
            block_events,
            options,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::chain::cosmos::test_utils::{test_client, test_endpoint, KEY_NAME};
    use crate::chain::mock::MockRpc;
    use crate::event::RpcEvent;

    #[tokio::test]
    async fn init_rejects_invalid_endpoint() {
        let mut config = test_endpoint();
        config.trusting_period = "two weeks".to_string();

        let result = ChainClient::init_with(
            config,
            Path::new("."),
            Duration::from_secs(1),
            false,
            Arc::new(AddressNamespace::new()),
            Arc::new(MockRpc::new(10)),
            Store::Memory,
        );
        assert!(result.is_err());

        let mut config = test_endpoint();
        config.gas_prices = "0.1".to_string();

        let result = ChainClient::init(
            config,
            Path::new("."),
            Duration::from_secs(1),
            false,
            Arc::new(AddressNamespace::new()),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn accessors_reflect_endpoint() {
        let mut config = test_endpoint();
        config.chain_id = ChainId::from("cosmoshub-4");

        let client = ChainClient::init_with(
            config,
            Path::new("."),
            Duration::from_secs(7),
            true,
            Arc::new(AddressNamespace::new()),
            Arc::new(MockRpc::new(10)),
            Store::Memory,
        )
        .unwrap();

        assert_eq!(client.self_version(), 4);
        assert_eq!(client.trusting_period(), Duration::from_secs(336 * 3600));
        assert_eq!(client.timeout(), Duration::from_secs(7));
        assert!(client.debug());
        assert!(client.path_end().is_err());
    }

    #[tokio::test]
    async fn status_requires_three_blocks() {
        let rpc = MockRpc::new(2);
        let client = test_client(rpc.clone());

        assert!(client.status().await.is_err());

        rpc.set_latest_height(3);
        assert_eq!(client.status().await.unwrap().latest_height, 3);
        assert_eq!(client.query_latest_height().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn address_is_resolved_once_under_chain_prefix() {
        let client = test_client(MockRpc::new(10));

        let address = client.get_address().unwrap();
        assert!(address.starts_with("cosmos1"));
        assert_eq!(client.get_address().unwrap(), address);

        let key = client.keybase().get_key(KEY_NAME).unwrap();
        let decoded = client
            .namespace()
            .with_chain("cosmos", |ctx| ctx.decode_account(&address))
            .unwrap();
        assert_eq!(decoded, key.address);
    }

    #[tokio::test]
    async fn create_test_key_refuses_existing_key() {
        let mut client = test_client(MockRpc::new(10));
        assert!(client.key_exists(KEY_NAME));
        assert!(client.create_test_key().is_err());

        let mut config = test_endpoint();
        config.key = "fresh".to_string();

        let mut client = ChainClient::init_with(
            config,
            Path::new("."),
            Duration::from_secs(1),
            false,
            Arc::new(AddressNamespace::new()),
            Arc::new(MockRpc::new(10)),
            Store::Memory,
        )
        .unwrap();

        assert!(client.get_address().is_err());

        let mnemonic = client.create_test_key().unwrap();
        assert_eq!(mnemonic.split_whitespace().count(), 24);
        assert!(client.key_exists("fresh"));
        assert!(client.get_address().unwrap().starts_with("cosmos1"));
    }

    #[tokio::test]
    async fn listen_releases_both_subscriptions() {
        let rpc = MockRpc::new(10);
        let client = test_client(rpc.clone());

        let (listener, mut lines) = client.listen(ListenOptions::default()).await.unwrap();

        rpc.publish(
            queries::NEW_BLOCK,
            RpcEvent {
                query: queries::NEW_BLOCK.to_string(),
                data: "NewBlock".to_string(),
                events: BTreeMap::from([("block.height".to_string(), vec!["11".to_string()])]),
            },
        );

        assert_eq!(lines.recv().await.unwrap(), r#"{"block.height":["11"]}"#);

        listener.stop().await.unwrap();

        let mut cancelled = rpc.cancelled_subscriptions();
        cancelled.sort();
        assert_eq!(cancelled, vec![queries::NEW_BLOCK, queries::TX]);
    }
}
