use core::time::Duration;
use std::path::Path;
use std::sync::Arc;

use crate::chain::cosmos::ChainClient;
use crate::chain::mock::{MockRpc, MOCK_RPC_ADDR};
use crate::config::ChainEndpoint;
use crate::keyring::{CoinType, KeyEntry, Store};
use crate::namespace::AddressNamespace;
use crate::types::identifier::ChainId;
use crate::util::retry::RetryPolicy;

pub const KEY_NAME: &str = "relayer";

pub const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon art";

pub fn test_endpoint() -> ChainEndpoint {
    ChainEndpoint {
        key: KEY_NAME.to_string(),
        chain_id: ChainId::from("ibc-0"),
        rpc_addr: MOCK_RPC_ADDR.parse().unwrap(),
        account_prefix: "cosmos".to_string(),
        gas_adjustment: 1.5,
        gas_prices: "0.25stake".to_string(),
        trusting_period: "336h".to_string(),
    }
}

/// A client over `rpc` holding the relayer key in memory, with fast retries.
pub fn test_client(rpc: MockRpc) -> ChainClient {
    test_client_with(test_endpoint(), rpc, Arc::new(AddressNamespace::new()))
}

pub fn test_client_with(
    config: ChainEndpoint,
    rpc: MockRpc,
    namespace: Arc<AddressNamespace>,
) -> ChainClient {
    let mut client = ChainClient::init_with(
        config,
        Path::new("."),
        Duration::from_secs(5),
        false,
        namespace,
        Arc::new(rpc),
        Store::Memory,
    )
    .unwrap()
    .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(1)));

    let key = KeyEntry::from_mnemonic(KEY_NAME, MNEMONIC, CoinType::ATOM).unwrap();
    client.keybase.add_key(key).unwrap();

    client
}
