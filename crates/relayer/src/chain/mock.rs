//! A scripted node standing in for a real RPC endpoint in tests.

use core::time::Duration;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use ibc_proto::cosmos::auth::v1beta1::{BaseAccount, QueryAccountResponse};
use ibc_proto::cosmos::base::abci::v1beta1::GasInfo;
use ibc_proto::cosmos::tx::v1beta1::SimulateResponse;
use ibc_proto::google::protobuf::Any;
use prost::Message;
use tendermint::merkle::proof::ProofOps;
use tendermint::{Hash as TxHash, Time};

use crate::chain::cosmos::estimate::SIMULATE_PATH;
use crate::chain::cosmos::query::account::{ACCOUNT_QUERY_PATH, BASE_ACCOUNT_TYPE_URL};
use crate::chain::rpc::{
    tx_hash, AbciQueryResponse, BroadcastResponse, FetchedBlock, NodeStatus, RpcClient, TxResult,
};
use crate::error::{Error, INCORRECT_ACCOUNT_SEQUENCE_ERR};
use crate::event::{RpcEvent, Subscription, Unsubscribe};

pub const MOCK_RPC_ADDR: &str = "http://127.0.0.1:26657";

const GENESIS_TIME: i64 = 1_700_000_000;

pub fn block_time(height: u64) -> Time {
    Time::from_unix_timestamp(GENESIS_TIME + height as i64, 0).unwrap()
}

#[derive(Default)]
struct State {
    latest_height: u64,
    blocks: BTreeMap<u64, Vec<Vec<u8>>>,
    unknown_heights: BTreeSet<u64>,
    broken_heights: BTreeSet<u64>,
    flaky_heights: HashMap<u64, usize>,
    block_requests: HashMap<u64, usize>,

    abci: HashMap<(String, Vec<u8>), AbciQueryResponse>,
    abci_failures: BTreeSet<String>,
    abci_requests: Vec<(String, Vec<u8>, Option<u64>)>,

    check_tx_code: u32,
    check_tx_script: VecDeque<u32>,
    deliver_tx_code: u32,
    broadcast_fails: bool,
    include_txs: bool,
    broadcasts: Vec<Vec<u8>>,
    included: HashMap<TxHash, TxResult>,
    tx_query_failures: usize,
    tx_queries: usize,

    block_delay: Option<Duration>,
    blocks_in_flight: usize,
    peak_blocks_in_flight: usize,

    feeds: Vec<(String, UnboundedSender<Result<RpcEvent, Error>>)>,
    cancelled: Vec<String>,
}

/// A node whose answers are scripted by the test. Cloning shares the script.
#[derive(Clone, Default)]
pub struct MockRpc {
    state: Arc<Mutex<State>>,
}

impl MockRpc {
    pub fn new(latest_height: u64) -> Self {
        let rpc = Self::default();
        {
            let mut state = rpc.state();
            state.latest_height = latest_height;
            state.include_txs = true;
        }
        rpc
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn set_latest_height(&self, height: u64) {
        self.state().latest_height = height;
    }

    pub fn add_block(&self, height: u64, txs: Vec<Vec<u8>>) {
        self.state().blocks.insert(height, txs);
    }

    /// The node answers with "wrong ID" for this height on every attempt.
    pub fn set_unknown_height(&self, height: u64) {
        self.state().unknown_heights.insert(height);
    }

    pub fn clear_unknown_height(&self, height: u64) {
        self.state().unknown_heights.remove(&height);
    }

    /// Every fetch of this height fails with a transport error.
    pub fn set_broken_height(&self, height: u64) {
        self.state().broken_heights.insert(height);
    }

    /// The first `failures` fetches of this height fail with a transport error.
    pub fn set_flaky_height(&self, height: u64, failures: usize) {
        self.state().flaky_heights.insert(height, failures);
    }

    /// Every block fetch takes `delay` to answer.
    pub fn set_block_delay(&self, delay: Duration) {
        self.state().block_delay = Some(delay);
    }

    /// Highest number of block fetches that were ever served at once.
    pub fn peak_blocks_in_flight(&self) -> usize {
        self.state().peak_blocks_in_flight
    }

    pub fn block_requests(&self, height: u64) -> usize {
        self.state().block_requests.get(&height).copied().unwrap_or(0)
    }

    pub fn set_abci_response(&self, path: &str, data: &[u8], response: AbciQueryResponse) {
        self.state()
            .abci
            .insert((path.to_string(), data.to_vec()), response);
    }

    /// Answer queries to `path` with `value`, whatever the request data.
    pub fn set_abci_value(&self, path: &str, value: Vec<u8>) {
        self.set_abci_response(
            path,
            &[],
            AbciQueryResponse {
                code: 0,
                log: String::new(),
                value,
                proof: None,
                height: 0,
            },
        );
    }

    /// Queries to `path` fail with a transport error.
    pub fn fail_abci_path(&self, path: &str) {
        self.state().abci_failures.insert(path.to_string());
    }

    pub fn abci_requests(&self) -> Vec<(String, Vec<u8>, Option<u64>)> {
        self.state().abci_requests.clone()
    }

    pub fn set_account(&self, address: &str, number: u64, sequence: u64) {
        let account = BaseAccount {
            address: address.to_string(),
            pub_key: None,
            account_number: number,
            sequence,
        };

        let response = QueryAccountResponse {
            account: Some(Any {
                type_url: BASE_ACCOUNT_TYPE_URL.to_string(),
                value: account.encode_to_vec(),
            }),
        };

        self.set_abci_value(ACCOUNT_QUERY_PATH, response.encode_to_vec());
    }

    pub fn set_simulated_gas(&self, gas_used: u64) {
        let response = SimulateResponse {
            gas_info: Some(GasInfo {
                gas_wanted: 0,
                gas_used,
            }),
            result: None,
        };

        self.set_abci_value(SIMULATE_PATH, response.encode_to_vec());
    }

    pub fn reject_simulation(&self, code: u32, log: &str) {
        self.set_abci_response(
            SIMULATE_PATH,
            &[],
            AbciQueryResponse {
                code,
                log: log.to_string(),
                value: Vec::new(),
                proof: None,
                height: 0,
            },
        );
    }

    pub fn set_check_tx_code(&self, code: u32) {
        self.state().check_tx_code = code;
    }

    /// CheckTx answers the next broadcasts with these codes, in order, before
    /// falling back to the code set with `set_check_tx_code`.
    pub fn script_check_tx_codes(&self, codes: impl IntoIterator<Item = u32>) {
        self.state().check_tx_script.extend(codes);
    }

    pub fn set_deliver_tx_code(&self, code: u32) {
        self.state().deliver_tx_code = code;
    }

    pub fn set_broadcast_fails(&self, fails: bool) {
        self.state().broadcast_fails = fails;
    }

    /// Whether broadcast transactions ever make it into a block.
    pub fn set_include_txs(&self, include: bool) {
        self.state().include_txs = include;
    }

    /// The next `failures` transaction lookups fail with a transport error.
    pub fn fail_tx_queries(&self, failures: usize) {
        self.state().tx_query_failures = failures;
    }

    pub fn tx_queries(&self) -> usize {
        self.state().tx_queries
    }

    pub fn broadcasts(&self) -> Vec<Vec<u8>> {
        self.state().broadcasts.clone()
    }

    /// Pushes `event` to every live subscription for `query`.
    pub fn publish(&self, query: &str, event: RpcEvent) {
        let state = self.state();
        for (_, feed) in state.feeds.iter().filter(|(q, _)| q == query) {
            let _ = feed.unbounded_send(Ok(event.clone()));
        }
    }

    pub fn cancelled_subscriptions(&self) -> Vec<String> {
        self.state().cancelled.clone()
    }

    fn serve_block(&self, height: u64) -> Result<FetchedBlock, Error> {
        let mut state = self.state();
        *state.block_requests.entry(height).or_default() += 1;

        if state.unknown_heights.contains(&height) || height > state.latest_height {
            return Err(Error::unknown_height(height));
        }

        if state.broken_heights.contains(&height) {
            return Err(Self::transport_error("connection reset by peer"));
        }

        if let Some(failures) = state.flaky_heights.get_mut(&height) {
            if *failures > 0 {
                *failures -= 1;
                return Err(Self::transport_error("connection refused"));
            }
        }

        Ok(FetchedBlock {
            height,
            time: block_time(height),
            txs: state.blocks.get(&height).cloned().unwrap_or_default(),
        })
    }

    fn transport_error(reason: &str) -> Error {
        Error::rpc_transport(MOCK_RPC_ADDR.to_string(), reason.to_string())
    }
}

#[async_trait]
impl RpcClient for MockRpc {
    fn address(&self) -> String {
        MOCK_RPC_ADDR.to_string()
    }

    async fn status(&self) -> Result<NodeStatus, Error> {
        let latest_height = self.state().latest_height;

        Ok(NodeStatus {
            latest_height,
            latest_block_time: block_time(latest_height),
            catching_up: false,
        })
    }

    async fn block(&self, height: u64) -> Result<FetchedBlock, Error> {
        let delay = {
            let mut state = self.state();
            state.blocks_in_flight += 1;
            state.peak_blocks_in_flight = state.peak_blocks_in_flight.max(state.blocks_in_flight);
            state.block_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = self.serve_block(height);
        self.state().blocks_in_flight -= 1;
        result
    }

    async fn abci_query(
        &self,
        path: String,
        data: Vec<u8>,
        height: Option<u64>,
        _prove: bool,
    ) -> Result<AbciQueryResponse, Error> {
        let mut state = self.state();
        state
            .abci_requests
            .push((path.clone(), data.clone(), height));

        if state.abci_failures.contains(&path) {
            return Err(Self::transport_error("connection refused"));
        }

        let response = state
            .abci
            .get(&(path.clone(), data))
            .or_else(|| state.abci.get(&(path.clone(), Vec::new())))
            .cloned();

        Ok(response.unwrap_or_else(|| AbciQueryResponse {
            code: 6,
            log: format!("unknown query path {path}"),
            value: Vec::new(),
            proof: None,
            height: height.unwrap_or(state.latest_height),
        }))
    }

    async fn broadcast_tx_sync(&self, tx: Vec<u8>) -> Result<BroadcastResponse, Error> {
        let mut state = self.state();

        if state.broadcast_fails {
            return Err(Self::transport_error("broken pipe"));
        }

        let hash = tx_hash(&tx);
        state.broadcasts.push(tx);

        let code = match state.check_tx_script.pop_front() {
            Some(code) => code,
            None => state.check_tx_code,
        };
        if code == 0 && state.include_txs {
            let height = state.latest_height + 1;
            let deliver_code = state.deliver_tx_code;

            state.included.insert(
                hash,
                TxResult {
                    hash,
                    height,
                    code: deliver_code,
                    log: if deliver_code == 0 {
                        String::new()
                    } else {
                        "out of gas".to_string()
                    },
                    gas_wanted: 0,
                    gas_used: 0,
                },
            );
        }

        Ok(BroadcastResponse {
            code,
            log: match code {
                0 => "[]".to_string(),
                INCORRECT_ACCOUNT_SEQUENCE_ERR => "account sequence mismatch".to_string(),
                _ => "insufficient fee".to_string(),
            },
            hash,
        })
    }

    async fn tx_by_hash(&self, hash: TxHash) -> Result<Option<TxResult>, Error> {
        let mut state = self.state();
        state.tx_queries += 1;

        if state.tx_query_failures > 0 {
            state.tx_query_failures -= 1;
            return Err(Self::transport_error("connection refused"));
        }

        Ok(state.included.get(&hash).cloned())
    }

    async fn subscribe(&self, query: &str) -> Result<Subscription, Error> {
        let (tx, rx) = unbounded();
        self.state().feeds.push((query.to_string(), tx));

        let state = Arc::clone(&self.state);
        let cancelled = query.to_string();

        let unsubscribe = Unsubscribe::new(move || {
            let mut state = state.lock().unwrap();
            state.feeds.retain(|(q, _)| q != &cancelled);
            state.cancelled.push(cancelled);
        });

        Ok(Subscription::new(
            query.to_string(),
            Box::pin(rx),
            unsubscribe,
        ))
    }
}

/// A proof made of a single opaque operation.
pub fn proof_ops(data: Vec<u8>) -> ProofOps {
    ProofOps {
        ops: vec![tendermint::merkle::proof::ProofOp {
            field_type: "ics23:iavl".to_string(),
            key: Vec::new(),
            data,
        }],
    }
}
