use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::chain::cosmos::encode::decode_tx_raw;
use crate::chain::cosmos::ChainClient;
use crate::chain::rpc::{tx_hash, FetchedBlock, RpcClient};
use crate::error::Error;
use crate::etl::message::DecodedMessage;
use crate::etl::sink::{PacketRow, Sink, TransferRow, TxRow};
use crate::namespace::AddressNamespace;
use crate::types::identifier::ChainId;
use crate::util::retry::{RetryPolicy, RetryResult};

/// Upper bound on block fetches in flight at once.
pub const MAX_CONCURRENT_FETCHES: usize = 100;

/// Passes over heights the node did not know about before giving up on them.
pub const DEFAULT_MAX_PASSES: usize = 10;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScanOptions {
    pub concurrency: usize,
    pub max_passes: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            concurrency: MAX_CONCURRENT_FETCHES,
            max_passes: DEFAULT_MAX_PASSES,
        }
    }
}

/// Summary of a completed scan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Number of passes run, the first one included.
    pub passes: usize,

    /// Blocks fetched and processed.
    pub scanned: usize,

    /// Heights abandoned after a non-recoverable fetch failure.
    pub dropped: Vec<u64>,

    /// Heights the node still did not know about after the last pass.
    pub unresolved: Vec<u64>,
}

impl ScanReport {
    pub fn is_complete(&self) -> bool {
        self.dropped.is_empty() && self.unresolved.is_empty()
    }
}

/// What became of one height within a pass.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum HeightOutcome {
    Scanned,
    Deferred(u64),
    Dropped(u64),
}

/// Everything a fetch task needs, shared by all tasks of a scan.
struct ScanContext {
    chain_id: ChainId,
    account_prefix: String,
    rpc: Arc<dyn RpcClient>,
    namespace: Arc<AddressNamespace>,
    retry: RetryPolicy,
    sink: Arc<dyn Sink>,
}

/// Loads the IBC activity of a range of blocks into a [`Sink`].
pub struct BlockScanner {
    context: Arc<ScanContext>,
    options: ScanOptions,
}

impl BlockScanner {
    pub fn new(client: &ChainClient, sink: Arc<dyn Sink>) -> Self {
        let context = ScanContext {
            chain_id: client.chain_id().clone(),
            account_prefix: client.endpoint().account_prefix.clone(),
            rpc: Arc::clone(client.rpc()),
            namespace: Arc::clone(client.namespace()),
            retry: *client.retry_policy(),
            sink,
        };

        Self {
            context: Arc::new(context),
            options: ScanOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Scans `heights`, then scans again the heights the node reported as
    /// unknown, for at most `max_passes` passes in total.
    ///
    /// Errors are only returned when the scan itself cannot proceed. Failures
    /// tied to one block, transaction or message are logged and reflected in
    /// the returned report.
    #[instrument(
        name = "scan",
        level = "error",
        skip_all,
        fields(chain = %self.context.chain_id),
    )]
    pub async fn scan(&self, heights: Vec<u64>) -> Result<ScanReport, Error> {
        let mut report = ScanReport::default();
        let mut pending = heights;

        while !pending.is_empty() {
            if report.passes >= self.options.max_passes {
                warn!(
                    passes = report.passes,
                    unresolved = pending.len(),
                    "giving up on heights unknown to the node",
                );

                report.unresolved = pending;
                break;
            }

            report.passes += 1;

            if let (Some(first), Some(last)) = (pending.first(), pending.last()) {
                info!(
                    pass = report.passes,
                    start = first,
                    end = last,
                    count = pending.len(),
                    "starting block queries",
                );
            }

            let mut deferred = Vec::new();

            for outcome in self.scan_pass(pending).await? {
                match outcome {
                    HeightOutcome::Scanned => report.scanned += 1,
                    HeightOutcome::Deferred(height) => deferred.push(height),
                    HeightOutcome::Dropped(height) => report.dropped.push(height),
                }
            }

            deferred.sort_unstable();
            pending = deferred;
        }

        report.dropped.sort_unstable();

        info!(
            passes = report.passes,
            scanned = report.scanned,
            dropped = report.dropped.len(),
            unresolved = report.unresolved.len(),
            "scan finished",
        );

        Ok(report)
    }

    /// Dispatches one fetch task per height, in order, with at most
    /// `concurrency` of them running at any time.
    async fn scan_pass(&self, heights: Vec<u64>) -> Result<Vec<HeightOutcome>, Error> {
        let limiter = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for height in heights {
            let permit = Arc::clone(&limiter)
                .acquire_owned()
                .await
                .map_err(Error::fetch_limiter)?;

            let context = Arc::clone(&self.context);

            tasks.spawn(async move {
                let outcome = context.scan_height(height).await;
                drop(permit);
                outcome
            });
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(outcome) = tasks.join_next().await {
            outcomes.push(outcome.map_err(Error::join)?);
        }

        Ok(outcomes)
    }
}

impl ScanContext {
    async fn scan_height(&self, height: u64) -> HeightOutcome {
        match self.fetch_block(height).await {
            Ok(block) => {
                self.process_block(block).await;
                HeightOutcome::Scanned
            }
            Err(e) if e.is_unknown_height() => {
                debug!(height, "height unknown to the node, deferring");
                HeightOutcome::Deferred(height)
            }
            Err(e) => {
                error!(height, "failed to get block: {e}");
                HeightOutcome::Dropped(height)
            }
        }
    }

    async fn fetch_block(&self, height: u64) -> Result<FetchedBlock, Error> {
        self.retry
            .retry_async(
                |_| async move {
                    match self.rpc.block(height).await {
                        Ok(block) => RetryResult::Ok(block),
                        Err(e) if e.is_transient() => RetryResult::Retry(e),
                        Err(e) => RetryResult::Err(e),
                    }
                },
                |attempt, e| warn!(height, attempt, "failed to get block, retrying: {e}"),
            )
            .await
            .map_err(|e| e.error)
    }

    async fn process_block(&self, block: FetchedBlock) {
        for tx in &block.txs {
            let hash = tx_hash(tx);

            let (body, _) = match decode_tx_raw(tx) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!(height = block.height, tx_hash = %hash, "failed to decode tx: {e}");
                    continue;
                }
            };

            let row = TxRow {
                hash,
                chain_id: self.chain_id.clone(),
                height: block.height,
                time: block.time,
            };

            match self.sink.insert_transaction(&row).await {
                Ok(()) => debug!(
                    height = block.height,
                    tx_hash = %hash,
                    messages = body.messages.len(),
                    "stored tx",
                ),
                Err(e) => error!(height = block.height, tx_hash = %hash, "failed to insert tx: {e}"),
            }

            for (msg_index, msg) in body.messages.iter().enumerate() {
                let decoded = match DecodedMessage::decode(msg) {
                    Ok(decoded) => decoded,
                    Err(e) => {
                        warn!(
                            height = block.height,
                            tx_hash = %hash,
                            msg_index,
                            "failed to decode message: {e}",
                        );
                        continue;
                    }
                };

                let decoded = self
                    .namespace
                    .with_chain(&self.account_prefix, |ctx| decoded.normalize_addresses(ctx));

                if let Err(e) = self.store_message(hash, msg_index, decoded).await {
                    error!(
                        height = block.height,
                        tx_hash = %hash,
                        msg_index,
                        "failed to insert message: {e}",
                    );
                }
            }
        }
    }

    async fn store_message(
        &self,
        tx_hash: tendermint::Hash,
        msg_index: usize,
        msg: DecodedMessage,
    ) -> Result<(), Error> {
        let packet_row = |packet| PacketRow {
            tx_hash,
            msg_index,
            packet,
        };

        match msg {
            DecodedMessage::Transfer(transfer) => {
                let row = TransferRow {
                    tx_hash,
                    msg_index,
                    transfer,
                };

                self.sink.insert_transfer_message(&row).await
            }
            DecodedMessage::RecvPacket(packet) => {
                self.sink.insert_recv_packet_message(&packet_row(packet)).await
            }
            DecodedMessage::Timeout(packet) => {
                self.sink.insert_timeout_message(&packet_row(packet)).await
            }
            DecodedMessage::Acknowledgement(packet) => {
                self.sink.insert_ack_message(&packet_row(packet)).await
            }
            DecodedMessage::Unrecognized { .. } => Ok(()),
        }
    }
}

/// Heights `[start, tip)`, with `tip` the latest height of the chain at the
/// time of the call.
pub async fn make_height_range(client: &ChainClient, start: u64) -> Result<Vec<u64>, Error> {
    let tip = client.query_latest_height().await?;
    Ok((start..tip).collect())
}

/// Where a scan of `chain_id` starts: the explicit height if one is given,
/// otherwise the highest height already in the sink, otherwise zero.
pub async fn start_height(
    explicit: Option<u64>,
    sink: &dyn Sink,
    chain_id: &ChainId,
) -> Result<u64, Error> {
    match explicit.filter(|height| *height > 0) {
        Some(height) => Ok(height),
        None => Ok(sink.last_stored_height(chain_id).await?.unwrap_or(0)),
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use ibc_proto::cosmos::base::v1beta1::Coin;
    use ibc_proto::cosmos::tx::v1beta1::{AuthInfo, TxBody, TxRaw};
    use ibc_proto::google::protobuf::Any;
    use ibc_proto::ibc::applications::transfer::v1::MsgTransfer;
    use ibc_proto::ibc::core::channel::v1::{MsgRecvPacket, Packet};
    use prost::Message;

    use super::*;
    use crate::chain::cosmos::test_utils::test_client;
    use crate::chain::mock::{block_time, MockRpc};
    use crate::etl::message::{RECV_PACKET_TYPE_URL, TRANSFER_TYPE_URL};
    use crate::etl::sink::MemorySink;

    fn transfer_msg(channel: &str, amount: &str) -> Any {
        let msg = MsgTransfer {
            source_port: "transfer".to_string(),
            source_channel: channel.to_string(),
            token: Some(Coin {
                denom: "uatom".to_string(),
                amount: amount.to_string(),
            }),
            sender: "cosmos1sender".to_string(),
            receiver: "osmo1receiver".to_string(),
            ..Default::default()
        };

        Any {
            type_url: TRANSFER_TYPE_URL.to_string(),
            value: msg.encode_to_vec(),
        }
    }

    fn recv_msg() -> Any {
        let msg = MsgRecvPacket {
            packet: Some(Packet {
                sequence: 3,
                source_port: "transfer".to_string(),
                source_channel: "channel-141".to_string(),
                destination_port: "transfer".to_string(),
                destination_channel: "channel-0".to_string(),
                ..Default::default()
            }),
            signer: "cosmos1relayer".to_string(),
            ..Default::default()
        };

        Any {
            type_url: RECV_PACKET_TYPE_URL.to_string(),
            value: msg.encode_to_vec(),
        }
    }

    fn raw_tx(messages: Vec<Any>) -> Vec<u8> {
        let body = TxBody {
            messages,
            ..Default::default()
        };

        TxRaw {
            body_bytes: body.encode_to_vec(),
            auth_info_bytes: AuthInfo::default().encode_to_vec(),
            signatures: vec![Vec::new()],
        }
        .encode_to_vec()
    }

    fn scanner(rpc: MockRpc, sink: Arc<MemorySink>, max_passes: usize) -> BlockScanner {
        let client = test_client(rpc);

        BlockScanner::new(&client, sink).with_options(ScanOptions {
            concurrency: 4,
            max_passes,
        })
    }

    fn stored_heights(sink: &MemorySink) -> Vec<u64> {
        let mut heights = sink
            .transactions()
            .iter()
            .map(|row| row.height)
            .collect::<Vec<_>>();
        heights.sort_unstable();
        heights
    }

    fn rpc_with_blocks(range: core::ops::Range<u64>) -> MockRpc {
        let rpc = MockRpc::new(200);
        for height in range {
            rpc.add_block(height, vec![raw_tx(vec![transfer_msg("channel-0", "10")])]);
        }
        rpc
    }

    #[tokio::test]
    async fn unknown_height_is_deferred_then_reported() {
        let rpc = rpc_with_blocks(100..105);
        rpc.set_unknown_height(102);

        let sink = Arc::new(MemorySink::new());
        let report = scanner(rpc.clone(), sink.clone(), 3)
            .scan((100..105).collect())
            .await
            .unwrap();

        assert_eq!(report.passes, 3);
        assert_eq!(report.scanned, 4);
        assert!(report.dropped.is_empty());
        assert_eq!(report.unresolved, vec![102]);
        assert!(!report.is_complete());

        assert_eq!(stored_heights(&sink), vec![100, 101, 103, 104]);

        // Three attempts in each of the three passes.
        assert_eq!(rpc.block_requests(102), 9);
        for height in [100, 101, 103, 104] {
            assert_eq!(rpc.block_requests(height), 1);
        }
    }

    #[tokio::test]
    async fn deferred_height_is_picked_up_by_a_later_pass() {
        let rpc = rpc_with_blocks(10..14);
        rpc.set_latest_height(12);

        let sink = Arc::new(MemorySink::new());
        let scanner = scanner(rpc.clone(), sink.clone(), 1);

        let report = scanner.scan((10..14).collect()).await.unwrap();
        assert_eq!(report.unresolved, vec![13]);

        rpc.set_latest_height(20);
        let report = scanner.scan(report.unresolved).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(stored_heights(&sink), vec![10, 11, 12, 13]);
    }

    #[tokio::test(start_paused = true)]
    async fn block_fetches_stay_within_concurrency_limit() {
        let rpc = rpc_with_blocks(100..140);
        rpc.set_block_delay(Duration::from_millis(50));

        let sink = Arc::new(MemorySink::new());
        let report = scanner(rpc.clone(), sink.clone(), 1)
            .scan((100..140).collect())
            .await
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.scanned, 40);

        let peak = rpc.peak_blocks_in_flight();
        assert!(peak <= 4, "{peak} block fetches in flight");
        assert!(peak > 1, "block fetches ran one at a time");
    }

    #[tokio::test]
    async fn flaky_height_recovers_within_a_pass() {
        let rpc = rpc_with_blocks(1..4);
        rpc.set_flaky_height(2, 2);

        let sink = Arc::new(MemorySink::new());
        let report = scanner(rpc.clone(), sink.clone(), 3)
            .scan((1..4).collect())
            .await
            .unwrap();

        assert_eq!(report.passes, 1);
        assert!(report.is_complete());
        assert_eq!(rpc.block_requests(2), 3);
        assert_eq!(stored_heights(&sink), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn broken_height_is_dropped() {
        let rpc = rpc_with_blocks(1..4);
        rpc.set_broken_height(2);

        let sink = Arc::new(MemorySink::new());
        let report = scanner(rpc.clone(), sink.clone(), 3)
            .scan((1..4).collect())
            .await
            .unwrap();

        assert_eq!(report.passes, 1);
        assert_eq!(report.dropped, vec![2]);
        assert!(report.unresolved.is_empty());
        assert_eq!(rpc.block_requests(2), 3);
        assert_eq!(stored_heights(&sink), vec![1, 3]);
    }

    #[tokio::test]
    async fn rows_round_trip_through_sink() {
        let rpc = MockRpc::new(200);
        let tx = raw_tx(vec![
            Any {
                type_url: "/cosmos.bank.v1beta1.MsgSend".to_string(),
                value: Vec::new(),
            },
            transfer_msg("channel-7", "123456"),
            recv_msg(),
        ]);
        rpc.add_block(50, vec![b"not a transaction".to_vec(), tx.clone()]);

        let sink = Arc::new(MemorySink::new());
        let report = scanner(rpc, sink.clone(), 1).scan(vec![50]).await.unwrap();
        assert!(report.is_complete());

        let hash = tx_hash(&tx);

        let txs = sink.transactions();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].hash, hash);
        assert_eq!(txs[0].chain_id, ChainId::from("ibc-0"));
        assert_eq!(txs[0].height, 50);
        assert_eq!(txs[0].time, block_time(50));

        let transfers = sink.transfers();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].tx_hash, hash);
        assert_eq!(transfers[0].msg_index, 1);
        assert_eq!(transfers[0].transfer.source_channel, "channel-7");
        assert_eq!(transfers[0].transfer.amount, "123456");
        assert_eq!(transfers[0].transfer.denom, "uatom");

        let recvs = sink.recv_packets();
        assert_eq!(recvs.len(), 1);
        assert_eq!(recvs[0].msg_index, 2);
        assert_eq!(recvs[0].packet.destination_channel, "channel-0");
        assert_eq!(recvs[0].packet.sequence, 3);

        assert!(sink.timeouts().is_empty());
        assert!(sink.acks().is_empty());
    }

    #[tokio::test]
    async fn sink_failures_do_not_abort_the_scan() {
        let rpc = rpc_with_blocks(1..3);

        let sink = Arc::new(MemorySink::new());
        sink.set_rejecting(true);

        let report = scanner(rpc, sink.clone(), 1)
            .scan((1..3).collect())
            .await
            .unwrap();

        assert_eq!(report.scanned, 2);
        assert!(report.is_complete());
        assert!(sink.transactions().is_empty());
    }

    #[tokio::test]
    async fn height_range_ends_below_tip() {
        let client = test_client(MockRpc::new(20));

        assert_eq!(make_height_range(&client, 15).await.unwrap(), vec![15, 16, 17, 18, 19]);
        assert!(make_height_range(&client, 25).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_height_resumes_from_sink() {
        let sink = MemorySink::new();
        let chain_id = ChainId::from("ibc-0");

        assert_eq!(start_height(None, &sink, &chain_id).await.unwrap(), 0);

        sink.insert_transaction(&TxRow {
            hash: tx_hash(b"tx"),
            chain_id: chain_id.clone(),
            height: 42,
            time: block_time(42),
        })
        .await
        .unwrap();

        assert_eq!(start_height(None, &sink, &chain_id).await.unwrap(), 42);
        assert_eq!(start_height(Some(0), &sink, &chain_id).await.unwrap(), 42);
        assert_eq!(start_height(Some(7), &sink, &chain_id).await.unwrap(), 7);
    }
}
