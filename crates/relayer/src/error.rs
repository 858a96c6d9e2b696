//! This module defines the various errors that can be raised by the relayer client.

use core::time::Duration;

use flex_error::{define_error, DisplayOnly, TraceError};
use tendermint::Hash as TxHash;
use tendermint_rpc::Error as TendermintRpcError;
use tokio::sync::AcquireError;
use tokio::task::JoinError;

use crate::config::Error as ConfigError;
use crate::keyring::errors::Error as KeyringError;
use crate::types::identifier::ChainId;

/// Code returned by the SDK for a transaction signed with a stale sequence.
pub const INCORRECT_ACCOUNT_SEQUENCE_ERR: u32 = 32;

const ACCOUNT_SEQUENCE_MISMATCH_LOG: &str = "account sequence mismatch";

define_error! {
    Error {
        Io
            [ TraceError<std::io::Error> ]
            |_| { "I/O error" },

        Config
            [ ConfigError ]
            |_| { "invalid configuration" },

        Rpc
            { url: tendermint_rpc::Url }
            [ DisplayOnly<TendermintRpcError> ]
            |e| { format!("RPC error to endpoint {}", e.url) },

        RpcTimeout
            { url: String, timeout: Duration }
            |e| {
                format!("RPC request to {} timed out after {}",
                    e.url, humantime::format_duration(e.timeout))
            },

        RpcTransport
            { url: String, reason: String }
            |e| { format!("RPC transport failure to endpoint {}: {}", e.url, e.reason) },

        UnknownHeight
            { height: u64 }
            |e| { format!("node does not know block at height {} (wrong ID)", e.height) },

        Websocket
            { url: String }
            [ DisplayOnly<TendermintRpcError> ]
            |e| { format!("websocket error to endpoint {}", e.url) },

        SubscriptionTimeout
            { query: String, timeout: Duration }
            |e| {
                format!("subscription to '{}' was not established within {}",
                    e.query, humantime::format_duration(e.timeout))
            },

        InvalidQuery
            { query: String }
            [ DisplayOnly<TendermintRpcError> ]
            |e| { format!("invalid event query '{}'", e.query) },

        AbciQuery
            { path: String, code: u32, log: String }
            |e| {
                format!("ABCI query to '{}' failed with code {}: {}", e.path, e.code, e.log)
            },

        EmptyResponseValue
            |_| { "empty response value" },

        EmptyResponseProof
            |_| { "empty response proof" },

        MalformedProof
            { reason: String }
            |e| { format!("malformed proof: {}", e.reason) },

        ProtobufDecode
            { payload_type: String }
            [ TraceError<prost::DecodeError> ]
            |e| { format!("error decoding protocol buffer for {}", e.payload_type) },

        ProtobufEncode
            { payload_type: String }
            [ TraceError<prost::EncodeError> ]
            |e| { format!("error encoding protocol buffer for {}", e.payload_type) },

        KeyBase
            [ KeyringError ]
            |_| { "keyring error" },

        Bech32Encoding
            [ TraceError<bech32::Error> ]
            |_| { "bech32 encoding failed" },

        AddressPrefixMismatch
            { address: String, expected: String }
            |e| {
                format!("address '{}' does not carry the expected prefix '{}'",
                    e.address, e.expected)
            },

        ChainNotReady
            { chain_id: ChainId, height: u64 }
            |e| {
                format!("chain {} has not produced enough blocks yet (latest height: {})",
                    e.chain_id, e.height)
            },

        EmptyQueryAccount
            { address: String }
            |e| { format!("query returned no account for address {}", e.address) },

        UnknownAccountType
            { type_url: String }
            |e| { format!("unknown account type returned from query: {}", e.type_url) },

        EmptyBaseAccount
            |_| { "empty base account" },

        TxSimulateGasEstimate
            |_| { "simulation response carries no gas information" },

        TxNoConfirmation
            { hash: TxHash, timeout: Duration }
            |e| {
                format!("transaction {} was not included within {}",
                    e.hash, humantime::format_duration(e.timeout))
            },

        TxConfirmation
            { hash: TxHash, reason: String }
            |e| {
                format!("failed to confirm inclusion of accepted transaction {}: {}",
                    e.hash, e.reason)
            },

        MissingPathEnd
            { chain_id: ChainId }
            |e| { format!("no path end is configured for chain {}", e.chain_id) },

        MissingConnectionId
            { chain_id: ChainId }
            |e| { format!("path end of chain {} has no connection identifier", e.chain_id) },

        MissingChannel
            { chain_id: ChainId }
            |e| { format!("path end of chain {} has no channel parameters", e.chain_id) },

        EmptyChannelVersion
            { chain_id: ChainId }
            |e| { format!("channel version of chain {} is empty", e.chain_id) },

        ChannelOrderMismatch
            { src: String, dst: String }
            |e| {
                format!("channel orderings do not match: source is {}, destination is {}",
                    e.src, e.dst)
            },

        ZeroProofHeight
            |_| { "proofs cannot be queried at height zero" },

        InconsistentProofHeights
            { client: String, consensus: String, connection: String }
            |e| {
                format!("proofs were produced at different heights: client state at {}, consensus state at {}, connection at {}",
                    e.client, e.consensus, e.connection)
            },

        UnsupportedClientState
            { type_url: String }
            |e| { format!("unsupported client state type: {}", e.type_url) },

        MissingLatestHeight
            |_| { "client state carries no latest height" },

        Join
            [ TraceError<JoinError> ]
            |_| { "error joining spawned task" },

        FetchLimiter
            [ TraceError<AcquireError> ]
            |_| { "block fetch limiter closed" },

        Sink
            { reason: String }
            |e| { format!("sink error: {}", e.reason) },

        ListenerStopped
            |_| { "event listener already stopped" },
    }
}

impl Error {
    /// The node reported that the requested height does not exist (yet).
    pub fn is_unknown_height(&self) -> bool {
        matches!(self.detail(), ErrorDetail::UnknownHeight(_))
    }

    /// The node rejected a transaction, or its simulation, because it was
    /// signed with a stale account sequence.
    pub fn is_account_sequence_mismatch(&self) -> bool {
        match self.detail() {
            ErrorDetail::AbciQuery(e) => {
                e.code == INCORRECT_ACCOUNT_SEQUENCE_ERR
                    || e.log.contains(ACCOUNT_SEQUENCE_MISMATCH_LOG)
            }
            _ => false,
        }
    }

    /// Hash of a transaction the node accepted but whose inclusion could not
    /// be established. Resending it would risk a duplicate.
    pub fn accepted_tx_hash(&self) -> Option<TxHash> {
        match self.detail() {
            ErrorDetail::TxNoConfirmation(e) => Some(e.hash),
            ErrorDetail::TxConfirmation(e) => Some(e.hash),
            _ => None,
        }
    }

    /// Errors worth another attempt: transport failures and timeouts.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.detail(),
            ErrorDetail::Rpc(_)
                | ErrorDetail::RpcTimeout(_)
                | ErrorDetail::RpcTransport(_)
                | ErrorDetail::UnknownHeight(_)
                | ErrorDetail::Websocket(_)
                | ErrorDetail::SubscriptionTimeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn classifies_unknown_height() {
        let err = Error::unknown_height(102);
        assert!(err.is_unknown_height());
        assert!(err.is_transient());
        assert!(err.to_string().contains("102"));
    }

    #[test]
    fn semantic_errors_are_not_transient() {
        let err = Error::abci_query("store/ibc/key".to_string(), 18, "invalid".to_string());
        assert!(!err.is_transient());
        assert!(!err.is_unknown_height());

        let err = Error::rpc_timeout("http://127.0.0.1:26657".to_string(), Duration::from_secs(1));
        assert!(err.is_transient());
        assert!(!err.is_unknown_height());
    }

    #[test]
    fn classifies_sequence_mismatch() {
        let err = Error::abci_query("/simulate".to_string(), 32, "incorrect".to_string());
        assert!(err.is_account_sequence_mismatch());

        let err = Error::abci_query(
            "/simulate".to_string(),
            18,
            "account sequence mismatch, expected 7, got 2: incorrect account sequence".to_string(),
        );
        assert!(err.is_account_sequence_mismatch());

        let err = Error::abci_query("/simulate".to_string(), 11, "out of gas".to_string());
        assert!(!err.is_account_sequence_mismatch());
    }

    #[test]
    fn confirmation_errors_carry_the_accepted_hash() {
        let hash = TxHash::Sha256([7; 32]);

        let err = Error::tx_no_confirmation(hash, Duration::from_secs(1));
        assert_eq!(err.accepted_tx_hash(), Some(hash));

        let err = Error::tx_confirmation(hash, "connection refused".to_string());
        assert_eq!(err.accepted_tx_hash(), Some(hash));
        assert!(!err.is_transient());

        assert_eq!(Error::empty_response_value().accepted_tx_hash(), None);
    }
}
