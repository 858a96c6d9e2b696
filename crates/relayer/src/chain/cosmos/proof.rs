use ibc_proto::google::protobuf::Any;
use ibc_proto::ibc::core::commitment::v1::MerkleProof;
use ibc_proto::ibc::lightclients::tendermint::v1::ClientState as TmClientState;
use prost::Message;
use tracing::{debug, instrument};

use crate::chain::cosmos::query::{abci_query, IBC_QUERY_PATH};
use crate::chain::cosmos::retry::retry_transient;
use crate::chain::cosmos::ChainClient;
use crate::error::Error;
use crate::types::height::Height;

pub const TENDERMINT_CLIENT_STATE_TYPE_URL: &str = "/ibc.lightclients.tendermint.v1.ClientState";

/// Everything the counterparty needs to verify the local state of a
/// connection handshake. Only ever built complete.
#[derive(Clone, Debug, PartialEq)]
pub struct ProofBundle {
    pub client_state: Any,
    pub client_state_proof: Vec<u8>,

    /// Height of the consensus state proven below, the client's latest height.
    pub consensus_height: Height,
    pub consensus_state_proof: Vec<u8>,

    pub connection_proof: Vec<u8>,

    /// Height at which the connection proof verifies.
    pub proof_height: Height,
}

/// A value read from the IBC store together with its Merkle proof.
#[derive(Clone, Debug, PartialEq)]
pub struct ProvenValue {
    pub value: Vec<u8>,
    pub proof: MerkleProof,
    pub proof_height: Height,
}

impl ProvenValue {
    pub fn proof_bytes(&self) -> Vec<u8> {
        self.proof.encode_to_vec()
    }
}

/// Latest height tracked by a Tendermint light client state.
pub fn client_state_latest_height(client_state: &Any) -> Result<Height, Error> {
    if client_state.type_url != TENDERMINT_CLIENT_STATE_TYPE_URL {
        return Err(Error::unsupported_client_state(client_state.type_url.clone()));
    }

    let client_state = TmClientState::decode(client_state.value.as_slice())
        .map_err(|e| Error::protobuf_decode(String::from("ClientState"), e))?;

    client_state
        .latest_height
        .map(Height::from)
        .ok_or_else(Error::missing_latest_height)
}

impl ChainClient {
    /// Reads `key` from the IBC store at `height` with a proof. The proof
    /// verifies against the app hash of the next block.
    ///
    /// Height zero would let the node answer at its latest height, so it is
    /// rejected.
    pub async fn query_proven(&self, key: String, height: u64) -> Result<ProvenValue, Error> {
        if height == 0 {
            return Err(Error::zero_proof_height());
        }

        let data = key.into_bytes();

        let response = retry_transient(&self.retry, "proof query", || {
            abci_query(
                self.rpc.as_ref(),
                IBC_QUERY_PATH.to_string(),
                data.clone(),
                Some(height),
                true,
            )
        })
        .await?;

        if response.value.is_empty() {
            return Err(Error::empty_response_value());
        }

        let proof = response.proof.ok_or_else(Error::empty_response_proof)?;

        Ok(ProvenValue {
            value: response.value,
            proof,
            proof_height: Height::new(self.self_version(), response.height + 1),
        })
    }

    pub async fn query_client_state_with_proof(
        &self,
        height: u64,
    ) -> Result<(Any, ProvenValue), Error> {
        let key = self.path_end()?.client_state_path();
        let proven = self.query_proven(key, height).await?;

        let client_state = Any::decode(proven.value.as_slice())
            .map_err(|e| Error::protobuf_decode(String::from("ClientState"), e))?;

        Ok((client_state, proven))
    }

    pub async fn query_consensus_state_with_proof(
        &self,
        consensus_height: Height,
        height: u64,
    ) -> Result<ProvenValue, Error> {
        let key = self.path_end()?.consensus_state_path(
            consensus_height.revision_number,
            consensus_height.revision_height,
        );

        self.query_proven(key, height).await
    }

    pub async fn query_connection_with_proof(&self, height: u64) -> Result<ProvenValue, Error> {
        let key = self
            .path_end()?
            .connection_path()
            .ok_or_else(|| Error::missing_connection_id(self.chain_id().clone()))?;

        self.query_proven(key, height).await
    }

    /// Gathers the client state, consensus state and connection proofs of the
    /// configured path end at `height`.
    ///
    /// The consensus state to prove depends on the client state, so the
    /// client state is queried first. The two remaining queries then run
    /// concurrently, and both are awaited even when one of them fails.
    ///
    /// All three proofs must verify at the same height, the one following
    /// `height`. A node answering any query at another height fails the
    /// whole bundle.
    #[instrument(
        name = "generate_handshake_proof",
        level = "error",
        skip_all,
        fields(chain = %self.chain_id(), height = height),
    )]
    pub async fn generate_handshake_proof(&self, height: u64) -> Result<ProofBundle, Error> {
        if height == 0 {
            return Err(Error::zero_proof_height());
        }

        let (client_state, client_state_proven) = self.query_client_state_with_proof(height).await?;
        let consensus_height = client_state_latest_height(&client_state)?;

        debug!(%consensus_height, "client state retrieved");

        let (consensus, connection) = tokio::join!(
            self.query_consensus_state_with_proof(consensus_height, height),
            self.query_connection_with_proof(height),
        );

        let consensus = consensus?;
        let connection = connection?;

        let expected = Height::new(self.self_version(), height + 1);
        let heights = [
            client_state_proven.proof_height,
            consensus.proof_height,
            connection.proof_height,
        ];

        if heights.iter().any(|h| *h != expected) {
            return Err(Error::inconsistent_proof_heights(
                client_state_proven.proof_height.to_string(),
                consensus.proof_height.to_string(),
                connection.proof_height.to_string(),
            ));
        }

        Ok(ProofBundle {
            client_state,
            client_state_proof: client_state_proven.proof_bytes(),
            consensus_height,
            consensus_state_proof: consensus.proof_bytes(),
            connection_proof: connection.proof_bytes(),
            proof_height: connection.proof_height,
        })
    }
}
