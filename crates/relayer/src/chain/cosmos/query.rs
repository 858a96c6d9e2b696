use ibc_proto::ibc::core::commitment::v1::MerkleProof;
use ibc_proto::ics23::CommitmentProof;
use prost::Message;
use tendermint::merkle::proof::ProofOps;

use crate::chain::rpc::RpcClient;
use crate::error::Error;

pub mod account;

/// ABCI path under which the IBC store is queried by key.
pub const IBC_QUERY_PATH: &str = "store/ibc/key";

/// Generic query response type
#[derive(Clone, Debug, PartialEq)]
pub struct QueryResponse {
    pub value: Vec<u8>,
    pub proof: Option<MerkleProof>,
    pub height: u64,
}

/// Perform a generic `abci_query`, failing on a non-zero response code or on
/// a missing proof when one was requested.
pub async fn abci_query(
    rpc_client: &dyn RpcClient,
    path: String,
    data: Vec<u8>,
    height: Option<u64>,
    prove: bool,
) -> Result<QueryResponse, Error> {
    let response = rpc_client
        .abci_query(path.clone(), data, height, prove)
        .await?;

    if response.code != 0 {
        return Err(Error::abci_query(path, response.code, response.log));
    }

    if prove && response.proof.is_none() {
        return Err(Error::empty_response_proof());
    }

    let proof = response
        .proof
        .as_ref()
        .map(convert_tm_to_ics_merkle_proof)
        .transpose()?;

    Ok(QueryResponse {
        value: response.value,
        proof,
        height: response.height,
    })
}

/// Re-encodes the proof operations returned by the node as an ICS 23 Merkle proof.
pub fn convert_tm_to_ics_merkle_proof(tm_proof: &ProofOps) -> Result<MerkleProof, Error> {
    if tm_proof.ops.is_empty() {
        return Err(Error::malformed_proof("no proof operations".to_string()));
    }

    let proofs = tm_proof
        .ops
        .iter()
        .map(|op| {
            CommitmentProof::decode(op.data.as_slice())
                .map_err(|e| Error::protobuf_decode(String::from("CommitmentProof"), e))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(MerkleProof { proofs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{proof_ops, MockRpc};
    use crate::chain::rpc::AbciQueryResponse;

    #[tokio::test]
    async fn failing_code_is_an_error() {
        let rpc = MockRpc::new(10);

        let err = abci_query(&rpc, "/unknown".to_string(), Vec::new(), None, false)
            .await
            .unwrap_err();

        assert!(!err.is_transient());
        assert!(err.to_string().contains("/unknown"));
    }

    #[tokio::test]
    async fn proof_is_required_when_requested() {
        let rpc = MockRpc::new(10);
        rpc.set_abci_value(IBC_QUERY_PATH, b"state".to_vec());

        let response = abci_query(&rpc, IBC_QUERY_PATH.to_string(), b"key".to_vec(), Some(5), false)
            .await
            .unwrap();
        assert_eq!(response.value, b"state".to_vec());
        assert!(response.proof.is_none());

        let err = abci_query(&rpc, IBC_QUERY_PATH.to_string(), b"key".to_vec(), Some(5), true)
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn proof_ops_become_merkle_proof() {
        let rpc = MockRpc::new(10);
        rpc.set_abci_response(
            IBC_QUERY_PATH,
            b"key",
            AbciQueryResponse {
                code: 0,
                log: String::new(),
                value: b"state".to_vec(),
                proof: Some(proof_ops(CommitmentProof::default().encode_to_vec())),
                height: 5,
            },
        );

        let response = abci_query(&rpc, IBC_QUERY_PATH.to_string(), b"key".to_vec(), Some(5), true)
            .await
            .unwrap();

        assert_eq!(response.height, 5);
        assert_eq!(response.proof.unwrap().proofs.len(), 1);
    }

    #[test]
    fn empty_proof_ops_are_malformed() {
        assert!(convert_tm_to_ics_merkle_proof(&ProofOps { ops: Vec::new() }).is_err());
    }
}
