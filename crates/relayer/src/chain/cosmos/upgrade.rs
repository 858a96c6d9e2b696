use core::time::Duration;

use ibc_proto::cosmos::base::v1beta1::Coin;
use ibc_proto::cosmos::gov::v1beta1::MsgSubmitProposal;
use ibc_proto::cosmos::upgrade::v1beta1::Plan;
use ibc_proto::google::protobuf::{Any, Duration as RawDuration};
use ibc_proto::ibc::core::client::v1::{Height as RawHeight, UpgradeProposal};
use ibc_proto::ibc::lightclients::tendermint::v1::ClientState as TmClientState;
use prost::Message;
use tracing::{info, instrument};

use crate::chain::cosmos::proof::TENDERMINT_CLIENT_STATE_TYPE_URL;
use crate::chain::cosmos::query::{abci_query, IBC_QUERY_PATH};
use crate::chain::cosmos::retry::retry_transient;
use crate::chain::cosmos::tx::BroadcastOutcome;
use crate::chain::cosmos::ChainClient;
use crate::error::Error;

pub const UPGRADE_PROPOSAL_TYPE_URL: &str = "/ibc.core.client.v1.UpgradeProposal";
pub const SUBMIT_PROPOSAL_TYPE_URL: &str = "/cosmos.gov.v1beta1.MsgSubmitProposal";

const PROPOSAL_TITLE: &str = "upgrade";
const PROPOSAL_DESCRIPTION: &str = "upgrade the chain's software and unbonding period";

/// Software upgrade to schedule through governance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpgradePlan {
    pub name: String,

    /// Last height produced by the current software.
    pub height: u64,

    pub info: String,
}

impl UpgradePlan {
    #[allow(deprecated)]
    fn to_raw(&self) -> Plan {
        Plan {
            name: self.name.clone(),
            height: self.height as i64,
            info: self.info.clone(),
            ..Default::default()
        }
    }
}

/// The client state counterparties will upgrade their clients to: only the
/// fields shared by every client of the chain are kept, the latest height
/// moves past the upgrade and the unbonding period is replaced.
#[allow(deprecated)]
pub fn upgraded_client_state(
    client_state: &Any,
    plan: &UpgradePlan,
    unbonding_period: Duration,
) -> Result<Any, Error> {
    if client_state.type_url != TENDERMINT_CLIENT_STATE_TYPE_URL {
        return Err(Error::unsupported_client_state(client_state.type_url.clone()));
    }

    let client_state = TmClientState::decode(client_state.value.as_slice())
        .map_err(|e| Error::protobuf_decode(String::from("ClientState"), e))?;

    let latest_height = client_state
        .latest_height
        .ok_or_else(Error::missing_latest_height)?;

    let upgraded = TmClientState {
        chain_id: client_state.chain_id,
        unbonding_period: Some(RawDuration {
            seconds: unbonding_period.as_secs() as i64,
            nanos: unbonding_period.subsec_nanos() as i32,
        }),
        latest_height: Some(RawHeight {
            revision_number: latest_height.revision_number,
            revision_height: plan.height + 1,
        }),
        proof_specs: client_state.proof_specs,
        upgrade_path: client_state.upgrade_path,
        ..Default::default()
    };

    Ok(Any {
        type_url: TENDERMINT_CLIENT_STATE_TYPE_URL.to_string(),
        value: upgraded.encode_to_vec(),
    })
}

impl ChainClient {
    /// Reads the client state of the configured path end at `height`,
    /// without a proof.
    pub async fn query_client_state(&self, height: u64) -> Result<Any, Error> {
        let data = self.path_end()?.client_state_path().into_bytes();

        let response = retry_transient(&self.retry, "client state query", || {
            abci_query(
                self.rpc.as_ref(),
                IBC_QUERY_PATH.to_string(),
                data.clone(),
                Some(height),
                false,
            )
        })
        .await?;

        if response.value.is_empty() {
            return Err(Error::empty_response_value());
        }

        Any::decode(response.value.as_slice())
            .map_err(|e| Error::protobuf_decode(String::from("ClientState"), e))
    }

    /// Submits a governance proposal upgrading this chain at `plan.height`.
    ///
    /// The upgraded client state is derived from the client that `dst` keeps
    /// of this chain, read at the latest height of `dst`.
    #[instrument(
        name = "upgrade_chain",
        level = "error",
        skip_all,
        fields(chain = %self.chain_id(), counterparty = %dst.chain_id(), plan = %plan.name),
    )]
    pub async fn upgrade_chain(
        &self,
        dst: &ChainClient,
        plan: UpgradePlan,
        deposit: Coin,
        unbonding_period: Duration,
    ) -> Result<BroadcastOutcome, Error> {
        let height = dst.query_latest_height().await?;
        let client_state = dst.query_client_state(height).await?;

        let upgraded = upgraded_client_state(&client_state, &plan, unbonding_period)?;

        #[allow(deprecated)]
        let proposal = UpgradeProposal {
            title: PROPOSAL_TITLE.to_string(),
            description: PROPOSAL_DESCRIPTION.to_string(),
            plan: Some(plan.to_raw()),
            upgraded_client_state: Some(upgraded),
        };

        let msg = MsgSubmitProposal {
            content: Some(Any {
                type_url: UPGRADE_PROPOSAL_TYPE_URL.to_string(),
                value: proposal.encode_to_vec(),
            }),
            initial_deposit: vec![deposit],
            proposer: self.get_address()?,
        };

        info!(
            upgrade_height = plan.height,
            counterparty_height = height,
            "submitting upgrade proposal",
        );

        self.send_message(Any {
            type_url: SUBMIT_PROPOSAL_TYPE_URL.to_string(),
            value: msg.encode_to_vec(),
        })
        .await
    }
}
