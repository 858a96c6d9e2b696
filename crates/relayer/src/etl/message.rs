use ibc_proto::google::protobuf::Any;
use ibc_proto::ibc::applications::transfer::v1::MsgTransfer;
use ibc_proto::ibc::core::channel::v1::{
    MsgAcknowledgement, MsgRecvPacket, MsgTimeout, Packet,
};
use prost::Message;
use serde::Serialize;
use tracing::debug;

use crate::error::Error;
use crate::namespace::CodecContext;

pub const TRANSFER_TYPE_URL: &str = "/ibc.applications.transfer.v1.MsgTransfer";
pub const RECV_PACKET_TYPE_URL: &str = "/ibc.core.channel.v1.MsgRecvPacket";
pub const TIMEOUT_TYPE_URL: &str = "/ibc.core.channel.v1.MsgTimeout";
pub const ACKNOWLEDGEMENT_TYPE_URL: &str = "/ibc.core.channel.v1.MsgAcknowledgement";

/// Router key of the fungible token transfer module.
pub const TRANSFER_ROUTE: &str = "transfer";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransferMessage {
    pub sender: String,
    pub receiver: String,
    pub denom: String,
    pub amount: String,
    pub source_port: String,
    pub source_channel: String,
    pub route: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PacketMessage {
    pub signer: String,
    pub sequence: u64,
    pub source_port: String,
    pub source_channel: String,
    pub destination_port: String,
    pub destination_channel: String,
}

/// A transaction message, classified once when it is decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodedMessage {
    Transfer(TransferMessage),
    RecvPacket(PacketMessage),
    Timeout(PacketMessage),
    Acknowledgement(PacketMessage),
    Unrecognized { type_url: String },
}

impl DecodedMessage {
    /// Decodes `msg` according to its type url. Messages of any type other
    /// than the four IBC messages of interest are `Unrecognized`.
    pub fn decode(msg: &Any) -> Result<Self, Error> {
        let value = msg.value.as_slice();

        match msg.type_url.as_str() {
            TRANSFER_TYPE_URL => {
                let m = MsgTransfer::decode(value)
                    .map_err(|e| Error::protobuf_decode(String::from("MsgTransfer"), e))?;

                let (denom, amount) = m
                    .token
                    .map(|coin| (coin.denom, coin.amount))
                    .unwrap_or_default();

                Ok(Self::Transfer(TransferMessage {
                    sender: m.sender,
                    receiver: m.receiver,
                    denom,
                    amount,
                    source_port: m.source_port,
                    source_channel: m.source_channel,
                    route: TRANSFER_ROUTE.to_string(),
                }))
            }
            RECV_PACKET_TYPE_URL => {
                let m = MsgRecvPacket::decode(value)
                    .map_err(|e| Error::protobuf_decode(String::from("MsgRecvPacket"), e))?;

                Ok(Self::RecvPacket(PacketMessage::new(m.signer, m.packet)))
            }
            TIMEOUT_TYPE_URL => {
                let m = MsgTimeout::decode(value)
                    .map_err(|e| Error::protobuf_decode(String::from("MsgTimeout"), e))?;

                Ok(Self::Timeout(PacketMessage::new(m.signer, m.packet)))
            }
            ACKNOWLEDGEMENT_TYPE_URL => {
                let m = MsgAcknowledgement::decode(value)
                    .map_err(|e| Error::protobuf_decode(String::from("MsgAcknowledgement"), e))?;

                Ok(Self::Acknowledgement(PacketMessage::new(m.signer, m.packet)))
            }
            type_url => Ok(Self::Unrecognized {
                type_url: type_url.to_string(),
            }),
        }
    }

    /// Re-encodes the account addresses carried by the message under the
    /// prefix installed in `ctx`. Addresses which are not valid bech32 are
    /// kept as they are.
    pub fn normalize_addresses(self, ctx: &CodecContext<'_>) -> Self {
        match self {
            Self::Transfer(mut m) => {
                m.sender = normalize(ctx, m.sender);
                Self::Transfer(m)
            }
            Self::RecvPacket(mut m) => {
                m.signer = normalize(ctx, m.signer);
                Self::RecvPacket(m)
            }
            Self::Timeout(mut m) => {
                m.signer = normalize(ctx, m.signer);
                Self::Timeout(m)
            }
            Self::Acknowledgement(mut m) => {
                m.signer = normalize(ctx, m.signer);
                Self::Acknowledgement(m)
            }
            unrecognized => unrecognized,
        }
    }
}

impl PacketMessage {
    fn new(signer: String, packet: Option<Packet>) -> Self {
        let packet = packet.unwrap_or_default();

        Self {
            signer,
            sequence: packet.sequence,
            source_port: packet.source_port,
            source_channel: packet.source_channel,
            destination_port: packet.destination_port,
            destination_channel: packet.destination_channel,
        }
    }
}

fn normalize(ctx: &CodecContext<'_>, address: String) -> String {
    match ctx.normalize_account(&address) {
        Ok(normalized) => normalized,
        Err(e) => {
            debug!(%address, "keeping address as is: {e}");
            address
        }
    }
}
