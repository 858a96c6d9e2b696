use ibc_proto::cosmos::tx::v1beta1::mode_info::{Single, Sum};
use ibc_proto::cosmos::tx::v1beta1::{
    AuthInfo, Fee, ModeInfo, SignDoc, SignerInfo, Tx, TxBody, TxRaw,
};
use ibc_proto::google::protobuf::Any;
use prost::Message;

use crate::chain::cosmos::types::account::{Account, AccountNumber, AccountSequence};
use crate::error::Error;
use crate::keyring::KeyEntry;
use crate::types::identifier::ChainId;

pub const SECP256K1_PUBKEY_TYPE_URL: &str = "/cosmos.crypto.secp256k1.PubKey";

/// `SIGN_MODE_DIRECT`
const SIGN_MODE_DIRECT: i32 = 1;

pub struct SignedTx {
    pub body: TxBody,
    pub body_bytes: Vec<u8>,
    pub auth_info: AuthInfo,
    pub auth_info_bytes: Vec<u8>,
    pub signatures: Vec<Vec<u8>>,
}

pub fn sign_and_encode_tx(
    chain_id: &ChainId,
    key_entry: &KeyEntry,
    account: &Account,
    messages: &[Any],
    fee: &Fee,
) -> Result<Vec<u8>, Error> {
    let signed_tx = sign_tx(chain_id, key_entry, account, messages, fee)?;

    let tx_raw = TxRaw {
        body_bytes: signed_tx.body_bytes,
        auth_info_bytes: signed_tx.auth_info_bytes,
        signatures: signed_tx.signatures,
    };

    encode_tx_raw(tx_raw)
}

pub fn sign_tx(
    chain_id: &ChainId,
    key_entry: &KeyEntry,
    account: &Account,
    messages: &[Any],
    fee: &Fee,
) -> Result<SignedTx, Error> {
    let pk_any = Any {
        type_url: SECP256K1_PUBKEY_TYPE_URL.to_string(),
        value: encode_key_bytes(key_entry),
    };

    let signer = encode_signer_info(account.sequence, Some(pk_any));

    let (body, body_bytes) = tx_body_and_bytes(messages)?;

    let (auth_info, auth_info_bytes) = auth_info_and_bytes(signer, fee.clone())?;

    let signed_doc = encode_sign_doc(
        chain_id,
        key_entry,
        account.number,
        auth_info_bytes.clone(),
        body_bytes.clone(),
    )?;

    Ok(SignedTx {
        body,
        body_bytes,
        auth_info,
        auth_info_bytes,
        signatures: vec![signed_doc],
    })
}

/// An unsigned transaction fit for simulation: one signer slot with an empty
/// secp256k1 public key and an empty signature, carrying the current sequence.
///
/// The ante handler charges signature verification gas by public key type,
/// so the key type has to be present even though its bytes are not.
pub fn simulation_tx(account: &Account, messages: &[Any]) -> Result<Tx, Error> {
    let public_key = Any {
        type_url: SECP256K1_PUBKEY_TYPE_URL.to_string(),
        value: Vec::new(),
    };
    let signer = encode_signer_info(account.sequence, Some(public_key));

    let (body, _) = tx_body_and_bytes(messages)?;
    let (auth_info, _) = auth_info_and_bytes(signer, Fee::default())?;

    Ok(Tx {
        body: Some(body),
        auth_info: Some(auth_info),
        signatures: vec![Vec::new()],
    })
}

fn encode_key_bytes(key_entry: &KeyEntry) -> Vec<u8> {
    // `PubKey { key }` shares its encoding with a length-delimited bytes field 1.
    key_entry.public_key.encode_to_vec()
}

fn encode_sign_doc(
    chain_id: &ChainId,
    key_entry: &KeyEntry,
    account_number: AccountNumber,
    auth_info_bytes: Vec<u8>,
    body_bytes: Vec<u8>,
) -> Result<Vec<u8>, Error> {
    let sign_doc = SignDoc {
        body_bytes,
        auth_info_bytes,
        chain_id: chain_id.to_string(),
        account_number: account_number.to_u64(),
    };

    // A protobuf serialization of a SignDoc
    let mut signdoc_buf = Vec::new();
    Message::encode(&sign_doc, &mut signdoc_buf)
        .map_err(|e| Error::protobuf_encode(String::from("SignDoc"), e))?;

    key_entry.sign(&signdoc_buf).map_err(Error::key_base)
}

fn encode_signer_info(sequence: AccountSequence, public_key: Option<Any>) -> SignerInfo {
    let single = Single {
        mode: SIGN_MODE_DIRECT,
    };

    SignerInfo {
        public_key,
        mode_info: Some(ModeInfo {
            sum: Some(Sum::Single(single)),
        }),
        sequence: sequence.to_u64(),
    }
}

pub fn encode_tx(tx: &Tx) -> Result<Vec<u8>, Error> {
    let mut tx_bytes = Vec::new();
    Message::encode(tx, &mut tx_bytes)
        .map_err(|e| Error::protobuf_encode(String::from("Transaction"), e))?;

    Ok(tx_bytes)
}

fn encode_tx_raw(tx_raw: TxRaw) -> Result<Vec<u8>, Error> {
    let mut tx_bytes = Vec::new();
    Message::encode(&tx_raw, &mut tx_bytes)
        .map_err(|e| Error::protobuf_encode(String::from("Transaction"), e))?;

    Ok(tx_bytes)
}

fn auth_info_and_bytes(signer_info: SignerInfo, fee: Fee) -> Result<(AuthInfo, Vec<u8>), Error> {
    let auth_info = AuthInfo {
        signer_infos: vec![signer_info],
        fee: Some(fee),

        // Since Cosmos SDK v0.46.0
        tip: None,
    };

    // A protobuf serialization of a AuthInfo
    let mut auth_buf = Vec::new();

    Message::encode(&auth_info, &mut auth_buf)
        .map_err(|e| Error::protobuf_encode(String::from("AuthInfo"), e))?;

    Ok((auth_info, auth_buf))
}

fn tx_body_and_bytes(proto_msgs: &[Any]) -> Result<(TxBody, Vec<u8>), Error> {
    let body = TxBody {
        messages: proto_msgs.to_vec(),
        memo: String::new(),
        timeout_height: 0_u64,
        extension_options: Vec::new(),
        non_critical_extension_options: Vec::new(),
    };

    // A protobuf serialization of a TxBody
    let mut body_buf = Vec::new();

    Message::encode(&body, &mut body_buf)
        .map_err(|e| Error::protobuf_encode(String::from("TxBody"), e))?;

    Ok((body, body_buf))
}

/// Splits a raw transaction back into its body and auth info.
pub fn decode_tx_raw(tx_bytes: &[u8]) -> Result<(TxBody, AuthInfo), Error> {
    let raw = TxRaw::decode(tx_bytes)
        .map_err(|e| Error::protobuf_decode(String::from("TxRaw"), e))?;

    let body = TxBody::decode(raw.body_bytes.as_slice())
        .map_err(|e| Error::protobuf_decode(String::from("TxBody"), e))?;

    let auth_info = AuthInfo::decode(raw.auth_info_bytes.as_slice())
        .map_err(|e| Error::protobuf_decode(String::from("AuthInfo"), e))?;

    Ok((body, auth_info))
}
