#![forbid(unsafe_code)]
#![deny(trivial_casts, unused_import_braces, rust_2018_idioms)]
#![allow(clippy::too_many_arguments)]

//! Client core of an IBC relayer.
//!
//! - [`chain::ChainClient`] talks to the RPC endpoint of a Cosmos SDK chain,
//!   queries its state and signs and broadcasts transactions.
//! - [`chain::cosmos::proof`] gathers the proofs needed to advance a
//!   connection handshake.
//! - [`etl::BlockScanner`] extracts IBC activity from historical blocks into
//!   a [`etl::Sink`].
//!
//! Address encoding goes through a shared [`namespace::AddressNamespace`].

pub mod chain;
pub mod config;
pub mod error;
pub mod etl;
pub mod event;
pub mod keyring;
pub mod light_client;
pub mod namespace;
pub mod types;
pub mod util;
