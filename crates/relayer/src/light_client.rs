//! Trusted header provider handed to the chain client.
//!
//! Verifying headers is delegated to an external light client; this module
//! only carries the facts such a client is built from.

use core::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

use tendermint::Time;
use tendermint_rpc::Url;

use crate::types::identifier::ChainId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LightProvider {
    chain_id: ChainId,
    rpc_addr: Url,
    trusting_period: Duration,
}

impl LightProvider {
    pub fn new(chain_id: ChainId, rpc_addr: Url, trusting_period: Duration) -> Self {
        Self {
            chain_id,
            rpc_addr,
            trusting_period,
        }
    }

    pub fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    pub fn rpc_addr(&self) -> &Url {
        &self.rpc_addr
    }

    pub fn trusting_period(&self) -> Duration {
        self.trusting_period
    }

    /// Whether a header produced at `header_time` can still be trusted at `now`.
    /// Headers from the future are trusted.
    pub fn is_within_trusting_period(&self, header_time: Time, now: SystemTime) -> bool {
        let now = now
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as i64);

        let age = now.saturating_sub(header_time.unix_timestamp());

        age <= 0 || (age as u64) <= self.trusting_period.as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn trusting_period_window() {
        let provider = LightProvider::new(
            ChainId::from("ibc-0"),
            "http://127.0.0.1:26657".parse().unwrap(),
            Duration::from_secs(3600),
        );

        let header_time = Time::from_unix_timestamp(1_700_000_000, 0).unwrap();
        let at = |secs: u64| UNIX_EPOCH + Duration::from_secs(secs);

        assert!(provider.is_within_trusting_period(header_time, at(1_700_000_000)));
        assert!(provider.is_within_trusting_period(header_time, at(1_700_003_600)));
        assert!(!provider.is_within_trusting_period(header_time, at(1_700_003_601)));
        assert!(provider.is_within_trusting_period(header_time, at(1_600_000_000)));
    }
}
