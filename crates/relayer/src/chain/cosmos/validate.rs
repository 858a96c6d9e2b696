//! Checks that the path ends of two chains are complete enough for the
//! stage of relaying about to start.

use crate::chain::cosmos::ChainClient;
use crate::error::Error;
use crate::types::identifier::ConnectionId;
use crate::types::path::ChannelEnd;

impl ChainClient {
    /// Identifier of the connection of the configured path end.
    pub fn connection_id(&self) -> Result<&ConnectionId, Error> {
        self.path_end()?
            .connection_id
            .as_ref()
            .ok_or_else(|| Error::missing_connection_id(self.chain_id().clone()))
    }

    /// Channel parameters of the configured path end, which also needs a
    /// connection for the channel to live on.
    pub fn channel_end(&self) -> Result<&ChannelEnd, Error> {
        self.connection_id()?;

        let channel = self
            .path_end()?
            .channel
            .as_ref()
            .ok_or_else(|| Error::missing_channel(self.chain_id().clone()))?;

        if channel.version.trim().is_empty() {
            return Err(Error::empty_channel_version(self.chain_id().clone()));
        }

        Ok(channel)
    }
}

/// Both chains name a client.
pub fn validate_client_paths(src: &ChainClient, dst: &ChainClient) -> Result<(), Error> {
    src.path_end()?;
    dst.path_end()?;
    Ok(())
}

/// Both chains name a client and a connection.
pub fn validate_connection_paths(src: &ChainClient, dst: &ChainClient) -> Result<(), Error> {
    src.connection_id()?;
    dst.connection_id()?;
    Ok(())
}

/// Both path ends are complete: client, connection and channel parameters.
pub fn validate_paths(src: &ChainClient, dst: &ChainClient) -> Result<(), Error> {
    src.channel_end()?;
    dst.channel_end()?;
    Ok(())
}

/// Both path ends are complete and agree on the channel ordering.
pub fn validate_channel_params(src: &ChainClient, dst: &ChainClient) -> Result<(), Error> {
    let src_channel = src.channel_end()?;
    let dst_channel = dst.channel_end()?;

    if src_channel.order != dst_channel.order {
        return Err(Error::channel_order_mismatch(
            src_channel.order.to_string(),
            dst_channel.order.to_string(),
        ));
    }

    Ok(())
}
