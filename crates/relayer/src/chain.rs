pub mod cosmos;
pub mod rpc;

#[cfg(test)]
pub mod mock;

pub use cosmos::ChainClient;
pub use rpc::RpcClient;
