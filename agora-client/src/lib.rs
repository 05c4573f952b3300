mod cache;
pub use cache::{Infinite, KeyFamily, QueryCache, QueryKey};

mod error;
pub use error::ClientError;

mod rpc;
pub use rpc::{HttpTransport, RpcClient, Transport};

pub mod api {
    pub use agora_api::*;
}
