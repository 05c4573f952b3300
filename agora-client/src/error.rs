use crate::api;

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Api(#[from] api::Error),

    #[error("transport failure: {0}")]
    Transport(String),
}

impl ClientError {
    pub fn transport(err: impl std::fmt::Display) -> ClientError {
        ClientError::Transport(err.to_string())
    }
}
