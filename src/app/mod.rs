pub mod auto_update;
pub mod client;
pub mod demo;
pub mod engine;
pub mod image_service;
pub mod roots;
pub mod server;
pub mod work_manager;

use crate::{
    net::{
        NetworkError,
        ProtocolError
    },
    settings::SettingsError,
    ui::sprite::TreeError
};

use roots::RootError;

/// Which side of the sync an engine runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineRole {
    /// Owns the authoritative tree and sends it.
    Server,
    /// Mirrors the server's tree and draws it.
    Client,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("NetworkError, reason='{0}'")]
    Network(#[from] NetworkError),

    #[error("SettingsError, reason='{0}'")]
    Settings(#[from] SettingsError),

    #[error("RootError, reason='{0}'")]
    Root(#[from] RootError),

    #[error("ProtocolError, reason='{0}'")]
    Protocol(#[from] ProtocolError),

    #[error("TreeError, reason='{0}'")]
    Tree(#[from] TreeError),
}
