pub mod attribute;
pub mod blob;
pub mod data_buffer;
pub mod frame;
pub mod receiver;
pub mod sender;
pub mod udp;

use crate::ui::sprite::{
    SpriteId,
    TreeError
};

use data_buffer::DataBufferError;

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed record, reason='{0}'")]
    DataBuffer(#[from] DataBufferError),

    #[error("Unknown attribute tag, attribute='{attribute}', tag='{tag}'")]
    UnknownAttributeTag {
        attribute: u8,
        tag: u8,
    },

    #[error("Id list too long, length='{0}'")]
    IdListTooLong(usize),

    #[error("Invalid record code '{0}'")]
    InvalidRecordCode(u8),

    #[error("Unknown blob type '{0}'")]
    UnknownBlobType(u8),

    #[error("New sprite without parent, id='{0}'")]
    MissingParent(SpriteId),

    #[error("Unknown parent, sprite='{sprite}', parent='{parent}'")]
    UnknownParent {
        sprite: SpriteId,
        parent: SpriteId,
    },

    #[error("Blob type does not match sprite kind, id='{0}'")]
    KindMismatch(SpriteId),

    #[error("Frame length mismatch, declared='{declared}', actual='{actual}'")]
    FrameLengthMismatch {
        declared: usize,
        actual: usize,
    },

    #[error("Record does not fit a datagram, size='{size}', limit='{limit}'")]
    RecordTooLarge {
        size: usize,
        limit: usize,
    },

    #[error("Blob registry full")]
    RegistryFull,

    #[error("Tree error, reason='{0}'")]
    Tree(#[from] TreeError),
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("IoError, reason='{0}'")]
    IoError(#[from] tokio::io::Error),

    #[error("Could not resolve address '{0}'")]
    AddressResolve(String),
}
