use crate::ui::sprite::{
    attribute,
    AttributeMask,
    DirtyChannel,
    SpriteId,
    SpriteStore
};

use super::{
    blob::BlobRegistry,
    frame::{
        FrameWriter,
        Record,
        MAX_DATAGRAM_SIZE
    },
    ProtocolError
};

/// Serializes the sprite tree into outgoing frames.
#[derive(Debug, Clone)]
pub struct EngineSender {
    max_datagram_size: usize,
}

impl Default for EngineSender {
    fn default() -> Self {
        Self::new(MAX_DATAGRAM_SIZE)
    }
}

impl EngineSender {
    pub fn new(max_datagram_size: usize) -> Self {
        Self { max_datagram_size }
    }

    /// Deletes since the last frame, then every sprite dirty on `channel`, parents before
    /// children. Clears `channel` on the sprites it writes.
    pub fn dirty_frame(
        &self,
        frame: u32,
        store: &mut SpriteStore,
        registry: &BlobRegistry,
        channel: DirtyChannel,
        deletes: &[SpriteId]
    ) -> Vec<Vec<u8>> {
        let mut writer = FrameWriter::with_max_datagram_size(frame, self.max_datagram_size);
        for id in deletes {
            Self::push_command(&mut writer, &Record::DeleteSprite(*id));
        }

        for id in Self::tree_order(store) {
            let Some(sprite) = store.get_mut(id) else {
                continue;
            };
            let mask = sprite.take_dirty(channel);
            if mask.is_empty() {
                continue;
            }
            Self::write_sprite(&mut writer, store, registry, id, mask);
        }
        writer.finish()
    }

    /// Full snapshot: `ClearWorld` first, then every live sprite with all attributes.
    pub fn world_frame(&self, frame: u32, store: &mut SpriteStore, registry: &BlobRegistry) -> Vec<Vec<u8>> {
        let mut writer = FrameWriter::with_max_datagram_size(frame, self.max_datagram_size);
        Self::push_command(&mut writer, &Record::ClearWorld);

        for id in Self::tree_order(store) {
            let Some(sprite) = store.get_mut(id) else {
                continue;
            };
            sprite.take_dirty(DirtyChannel::Client);
            let mask = sprite.all_attributes();
            Self::write_sprite(&mut writer, store, registry, id, mask);
        }
        log::debug!("World frame {frame} with {} sprites", store.len());
        writer.finish()
    }

    pub fn command_frame(&self, frame: u32, record: &Record) -> Vec<Vec<u8>> {
        let mut writer = FrameWriter::with_max_datagram_size(frame, self.max_datagram_size);
        Self::push_command(&mut writer, record);
        writer.finish()
    }

    fn tree_order(store: &SpriteStore) -> Vec<SpriteId> {
        store.roots()
            .iter()
            .flat_map(|root| store.subtree_ids(*root))
            .collect()
    }

    fn push_command(writer: &mut FrameWriter, record: &Record) {
        if let Err(e) = writer.push(record) {
            log::error!("Could not write {record:?}, reason='{e}'");
        }
    }

    /// A blob too large for one datagram is written again without its variable length
    /// attributes, child order and sort order and the kind attributes. Those are lost.
    fn write_sprite(writer: &mut FrameWriter, store: &SpriteStore, registry: &BlobRegistry, id: SpriteId, mask: AttributeMask) {
        let Some(sprite) = store.get(id) else {
            return;
        };
        let result = registry.write_blob(sprite, mask, writer.record_buffer())
            .and_then(|()| writer.commit_record());

        match result {
            Ok(()) => {},
            Err(ProtocolError::RecordTooLarge { size, limit }) => {
                let variable = sprite.all_attributes()
                    .without(AttributeMask::from_ids(&attribute::BASE))
                    .union(AttributeMask::from_ids(&[attribute::CHILD_ORDER, attribute::SORT_ORDER]));
                let compact = mask.without(variable);
                log::warn!("Sprite {id} blob of {size} bytes exceeds {limit}, dropped attributes {:?}", mask.without(compact));
                let retry = registry.write_blob(sprite, compact, writer.record_buffer())
                    .and_then(|()| writer.commit_record());
                if let Err(e) = retry {
                    log::error!("Could not serialize sprite {id}, reason='{e}'");
                    writer.discard_record();
                }
            },
            Err(e) => {
                log::error!("Could not serialize sprite {id}, reason='{e}'");
                writer.discard_record();
            },
        }
    }
}
