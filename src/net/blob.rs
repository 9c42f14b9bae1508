use crate::ui::sprite::{
    attribute,
    AttributeApply,
    AttributeMask,
    Sprite,
    SpriteId,
    SpriteKindTag,
    SpriteStore,
    TreeError
};

use super::{
    attribute::{
        read_attribute,
        AttrValue,
        TERMINATOR
    },
    data_buffer::DataBuffer,
    ProtocolError
};

pub type BlobType = u8;

pub const FIRST_BLOB_TYPE: BlobType = 1;
/// Codes above this are reserved for frame commands.
pub const LAST_BLOB_TYPE: BlobType = 0xEF;

/// Server role: writes the attributes in the mask for one sprite.
pub type EmitBlobFn = fn(&Sprite, AttributeMask, &mut DataBuffer);

/// Client role: applies a parsed blob of the registered kind to the replica tree.
pub type ConsumeBlobFn = fn(&mut SpriteStore, SpriteKindTag, &ParsedBlob) -> Result<BlobApply, ProtocolError>;

#[derive(Debug, Clone, Copy)]
pub struct BlobHandlers {
    pub emit: EmitBlobFn,
    pub consume: ConsumeBlobFn,
}

impl BlobHandlers {
    /// Handlers every built in kind uses: the sprite writes its own attributes and
    /// replicas are created or updated through the store.
    pub fn sprite() -> Self {
        Self {
            emit: emit_sprite_blob,
            consume: consume_sprite_blob,
        }
    }
}

/// Blob type ids in registration order. Server and client must register the same kinds
/// in the same order.
#[derive(Debug, Clone, Default)]
pub struct BlobRegistry {
    entries: Vec<(SpriteKindTag, BlobHandlers)>,
}

impl BlobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_kinds() -> Self {
        let mut registry = Self::new();
        for kind in SpriteKindTag::ALL {
            // Four kinds always fit the type range.
            let _ = registry.register(kind, BlobHandlers::sprite());
        }
        registry
    }

    pub fn register(&mut self, kind: SpriteKindTag, handlers: BlobHandlers) -> Result<BlobType, ProtocolError> {
        if let Some(existing) = self.blob_type(kind) {
            log::warn!("Blob kind {kind:?} already registered as {existing}");
            return Ok(existing);
        }
        let blob_type = usize::from(FIRST_BLOB_TYPE) + self.entries.len();
        if blob_type > usize::from(LAST_BLOB_TYPE) {
            return Err(ProtocolError::RegistryFull);
        }
        self.entries.push((kind, handlers));
        log::debug!("Registered blob type {blob_type} for {kind:?}");
        Ok(blob_type as BlobType)
    }

    /// Server emit lookup.
    pub fn blob_type(&self, kind: SpriteKindTag) -> Option<BlobType> {
        self.entries
            .iter()
            .position(|(registered, _)| *registered == kind)
            .map(|index| FIRST_BLOB_TYPE + index as BlobType)
    }

    /// Client consume lookup.
    pub fn handlers(&self, blob_type: BlobType) -> Option<(SpriteKindTag, BlobHandlers)> {
        let index = usize::from(blob_type.checked_sub(FIRST_BLOB_TYPE)?);
        self.entries.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes a complete blob record for `sprite`: type, id, attributes, terminator.
    pub fn write_blob(&self, sprite: &Sprite, mask: AttributeMask, buffer: &mut DataBuffer) -> Result<(), ProtocolError> {
        let kind = sprite.kind().tag();
        let blob_type = self.blob_type(kind).ok_or(ProtocolError::KindMismatch(sprite.id()))?;
        let (_, handlers) = self.handlers(blob_type).ok_or(ProtocolError::UnknownBlobType(blob_type))?;
        buffer.write_u8(blob_type);
        buffer.write_u32(sprite.id());
        (handlers.emit)(sprite, mask, buffer);
        buffer.write_u8(TERMINATOR);
        Ok(())
    }
}

/// A blob read completely off the wire, not yet applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBlob {
    pub blob_type: BlobType,
    pub sprite_id: SpriteId,
    pub attributes: Vec<(u8, AttrValue)>,
}

impl ParsedBlob {
    /// Reads the body after the type byte. Attribute payloads are self describing, so
    /// blobs of unknown types are parsed the same way and can be skipped whole.
    pub fn read(blob_type: BlobType, buffer: &mut DataBuffer) -> Result<Self, ProtocolError> {
        let sprite_id = buffer.read_u32()?;
        let mut attributes = vec![];
        while let Some(attribute) = read_attribute(buffer)? {
            attributes.push(attribute);
        }
        Ok(Self { blob_type, sprite_id, attributes })
    }

    pub fn get(&self, id: u8) -> Option<&AttrValue> {
        self.attributes
            .iter()
            .rev()
            .find(|(attribute_id, _)| *attribute_id == id)
            .map(|(_, value)| value)
    }

    pub fn parent(&self) -> Option<SpriteId> {
        self.get(attribute::PARENT).and_then(AttrValue::as_u32)
    }

    pub fn child_order(&self) -> Option<&[SpriteId]> {
        self.get(attribute::CHILD_ORDER).and_then(AttrValue::as_id_list)
    }
}

/// What applying one blob did to the tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlobApply {
    pub created: bool,
    pub applied: usize,
    pub skipped: usize,
    /// Child order to re-apply once the whole frame is in, children may arrive later.
    pub child_order: Option<Vec<SpriteId>>,
}

fn emit_sprite_blob(sprite: &Sprite, mask: AttributeMask, buffer: &mut DataBuffer) {
    sprite.write_attributes(mask, buffer);
}

fn consume_sprite_blob(store: &mut SpriteStore, kind: SpriteKindTag, blob: &ParsedBlob) -> Result<BlobApply, ProtocolError> {
    let id = blob.sprite_id;
    let mut result = BlobApply::default();

    match store.get(id) {
        None => {
            let parent = blob.parent().ok_or(ProtocolError::MissingParent(id))?;
            if !store.contains(parent) {
                return Err(ProtocolError::UnknownParent { sprite: id, parent });
            }
            store.insert_replica(id, parent, kind.make())?;
            result.created = true;
        },
        Some(sprite) => {
            if sprite.kind().tag() != kind {
                return Err(ProtocolError::KindMismatch(id));
            }
            if let Some(parent) = blob.parent() {
                if sprite.parent() != Some(parent) {
                    if !store.contains(parent) {
                        return Err(ProtocolError::UnknownParent { sprite: id, parent });
                    }
                    store.reparent(id, parent)?;
                }
            }
        },
    }

    apply_attributes(store, blob, &mut result)?;
    Ok(result)
}

fn apply_attributes(store: &mut SpriteStore, blob: &ParsedBlob, result: &mut BlobApply) -> Result<(), ProtocolError> {
    let id = blob.sprite_id;
    for (attribute_id, value) in blob.attributes.iter() {
        match *attribute_id {
            attribute::PARENT => {},
            attribute::CHILD_ORDER => {
                if let Some(order) = value.as_id_list() {
                    store.apply_child_order(id, order)?;
                    result.child_order = Some(order.to_vec());
                    result.applied += 1;
                } else {
                    result.skipped += 1;
                }
            },
            attribute_id => {
                let sprite = store.get_mut(id).ok_or(TreeError::SpriteNotExist(id))?;
                match sprite.apply_attribute(attribute_id, value) {
                    AttributeApply::Applied => result.applied += 1,
                    AttributeApply::Unknown => {
                        log::trace!("Sprite {id} skipped unknown attribute {attribute_id}");
                        result.skipped += 1;
                    },
                    AttributeApply::TypeMismatch => {
                        log::warn!("Sprite {id} attribute {attribute_id} has unexpected payload {value:?}");
                        result.skipped += 1;
                    },
                }
            },
        }
    }
    Ok(())
}

/// Client side: applies a blob received from the server, creating the replica if needed.
pub fn handle_blob_from_server(
    registry: &BlobRegistry,
    store: &mut SpriteStore,
    blob: &ParsedBlob
) -> Result<BlobApply, ProtocolError> {
    let (kind, handlers) = registry.handlers(blob.blob_type)
        .ok_or(ProtocolError::UnknownBlobType(blob.blob_type))?;
    (handlers.consume)(store, kind, blob)
}

/// Server side: applies a change a client reported. Clients never create or move sprites.
pub fn handle_blob_from_client(
    registry: &BlobRegistry,
    store: &mut SpriteStore,
    blob: &ParsedBlob
) -> Result<BlobApply, ProtocolError> {
    let (kind, _) = registry.handlers(blob.blob_type)
        .ok_or(ProtocolError::UnknownBlobType(blob.blob_type))?;
    let sprite = store.get(blob.sprite_id)
        .ok_or(TreeError::SpriteNotExist(blob.sprite_id))?;
    if sprite.kind().tag() != kind {
        return Err(ProtocolError::KindMismatch(blob.sprite_id));
    }

    let mut result = BlobApply::default();
    let reported = ParsedBlob {
        blob_type: blob.blob_type,
        sprite_id: blob.sprite_id,
        attributes: blob.attributes
            .iter()
            .filter(|(id, _)| *id != attribute::PARENT && *id != attribute::CHILD_ORDER)
            .cloned()
            .collect(),
    };
    apply_attributes(store, &reported, &mut result)?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use crate::ui::sprite::{
        Circle,
        DirtyChannel,
        SpriteKind
    };

    fn blob_for(registry: &BlobRegistry, store: &SpriteStore, id: SpriteId) -> ParsedBlob {
        let sprite = store.get(id).unwrap();
        let mut buffer = DataBuffer::new();
        registry.write_blob(sprite, sprite.all_attributes(), &mut buffer).unwrap();
        let blob_type = buffer.read_u8().unwrap();
        ParsedBlob::read(blob_type, &mut buffer).unwrap()
    }

    #[test]
    fn test_registry_assigns_types_in_order() {
        let registry = BlobRegistry::with_builtin_kinds();
        assert_eq!(registry.blob_type(SpriteKindTag::Plain), Some(1));
        assert_eq!(registry.blob_type(SpriteKindTag::Image), Some(4));
        assert_eq!(registry.handlers(2).map(|(kind, _)| kind), Some(SpriteKindTag::Circle));
        assert!(registry.handlers(0).is_none());
        assert!(registry.handlers(5).is_none());
    }

    #[test]
    fn test_client_creates_replica_under_known_parent() {
        let registry = BlobRegistry::with_builtin_kinds();
        let mut server = SpriteStore::new();
        let root = server.create_root(false);
        let id = server.create(root, SpriteKind::Circle(Circle::new(false, 7.0))).unwrap();
        server.get_mut(id).unwrap().set_position(Vec3::new(3.0, 4.0, 0.0));

        let mut client = SpriteStore::new();
        client.create_root(false);
        let blob = blob_for(&registry, &server, id);

        let result = handle_blob_from_server(&registry, &mut client, &blob).unwrap();
        assert!(result.created);
        let replica = client.get(id).unwrap();
        assert_eq!(replica.parent(), Some(root));
        assert_eq!(replica.position(), Vec3::new(3.0, 4.0, 0.0));
        assert_eq!(replica.kind(), server.get(id).unwrap().kind());
    }

    #[test]
    fn test_applying_blob_twice_is_idempotent() {
        let registry = BlobRegistry::with_builtin_kinds();
        let mut server = SpriteStore::new();
        let root = server.create_root(false);
        let id = server.create(root, SpriteKind::Plain).unwrap();
        server.get_mut(id).unwrap().set_opacity(0.3);
        let blob = blob_for(&registry, &server, id);

        let mut client = SpriteStore::new();
        client.create_root(false);
        handle_blob_from_server(&registry, &mut client, &blob).unwrap();
        let once = client.get(id).unwrap().clone();
        let second = handle_blob_from_server(&registry, &mut client, &blob).unwrap();
        let twice = client.get(id).unwrap();

        assert!(!second.created);
        assert_eq!(once.opacity(), twice.opacity());
        assert_eq!(once.position(), twice.position());
        assert_eq!(once.flags(), twice.flags());
        assert_eq!(client.len(), 2);
    }

    #[test]
    fn test_unknown_parent_is_rejected() {
        let registry = BlobRegistry::with_builtin_kinds();
        let mut client = SpriteStore::new();
        client.create_root(false);
        let blob = ParsedBlob {
            blob_type: 1,
            sprite_id: 50,
            attributes: vec![(attribute::PARENT, AttrValue::U32(49))],
        };
        assert_eq!(
            handle_blob_from_server(&registry, &mut client, &blob),
            Err(ProtocolError::UnknownParent { sprite: 50, parent: 49 })
        );
        assert!(!client.contains(50));
    }

    #[test]
    fn test_unknown_attribute_is_skipped() {
        let registry = BlobRegistry::with_builtin_kinds();
        let mut client = SpriteStore::new();
        let root = client.create_root(false);
        let blob = ParsedBlob {
            blob_type: 1,
            sprite_id: root,
            attributes: vec![
                (60, AttrValue::Str("future".to_string())),
                (attribute::OPACITY, AttrValue::F32(0.5)),
            ],
        };
        let result = handle_blob_from_server(&registry, &mut client, &blob).unwrap();
        assert_eq!(result.skipped, 1);
        assert_eq!(client.get(root).unwrap().opacity(), 0.5);
    }

    #[test]
    fn test_client_report_cannot_move_sprite() {
        let registry = BlobRegistry::with_builtin_kinds();
        let mut server = SpriteStore::new();
        let root = server.create_root(false);
        let a = server.create(root, SpriteKind::Plain).unwrap();
        let b = server.create(root, SpriteKind::Plain).unwrap();
        server.clear_dirty(DirtyChannel::Client);

        let report = ParsedBlob {
            blob_type: 1,
            sprite_id: b,
            attributes: vec![
                (attribute::PARENT, AttrValue::U32(a)),
                (attribute::POSITION, AttrValue::Vec3(Vec3::new(1.0, 1.0, 0.0))),
            ],
        };
        handle_blob_from_client(&registry, &mut server, &report).unwrap();
        let sprite = server.get(b).unwrap();
        assert_eq!(sprite.parent(), Some(root));
        assert_eq!(sprite.position(), Vec3::new(1.0, 1.0, 0.0));
        assert!(sprite.dirty(DirtyChannel::Client).contains(attribute::POSITION), "report is forwarded to other clients");
    }
}
