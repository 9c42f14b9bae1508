use crate::ui::sprite::{
    SpriteId,
    SpriteStore,
    TreeError
};

use super::{
    blob::{
        handle_blob_from_client,
        handle_blob_from_server,
        BlobRegistry
    },
    frame::{
        is_current_or_newer,
        Datagram,
        Record
    },
    ProtocolError
};

/// Totals over the datagrams handled in one frame step.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReceiveReport {
    pub datagrams: usize,
    pub stale: usize,
    pub malformed: usize,
    pub blobs_applied: usize,
    pub blobs_dropped: usize,
    pub created: usize,
    pub deleted: usize,
    pub world_received: bool,
    /// A blob referenced a parent this replica does not have.
    pub needs_world: bool,
    pub request_world: bool,
}

/// Client side consumer of server frames.
#[derive(Debug)]
pub struct EngineReceiver {
    last_frame: Option<u32>,
    awaiting_world: bool,
    pending_child_orders: Vec<(SpriteId, Vec<SpriteId>)>,
}

impl Default for EngineReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineReceiver {
    pub fn new() -> Self {
        Self {
            last_frame: None,
            awaiting_world: true,
            pending_child_orders: vec![],
        }
    }

    pub fn last_frame(&self) -> Option<u32> {
        self.last_frame
    }

    /// Until a full world arrives, delta frames are ignored.
    pub fn is_awaiting_world(&self) -> bool {
        self.awaiting_world
    }

    pub fn expect_world(&mut self) {
        self.awaiting_world = true;
    }

    pub fn receive_from_server(
        &mut self,
        bytes: &[u8],
        store: &mut SpriteStore,
        registry: &BlobRegistry,
        report: &mut ReceiveReport
    ) {
        report.datagrams += 1;
        let datagram = match Datagram::parse(bytes) {
            Ok(datagram) => datagram,
            Err(e) => {
                log::warn!("Dropped datagram of {} bytes, reason='{e}'", bytes.len());
                report.malformed += 1;
                return;
            },
        };

        let frame = datagram.header.frame;
        let starts_world = matches!(datagram.records.first(), Some(Record::ClearWorld));
        if !starts_world {
            if self.awaiting_world {
                log::trace!("Frame {frame} ignored while awaiting world");
                return;
            }
            if let Some(last) = self.last_frame {
                if !is_current_or_newer(frame, last) {
                    log::trace!("Stale frame {frame}, last applied {last}");
                    report.stale += 1;
                    return;
                }
            }
        }
        self.last_frame = Some(frame);

        for record in datagram.records.iter() {
            match record {
                Record::ClearWorld => {
                    self.clear_world(store);
                    report.world_received = true;
                },
                Record::DeleteSprite(id) => match store.remove(*id) {
                    Ok(_) => report.deleted += 1,
                    Err(TreeError::SpriteNotExist(_)) => log::trace!("Delete of unknown sprite {id}"),
                    Err(e) => log::warn!("Could not delete sprite {id}, reason='{e}'"),
                },
                Record::Blob(blob) => match handle_blob_from_server(registry, store, blob) {
                    Ok(result) => {
                        report.blobs_applied += 1;
                        if result.created {
                            report.created += 1;
                        }
                        if let Some(order) = result.child_order {
                            self.pending_child_orders.push((blob.sprite_id, order));
                        }
                    },
                    Err(e @ (ProtocolError::UnknownParent { .. } | ProtocolError::MissingParent(_))) => {
                        log::warn!("Dropped blob for sprite {}, reason='{e}'", blob.sprite_id);
                        report.blobs_dropped += 1;
                        report.needs_world = true;
                    },
                    Err(e) => {
                        log::warn!("Dropped blob for sprite {}, reason='{e}'", blob.sprite_id);
                        report.blobs_dropped += 1;
                    },
                },
                Record::RequestWorld => log::trace!("Ignoring world request from server"),
            }
        }

        if let Some(e) = datagram.error {
            log::warn!("Frame {frame} truncated, reason='{e}'");
            report.malformed += 1;
        }
        // Removed ids only matter to the side that owns the tree.
        store.take_removed();
    }

    /// Re-applies child orders seen this step, now that every child has arrived.
    pub fn finish_frame(&mut self, store: &mut SpriteStore) {
        for (id, order) in self.pending_child_orders.drain(..) {
            if let Err(e) = store.apply_child_order(id, &order) {
                log::trace!("Child order for {id} not applied, reason='{e}'");
            }
        }
    }

    fn clear_world(&mut self, store: &mut SpriteStore) {
        let roots = store.roots().to_vec();
        let mut released = 0;
        for root in roots {
            match store.clear_children(root) {
                Ok(count) => released += count,
                Err(e) => log::error!("Could not clear root {root}, reason='{e}'"),
            }
        }
        self.pending_child_orders.clear();
        self.awaiting_world = false;
        log::debug!("World cleared, released {released} sprites");
    }
}

/// Server side consumer of client frames.
pub fn receive_from_client(
    bytes: &[u8],
    store: &mut SpriteStore,
    registry: &BlobRegistry,
    report: &mut ReceiveReport
) {
    report.datagrams += 1;
    let datagram = match Datagram::parse(bytes) {
        Ok(datagram) => datagram,
        Err(e) => {
            log::warn!("Dropped client datagram of {} bytes, reason='{e}'", bytes.len());
            report.malformed += 1;
            return;
        },
    };

    for record in datagram.records.iter() {
        match record {
            Record::RequestWorld => report.request_world = true,
            Record::Blob(blob) => match handle_blob_from_client(registry, store, blob) {
                Ok(_) => report.blobs_applied += 1,
                Err(e) => {
                    log::warn!("Dropped client blob for sprite {}, reason='{e}'", blob.sprite_id);
                    report.blobs_dropped += 1;
                },
            },
            other => log::warn!("Clients may not send {other:?}"),
        }
    }

    if let Some(e) = datagram.error {
        log::warn!("Client frame truncated, reason='{e}'");
        report.malformed += 1;
    }
}
