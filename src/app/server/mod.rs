use std::{
    net::SocketAddr,
    time::Duration
};

use crate::{
    net::{
        blob::BlobRegistry,
        receiver::{
            receive_from_client,
            ReceiveReport
        },
        sender::EngineSender,
        udp::UdpConnection
    },
    ui::sprite::DirtyChannel
};

use super::{
    engine::Engine,
    EngineError,
    EngineRole
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Sends what changed since the last frame.
    Running,
    /// The next frame is a full snapshot.
    SendWorld,
}

/// What one server frame did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ServerFrame {
    pub frame: u32,
    pub world: bool,
    pub datagrams: usize,
    pub bytes: usize,
    pub received: ReceiveReport,
}

/// Authoritative side: runs the engine and streams its tree to every client.
pub struct EngineServer {
    engine: Engine,
    connection: UdpConnection,
    registry: BlobRegistry,
    sender: EngineSender,
    clients: Vec<SocketAddr>,
    state: ServerState,
    frame: u32,
    last_world_time: f64,
}

impl EngineServer {
    pub async fn bind_any_local(engine: Engine) -> Result<Self, EngineError> {
        Self::bind(engine, "127.0.0.1:0").await
    }

    pub async fn bind<A: tokio::net::ToSocketAddrs>(engine: Engine, addr: A) -> Result<Self, EngineError> {
        if engine.role() != EngineRole::Server {
            log::warn!("Server bound around a {:?} engine", engine.role());
        }
        let connection = UdpConnection::bind(addr).await?;
        log::info!("Server bound at {}", connection.get_local_address()?);
        Ok(Self {
            engine,
            connection,
            registry: BlobRegistry::with_builtin_kinds(),
            sender: EngineSender::default(),
            clients: vec![],
            state: ServerState::SendWorld,
            frame: 0,
            last_world_time: 0.0,
        })
    }

    pub fn get_local_address(&self) -> Result<SocketAddr, EngineError> {
        Ok(self.connection.get_local_address()?)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Kinds registered here must match the clients' registry, in order.
    pub fn registry_mut(&mut self) -> &mut BlobRegistry {
        &mut self.registry
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    pub fn clients(&self) -> &[SocketAddr] {
        &self.clients
    }

    /// Returns false when the address was already known.
    pub fn add_client(&mut self, address: SocketAddr) -> bool {
        if self.clients.contains(&address) {
            return false;
        }
        log::info!("Client {address} registered, count={}", self.clients.len() + 1);
        self.clients.push(address);
        true
    }

    pub fn request_world_send(&mut self) {
        if self.state != ServerState::SendWorld {
            log::debug!("World send requested");
            self.state = ServerState::SendWorld;
        }
    }

    /// Client frames, engine update, then one outgoing frame to every client.
    pub fn step(&mut self) -> ServerFrame {
        let mut received = ReceiveReport::default();
        for (bytes, from) in self.connection.drain() {
            let mut report = ReceiveReport::default();
            receive_from_client(&bytes, self.engine.store_mut(), &self.registry, &mut report);
            if report.request_world {
                self.add_client(from);
                self.request_world_send();
            }
            received.datagrams += report.datagrams;
            received.malformed += report.malformed;
            received.blobs_applied += report.blobs_applied;
            received.blobs_dropped += report.blobs_dropped;
            received.request_world |= report.request_world;
        }

        let params = self.engine.update();

        if let Some(interval) = self.engine.settings().world_resync_interval {
            if params.elapsed_time - self.last_world_time >= interval {
                self.request_world_send();
            }
        }

        let frame = self.frame;
        let world = self.state == ServerState::SendWorld;
        let store = self.engine.store_mut();
        let datagrams = match self.state {
            ServerState::SendWorld => {
                // A snapshot already reflects every delete.
                store.take_removed();
                self.state = ServerState::Running;
                self.last_world_time = params.elapsed_time;
                self.sender.world_frame(frame, store, &self.registry)
            },
            ServerState::Running => {
                let deletes = store.take_removed();
                self.sender.dirty_frame(frame, store, &self.registry, DirtyChannel::Client, &deletes)
            },
        };

        let mut bytes = 0;
        for datagram in datagrams.iter() {
            bytes += datagram.len();
            for client in self.clients.iter() {
                if let Err(e) = self.connection.send_to(datagram, *client) {
                    log::warn!("Could not send frame {frame} to {client}, reason='{e}'");
                }
            }
        }
        if !datagrams.is_empty() {
            log::trace!("Frame {frame}: {} datagrams, {bytes} bytes, world={world}", datagrams.len());
        }
        self.frame = self.frame.wrapping_add(1);

        ServerFrame {
            frame,
            world,
            datagrams: datagrams.len(),
            bytes,
            received,
        }
    }

    /// Steps once per frame interval until `shutdown` fires. `on_frame` runs before each
    /// step and is where the application changes the tree.
    pub async fn run<F>(mut self, mut shutdown: tokio::sync::oneshot::Receiver<()>, mut on_frame: F) -> Self
    where
        F: FnMut(&mut Engine)
    {
        let frame_duration = self.engine.settings().frame_duration().max(Duration::from_millis(1));
        let mut interval = tokio::time::interval(frame_duration);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        log::info!("Server running at {:.1} frames/s", 1.0 / frame_duration.as_secs_f64());

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::debug!("Received server shut down signal...");
                    break;
                },
                _ = interval.tick() => {
                    on_frame(&mut self.engine);
                    self.step();
                },
            }
        }
        log::info!("Server stopped after {} frames", self.frame);
        self
    }
}
