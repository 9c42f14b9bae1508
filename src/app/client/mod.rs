use std::{
    net::SocketAddr,
    time::{
        Duration,
        Instant
    }
};

use crate::{
    net::{
        blob::BlobRegistry,
        frame::Record,
        receiver::{
            EngineReceiver,
            ReceiveReport
        },
        sender::EngineSender,
        udp::UdpConnection
    },
    ui::{
        draw::DrawTarget,
        sprite::DirtyChannel
    }
};

use super::{
    engine::Engine,
    EngineError,
    EngineRole
};

/// Minimum time between two world requests.
const WORLD_REQUEST_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Deltas are ignored until a full world arrives.
    AwaitingWorld,
    Running,
}

/// Running totals of what the client received.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ClientStats {
    pub frames: usize,
    pub datagrams: usize,
    pub stale: usize,
    pub malformed: usize,
    pub blobs_applied: usize,
    pub blobs_dropped: usize,
    pub worlds: usize,
    pub world_requests: usize,
    pub sprites: usize,
    pub last_frame: Option<u32>,
}

impl ClientStats {
    fn add(&mut self, report: &ReceiveReport) {
        self.datagrams += report.datagrams;
        self.stale += report.stale;
        self.malformed += report.malformed;
        self.blobs_applied += report.blobs_applied;
        self.blobs_dropped += report.blobs_dropped;
        if report.world_received {
            self.worlds += 1;
        }
    }
}

impl std::fmt::Display for ClientStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let last_frame = self.last_frame.map_or_else(|| "-".to_string(), |frame| frame.to_string());
        write!(
            f,
            "[{}] frame={last_frame} sprites={} datagrams={} blobs={} dropped={} stale={} malformed={} worlds={}",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            self.sprites,
            self.datagrams,
            self.blobs_applied,
            self.blobs_dropped,
            self.stale,
            self.malformed,
            self.worlds
        )
    }
}

/// Rendering side: mirrors the server's tree and sends back server bound changes.
pub struct EngineClient {
    engine: Engine,
    connection: UdpConnection,
    server: SocketAddr,
    registry: BlobRegistry,
    sender: EngineSender,
    receiver: EngineReceiver,
    frame: u32,
    last_world_request: Option<Instant>,
    stats: ClientStats,
}

impl EngineClient {
    /// Binds an ephemeral port and asks the server for the world.
    pub async fn connect(engine: Engine, server: SocketAddr) -> Result<Self, EngineError> {
        let local = if server.ip().is_loopback() { "127.0.0.1:0" } else { "0.0.0.0:0" };
        Self::connect_from(engine, local, server).await
    }

    pub async fn connect_from<A: tokio::net::ToSocketAddrs>(engine: Engine, local: A, server: SocketAddr) -> Result<Self, EngineError> {
        if engine.role() != EngineRole::Client {
            log::warn!("Client connected around a {:?} engine", engine.role());
        }
        let connection = UdpConnection::bind(local).await?;
        log::info!("Client {} attempts to sync with server {server}...", connection.get_local_address()?);

        let mut client = Self {
            engine,
            connection,
            server,
            registry: BlobRegistry::with_builtin_kinds(),
            sender: EngineSender::default(),
            receiver: EngineReceiver::new(),
            frame: 0,
            last_world_request: None,
            stats: ClientStats::default(),
        };
        client.request_world()?;
        Ok(client)
    }

    pub fn get_local_address(&self) -> Result<SocketAddr, EngineError> {
        Ok(self.connection.get_local_address()?)
    }

    pub fn server_address(&self) -> SocketAddr {
        self.server
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn registry_mut(&mut self) -> &mut BlobRegistry {
        &mut self.registry
    }

    pub fn state(&self) -> ClientState {
        if self.receiver.is_awaiting_world() {
            ClientState::AwaitingWorld
        } else {
            ClientState::Running
        }
    }

    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }

    /// Sends `RequestWorld`, at most once per [`WORLD_REQUEST_INTERVAL`]. `false` when rate
    /// limited or when the socket dropped the request.
    pub fn request_world(&mut self) -> Result<bool, EngineError> {
        if self.last_world_request.is_some_and(|last| last.elapsed() < WORLD_REQUEST_INTERVAL) {
            return Ok(false);
        }
        let mut sent = true;
        for datagram in self.sender.command_frame(self.frame, &Record::RequestWorld) {
            sent &= self.connection.send_to(&datagram, self.server)?;
        }
        self.frame = self.frame.wrapping_add(1);
        if !sent {
            return Ok(false);
        }
        self.last_world_request = Some(Instant::now());
        self.stats.world_requests += 1;
        log::debug!("World requested from {}", self.server);
        Ok(true)
    }

    /// Applies what arrived from the server, updates the engine and sends server bound
    /// changes back.
    pub fn step(&mut self) -> ReceiveReport {
        let mut report = ReceiveReport::default();
        for (bytes, from) in self.connection.drain() {
            if from != self.server {
                log::trace!("Ignored datagram from {from}");
                continue;
            }
            self.receiver.receive_from_server(&bytes, self.engine.store_mut(), &self.registry, &mut report);
        }
        self.receiver.finish_frame(self.engine.store_mut());

        if report.needs_world || self.receiver.is_awaiting_world() {
            if let Err(e) = self.request_world() {
                log::warn!("Could not request world, reason='{e}'");
            }
        }

        self.engine.update();

        let datagrams = self.sender.dirty_frame(
            self.frame,
            self.engine.store_mut(),
            &self.registry,
            DirtyChannel::Server,
            &[]
        );
        if !datagrams.is_empty() {
            for datagram in datagrams.iter() {
                if let Err(e) = self.connection.send_to(datagram, self.server) {
                    log::warn!("Could not send to server, reason='{e}'");
                }
            }
            self.frame = self.frame.wrapping_add(1);
        }

        self.stats.frames += 1;
        self.stats.add(&report);
        self.stats.sprites = self.engine.store().len();
        self.stats.last_frame = self.receiver.last_frame();
        report
    }

    pub fn draw(&mut self, target: &mut dyn DrawTarget) {
        self.engine.draw(target);
    }

    /// Steps once per frame interval until `shutdown` fires. `on_frame` runs after each
    /// step, typically to draw.
    pub async fn run<F>(mut self, mut shutdown: tokio::sync::oneshot::Receiver<()>, mut on_frame: F) -> Self
    where
        F: FnMut(&mut EngineClient)
    {
        let frame_duration = self.engine.settings().frame_duration().max(Duration::from_millis(1));
        let mut interval = tokio::time::interval(frame_duration);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::debug!("Received client shut down signal...");
                    break;
                },
                _ = interval.tick() => {
                    self.step();
                    on_frame(&mut self);
                },
            }
        }
        log::info!("Client stopped, {}", self.stats);
        self
    }
}
