use std::{
    net::SocketAddr,
    sync::Arc
};

use tokio::{
    net::UdpSocket,
    sync::mpsc
};

use super::NetworkError;

/// Datagrams waiting for the frame step. Beyond this, new datagrams are dropped.
const INCOMING_CAPACITY: usize = 1024;

const RECEIVE_BUFFER_SIZE: usize = 65536;

pub type Incoming = (Vec<u8>, SocketAddr);

/// UDP socket with a background receive task. Received bytes are queued and only read by
/// the frame step, never applied from the receive task.
pub struct UdpConnection {
    socket: Arc<UdpSocket>,
    incoming: mpsc::Receiver<Incoming>,
    receive_task_handler: tokio::task::JoinHandle<()>,
}

impl UdpConnection {
    pub async fn bind_any_local() -> Result<Self, NetworkError> {
        Self::bind("127.0.0.1:0").await
    }

    pub async fn bind<A: tokio::net::ToSocketAddrs>(addr: A) -> Result<Self, NetworkError> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        // Write readiness is unknown until polled once, `try_send_to` would refuse the
        // first datagram.
        socket.writable().await?;
        let (incoming_sender, incoming) = mpsc::channel(INCOMING_CAPACITY);
        let socket_shared = socket.clone();

        let receive_task_handler = tokio::spawn(async move {
            let mut buffer = vec![0u8; RECEIVE_BUFFER_SIZE];
            loop {
                match socket_shared.recv_from(&mut buffer).await {
                    Ok((length, from)) => {
                        match incoming_sender.try_send((buffer[..length].to_vec(), from)) {
                            Ok(()) => {},
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                log::warn!("Incoming queue full, dropped datagram from {from}");
                            },
                            Err(mpsc::error::TrySendError::Closed(_)) => {
                                log::debug!("Incoming queue closed, stopping receive task");
                                break;
                            },
                        }
                    },
                    Err(e) => {
                        // ICMP port unreachable surfaces here on some platforms when a peer is gone.
                        log::debug!("UDP receive error, reason='{e}'");
                    },
                }
            }
        });

        Ok(Self {
            socket,
            incoming,
            receive_task_handler,
        })
    }

    pub fn get_local_address(&self) -> Result<SocketAddr, NetworkError> {
        Ok(self.socket.local_addr()?)
    }

    /// Never waits. A datagram the socket cannot take right now is dropped and `false`
    /// returned.
    pub fn send_to(&self, bytes: &[u8], target: SocketAddr) -> Result<bool, NetworkError> {
        match self.socket.try_send_to(bytes, target) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                log::warn!("Socket busy, dropped {} bytes to {target}", bytes.len());
                Ok(false)
            },
            Err(e) => Err(e.into()),
        }
    }

    pub fn try_receive(&mut self) -> Option<Incoming> {
        self.incoming.try_recv().ok()
    }

    /// Everything queued since the last call.
    pub fn drain(&mut self) -> Vec<Incoming> {
        let mut received = vec![];
        while let Some(incoming) = self.try_receive() {
            received.push(incoming);
        }
        received
    }
}

impl Drop for UdpConnection {
    fn drop(&mut self) {
        self.receive_task_handler.abort();
    }
}

pub async fn resolve(address: &str) -> Result<SocketAddr, NetworkError> {
    tokio::net::lookup_host(address)
        .await?
        .next()
        .ok_or_else(|| NetworkError::AddressResolve(address.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_datagrams_are_queued_for_the_frame_step() {
        let mut receiver = UdpConnection::bind_any_local().await.unwrap();
        let sender = UdpConnection::bind_any_local().await.unwrap();
        let target = receiver.get_local_address().unwrap();

        sender.send_to(b"first", target).unwrap();
        sender.send_to(b"second", target).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let received: Vec<Vec<u8>> = receiver.drain().into_iter().map(|(bytes, _)| bytes).collect();
        assert_eq!(received, vec![b"first".to_vec(), b"second".to_vec()]);
        assert!(receiver.try_receive().is_none());
    }

    #[tokio::test]
    async fn test_first_send_after_bind_is_delivered() {
        let mut receiver = UdpConnection::bind_any_local().await.unwrap();
        let sender = UdpConnection::bind_any_local().await.unwrap();

        assert!(sender.send_to(b"hello", receiver.get_local_address().unwrap()).unwrap());
        tokio::time::sleep(Duration::from_millis(100)).await;

        let received = receiver.drain();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, b"hello".to_vec());
        assert_eq!(received[0].1, sender.get_local_address().unwrap());
    }

    #[tokio::test]
    async fn test_resolve_local_address() {
        let address = resolve("127.0.0.1:7000").await.unwrap();
        assert_eq!(address.port(), 7000);
    }
}
