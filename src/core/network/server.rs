//! TCP and UDP endpoints behind the publisher's `Server` trait.
//!
//! Only one client is tracked at a time. For TCP the most recently accepted
//! connection receives outbound bytes; for UDP it is the sender of the last
//! datagram.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::publish::server::{Server, ServerError, Transport};
use crate::core::streams::receiver_stream;
use crate::utils::lock;

/// Largest read handed to the bridge in one piece.
pub const DEFAULT_CHUNK_SIZE: usize = 65535;

#[derive(Clone)]
enum Peer {
    Tcp(mpsc::UnboundedSender<Vec<u8>>),
    Udp { socket: Arc<UdpSocket>, addr: SocketAddr },
}

struct Running {
    cancel_token: CancellationToken,
    peer: Arc<Mutex<Option<Peer>>>,
    local_addr: SocketAddr,
}

pub struct NetworkServer {
    chunk_size: usize,
    running: Mutex<Option<Running>>,
}

impl Default for NetworkServer {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl NetworkServer {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size: chunk_size.max(1), running: Mutex::new(None) }
    }

    /// Address the running server is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.running).as_ref().map(|running| running.local_addr)
    }

    async fn accept_loop(
        listener: TcpListener,
        inbound: mpsc::UnboundedSender<Vec<u8>>,
        peer: Arc<Mutex<Option<Peer>>>,
        cancel_token: CancellationToken,
        chunk_size: usize,
    ) {
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        info!("Accepted connection from {}", addr);
                        let (reader, writer) = stream.into_split();
                        let (outbound, queue) = mpsc::unbounded_channel();
                        // Replacing the sender ends the previous writer.
                        *lock(&peer) = Some(Peer::Tcp(outbound));
                        tokio::spawn(Self::write_loop(writer, queue, cancel_token.clone()));
                        tokio::spawn(Self::read_loop(reader, inbound.clone(), cancel_token.clone(), chunk_size));
                    }
                    Err(e) => warn!("Accept failed: {}", e),
                },
            }
        }
        debug!("TCP accept loop stopped");
    }

    async fn read_loop(
        mut reader: OwnedReadHalf,
        inbound: mpsc::UnboundedSender<Vec<u8>>,
        cancel_token: CancellationToken,
        chunk_size: usize,
    ) {
        let mut buffer = vec![0u8; chunk_size];
        loop {
            let read = tokio::select! {
                _ = cancel_token.cancelled() => break,
                read = reader.read(&mut buffer) => read,
            };
            match read {
                Ok(0) => {
                    info!("Client closed the connection");
                    break;
                }
                Ok(n) => {
                    if inbound.send(buffer[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Read failed: {}", e);
                    break;
                }
            }
        }
    }

    async fn write_loop(
        mut writer: OwnedWriteHalf,
        mut queue: mpsc::UnboundedReceiver<Vec<u8>>,
        cancel_token: CancellationToken,
    ) {
        loop {
            let data = tokio::select! {
                _ = cancel_token.cancelled() => break,
                data = queue.recv() => match data {
                    Some(data) => data,
                    None => break,
                },
            };
            if let Err(e) = writer.write_all(&data).await {
                warn!("Write failed: {}", e);
                break;
            }
        }
    }

    async fn receive_loop(
        socket: Arc<UdpSocket>,
        inbound: mpsc::UnboundedSender<Vec<u8>>,
        peer: Arc<Mutex<Option<Peer>>>,
        cancel_token: CancellationToken,
        chunk_size: usize,
    ) {
        let mut buffer = vec![0u8; chunk_size];
        loop {
            let received = tokio::select! {
                _ = cancel_token.cancelled() => break,
                received = socket.recv_from(&mut buffer) => received,
            };
            match received {
                Ok((n, addr)) => {
                    *lock(&peer) = Some(Peer::Udp { socket: socket.clone(), addr });
                    if n == 0 {
                        continue;
                    }
                    if inbound.send(buffer[..n].to_vec()).is_err() {
                        break;
                    }
                }
                // A failed receive does not end the server.
                Err(e) => debug!("Receive failed: {}", e),
            }
        }
        debug!("UDP receive loop stopped");
    }
}

#[async_trait]
impl Server for NetworkServer {
    async fn start(
        &self,
        transport: Transport,
        port: u16,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Vec<u8>>, ServerError> {
        self.stop();

        let bind_error = |source| ServerError::Bind { port, source };
        let cancel_token = cancel.child_token();
        let peer = Arc::new(Mutex::new(None));
        let (inbound, received) = mpsc::unbounded_channel();

        let local_addr = match transport {
            Transport::Tcp => {
                let listener = TcpListener::bind(("0.0.0.0", port)).await.map_err(bind_error)?;
                let local_addr = listener.local_addr().map_err(bind_error)?;
                tokio::spawn(Self::accept_loop(
                    listener,
                    inbound,
                    peer.clone(),
                    cancel_token.clone(),
                    self.chunk_size,
                ));
                local_addr
            }
            Transport::Udp => {
                let socket = UdpSocket::bind(("0.0.0.0", port)).await.map_err(bind_error)?;
                let local_addr = socket.local_addr().map_err(bind_error)?;
                tokio::spawn(Self::receive_loop(
                    Arc::new(socket),
                    inbound,
                    peer.clone(),
                    cancel_token.clone(),
                    self.chunk_size,
                ));
                local_addr
            }
        };
        // Checked under the lock that `stop` takes.
        let mut running = lock(&self.running);
        if cancel_token.is_cancelled() {
            info!("Server on {} cancelled while starting", local_addr);
            return Ok(receiver_stream(received));
        }
        info!("Server listening on {:?} {}", transport, local_addr);
        *running = Some(Running { cancel_token, peer, local_addr });
        Ok(receiver_stream(received))
    }

    fn stop(&self) {
        if let Some(running) = lock(&self.running).take() {
            info!("Stopping server on {}", running.local_addr);
            running.cancel_token.cancel();
        }
    }

    fn send(&self, data: Vec<u8>) {
        let peer = lock(&self.running)
            .as_ref()
            .and_then(|running| lock(&running.peer).clone());
        match peer {
            Some(Peer::Tcp(outbound)) => {
                if outbound.send(data).is_err() {
                    debug!("Connection gone, dropping bytes");
                }
            }
            Some(Peer::Udp { socket, addr }) => {
                if let Err(e) = socket.try_send_to(&data, addr) {
                    warn!("Send to {} failed: {}", addr, e);
                }
            }
            None => debug!("No client connected, dropping {} bytes", data.len()),
        }
    }
}
