//! Server network layer handling TCP connections and session loop coordination

use crate::client_manager::{ClientId, ClientManager, OUTBOUND_QUEUE_LEN};
use crate::config::ServerConfig;
use crate::scheduler::SchedulerEvent;
use crate::session::Session;
use log::{debug, error, info, warn};
use shared::{read_packet, write_packet, Packet};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    ClientConnected {
        stream: TcpStream,
        addr: SocketAddr,
    },
    PacketReceived {
        client_id: ClientId,
        packet: Packet,
    },
    ClientDisconnected {
        client_id: ClientId,
    },
}

/// Messages sent from the session to connections
#[derive(Debug, Clone, PartialEq)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        client_id: ClientId,
    },
    BroadcastPacket {
        packet: Packet,
    },
}

/// Main server coordinating connections and the match session
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    clients: ClientManager,
    session: Session,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            clients: ClientManager::new(config.max_clients),
            session: Session::new(&config),
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns task that accepts connections and hands them to the main loop
    fn spawn_acceptor(&self, listener: TcpListener) {
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!("Failed to disable Nagle for {}: {}", addr, e);
                        }
                        if server_tx
                            .send(ServerMessage::ClientConnected { stream, addr })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that decodes packets from one connection
    ///
    /// End of stream, read errors and framing errors all end the task with a
    /// single `ClientDisconnected`.
    fn spawn_reader(
        mut reader: OwnedReadHalf,
        client_id: ClientId,
        server_tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match read_packet(&mut reader).await {
                    Ok(Some(packet)) => {
                        if server_tx
                            .send(ServerMessage::PacketReceived { client_id, packet })
                            .is_err()
                        {
                            return;
                        }
                    }
                    Ok(None) => {
                        debug!("Client {} closed the connection", client_id);
                        break;
                    }
                    Err(e) => {
                        warn!("Dropping client {}: {}", client_id, e);
                        break;
                    }
                }
            }

            if server_tx
                .send(ServerMessage::ClientDisconnected { client_id })
                .is_err()
            {
                debug!("Server loop gone before client {} disconnect", client_id);
            }
        })
    }

    /// Spawns task that writes queued packets to one connection
    fn spawn_writer(
        mut writer: OwnedWriteHalf,
        client_id: ClientId,
        mut outbound: mpsc::Receiver<Packet>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(packet) = outbound.recv().await {
                if let Err(e) = write_packet(&mut writer, &packet).await {
                    debug!("Failed to send to client {}: {}", client_id, e);
                    break;
                }
            }

            if let Err(e) = writer.shutdown().await {
                debug!("Failed to close connection of client {}: {}", client_id, e);
            }
        })
    }

    fn refuse_connection(mut stream: TcpStream, addr: SocketAddr) {
        warn!("Refusing connection from {}: server full", addr);

        tokio::spawn(async move {
            let packet = Packet::Disconnected {
                reason: "Server full".to_string(),
            };
            if let Err(e) = write_packet(&mut stream, &packet).await {
                debug!("Failed to notify {}: {}", addr, e);
            }
            if let Err(e) = stream.shutdown().await {
                debug!("Failed to close connection from {}: {}", addr, e);
            }
        });
    }

    fn accept_client(&mut self, stream: TcpStream, addr: SocketAddr) {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_LEN);

        match self.clients.add_client(addr, outbound_tx) {
            Some(client_id) => {
                let (reader, writer) = stream.into_split();
                let reader = Self::spawn_reader(reader, client_id, self.server_tx.clone());
                let writer = Self::spawn_writer(writer, client_id, outbound_rx);
                self.clients.attach_task(client_id, reader);
                self.clients.attach_task(client_id, writer);
                self.session.on_connect(client_id);
            }
            None => Self::refuse_connection(stream, addr),
        }
    }

    fn disconnect_client(&mut self, client_id: ClientId) {
        // Readers report every close, including connections already removed
        if self.clients.remove_client(&client_id) {
            self.session.on_disconnect(client_id);

            if self.clients.is_empty() {
                info!("No clients connected");
            }
        }
    }

    /// Processes incoming packets and updates session state
    fn handle_packet(&mut self, client_id: ClientId, packet: Packet) {
        if !self.clients.contains(client_id) {
            debug!("Ignoring packet from departed client {}", client_id);
            return;
        }

        self.clients.record_packet(client_id);

        match packet {
            Packet::Disconnect => self.disconnect_client(client_id),
            packet if packet.is_client_command() => self.session.handle_packet(client_id, packet),
            _ => warn!("Unexpected packet type from client {}", client_id),
        }
    }

    fn handle_server_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::ClientConnected { stream, addr } => self.accept_client(stream, addr),
            ServerMessage::PacketReceived { client_id, packet } => {
                self.handle_packet(client_id, packet)
            }
            ServerMessage::ClientDisconnected { client_id } => self.disconnect_client(client_id),
        }
    }

    /// Applies everything that arrived before this tick so it sees current input
    fn drain_pending_messages(&mut self) {
        while let Ok(message) = self.server_rx.try_recv() {
            self.handle_server_message(message);
        }
    }

    /// Hands the session's queued packets to the connections.
    ///
    /// Connections that stopped reading are dropped, and the packets their
    /// departure produces are delivered in turn.
    fn flush_outbox(&mut self) {
        loop {
            let messages = self.session.drain_outbox();
            if messages.is_empty() {
                break;
            }

            let mut stalled = Vec::new();
            for message in messages {
                stalled.extend(self.clients.dispatch(message));
            }
            stalled.sort_unstable();
            stalled.dedup();

            for client_id in stalled {
                warn!("Client {} stopped reading, dropping it", client_id);
                self.disconnect_client(client_id);
            }
        }
    }

    fn log_tick_stats(&self) {
        let simulation = self.session.simulation();
        let tick = simulation.tick();

        if self.session.is_running() && tick % simulation.config().tick_rate == 0 {
            let score = simulation.score();
            debug!(
                "Tick {}: {} clients, score {} - {}",
                tick,
                self.clients.len(),
                score.player1,
                score.player2
            );
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> io::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "server is already running"))?;
        self.spawn_acceptor(listener);

        info!(
            "Server started successfully ({:?} per tick)",
            self.session.scheduler().period()
        );

        loop {
            tokio::select! {
                // Handle network events; the server holds a sender, so the
                // channel never closes
                Some(message) = self.server_rx.recv() => {
                    self.handle_server_message(message);
                },

                // Handle ticks and restarts
                event = self.session.next_event() => {
                    if event == SchedulerEvent::Tick {
                        self.drain_pending_messages();
                    }
                    self.session.handle_scheduler_event(event);

                    if event == SchedulerEvent::Tick {
                        self.log_tick_stats();
                    }
                },
            }

            self.flush_outbox();
        }
    }
}
