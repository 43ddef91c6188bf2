//! Connection roster for the match server
//!
//! This module tracks every open connection, players and spectators alike:
//! - Connection identifiers, assigned in increasing order and never reused
//! - The bounded outbound queue feeding each connection's writer task
//! - Capacity enforcement for new connections
//! - Unicast and broadcast delivery of server packets
//!
//! A connection whose queue fills up is not reading. Delivery reports it as
//! stalled and the server drops it like any other disconnect.
//!
//! Slot ownership is not tracked here; the session decides who plays.

use crate::network::GameMessage;
use log::{debug, info};
use shared::Packet;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

/// Opaque identifier of a single connection
pub type ClientId = u32;

/// Packets buffered per connection before it counts as stalled, about four
/// seconds of snapshots at the default tick rate
pub const OUTBOUND_QUEUE_LEN: usize = 256;

/// Result of handing one packet to a connection's queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// The queue is full because the peer stopped reading
    Stalled,
    /// The writer is gone or the connection is unknown
    Closed,
}

/// An open connection and the queue of packets waiting to be written to it
#[derive(Debug)]
pub struct Client {
    /// Identifier assigned by the server
    pub id: ClientId,
    /// Remote address, for logging
    pub addr: SocketAddr,
    /// When the connection was accepted
    pub connected_at: Instant,
    /// Packets received from this connection
    pub packets_received: u64,
    outbound: mpsc::Sender<Packet>,
    tasks: Vec<JoinHandle<()>>,
}

impl Client {
    pub fn new(id: ClientId, addr: SocketAddr, outbound: mpsc::Sender<Packet>) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            packets_received: 0,
            outbound,
            tasks: Vec::new(),
        }
    }

    /// Queues a packet for the writer task without waiting.
    pub fn send(&self, packet: Packet) -> Delivery {
        match self.outbound.try_send(packet) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Stalled,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

impl Drop for Client {
    // A stalled writer may be parked on a full socket forever
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// All open connections, keyed by id so broadcasts go out in connection order
pub struct ClientManager {
    clients: BTreeMap<ClientId, Client>,
    next_client_id: ClientId,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: BTreeMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a new connection.
    ///
    /// Returns the assigned id, or None if the server is at capacity.
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        outbound: mpsc::Sender<Packet>,
    ) -> Option<ClientId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, outbound));

        Some(client_id)
    }

    /// Ties a connection's reader or writer task to its lifetime in the roster.
    pub fn attach_task(&mut self, client_id: ClientId, task: JoinHandle<()>) {
        match self.clients.get_mut(&client_id) {
            Some(client) => client.tasks.push(task),
            None => task.abort(),
        }
    }

    /// Forgets a connection and stops its tasks, closing the socket.
    pub fn remove_client(&mut self, client_id: &ClientId) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!(
                "Client {} disconnected after {:.1}s ({} packets)",
                client.id,
                client.connected_at.elapsed().as_secs_f32(),
                client.packets_received
            );
            true
        } else {
            false
        }
    }

    pub fn contains(&self, client_id: ClientId) -> bool {
        self.clients.contains_key(&client_id)
    }

    pub fn record_packet(&mut self, client_id: ClientId) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.packets_received += 1;
        }
    }

    pub fn send_to(&self, client_id: ClientId, packet: Packet) -> Delivery {
        match self.clients.get(&client_id) {
            Some(client) => client.send(packet),
            None => Delivery::Closed,
        }
    }

    /// Queues `packet` for every connection. Returns the stalled ones.
    pub fn broadcast(&self, packet: &Packet) -> Vec<ClientId> {
        let mut stalled = Vec::new();

        for client in self.clients.values() {
            match client.send(packet.clone()) {
                Delivery::Queued => {}
                Delivery::Stalled => stalled.push(client.id),
                Delivery::Closed => debug!("Writer for client {} already closed", client.id),
            }
        }

        stalled
    }

    /// Delivers one message produced by the session. Returns the connections
    /// whose queues were full.
    pub fn dispatch(&self, message: GameMessage) -> Vec<ClientId> {
        match message {
            GameMessage::SendPacket { packet, client_id } => {
                match self.send_to(client_id, packet) {
                    Delivery::Queued => Vec::new(),
                    Delivery::Stalled => vec![client_id],
                    Delivery::Closed => {
                        debug!("Dropped packet for departed client {}", client_id);
                        Vec::new()
                    }
                }
            }
            GameMessage::BroadcastPacket { packet } => self.broadcast(&packet),
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
