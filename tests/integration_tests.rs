//! Integration tests for the match server
//!
//! These tests run a real server on an ephemeral port and talk to it over TCP
//! with the same framing the bot client uses.

use server::config::ServerConfig;
use server::network::Server;
use shared::{read_packet, write_packet, GameConfig, GameState, Packet, PlayerSlot};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);
const QUIET_WINDOW: Duration = Duration::from_millis(300);

/// NETWORK PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Tests the greeting sequence for the first connection
    #[tokio::test]
    async fn first_connection_is_greeted_with_slot_and_snapshot() {
        let (addr, handle) = start_server(test_config()).await;
        let mut client = TestClient::connect(addr).await;

        match client.recv().await {
            Packet::PlayerAssigned { slot, state } => {
                assert_eq!(slot, Some(PlayerSlot::One));
                assert_eq!(state.tick, 0);
                assert_eq!(state.field_width, 40.0);
                assert_eq!(state.field_height, 20.0);
                assert_eq!(state.score.player1, 0);
                assert_eq!(state.score.player2, 0);
            }
            other => panic!("Expected PlayerAssigned, got {:?}", other),
        }
        assert_eq!(client.recv().await, occupancy(true, false));

        // A lone player never sees a match start
        client.expect_quiet(QUIET_WINDOW).await;

        handle.abort();
    }

    /// Tests that an undecodable frame drops the sender like a disconnect
    #[tokio::test]
    async fn malformed_frame_drops_the_sender() {
        let (addr, handle) = start_server(test_config()).await;
        let (mut player1, mut player2) = start_match(addr).await;

        let mut garbage = 4u32.to_be_bytes().to_vec();
        garbage.extend_from_slice(&[0xFF; 4]);
        player2.stream.write_all(&garbage).await.unwrap();

        player1
            .recv_until(|packet| *packet == occupancy(true, false))
            .await;
        player1.expect_quiet(QUIET_WINDOW).await;
        player2.expect_closed().await;

        handle.abort();
    }

    /// Tests that an oversized length prefix is rejected before any allocation
    #[tokio::test]
    async fn oversized_frame_drops_the_sender() {
        let (addr, handle) = start_server(test_config()).await;
        let (mut player1, mut player2) = start_match(addr).await;

        player2
            .stream
            .write_all(&u32::MAX.to_be_bytes())
            .await
            .unwrap();

        player1
            .recv_until(|packet| *packet == occupancy(true, false))
            .await;
        player2.expect_closed().await;

        handle.abort();
    }

    /// Tests capacity enforcement for connections beyond the configured limit
    #[tokio::test]
    async fn connections_beyond_capacity_are_refused() {
        let config = ServerConfig {
            max_clients: 2,
            ..test_config()
        };
        let (addr, handle) = start_server(config).await;
        let (_player1, _player2) = start_match(addr).await;

        let mut extra = TestClient::connect(addr).await;
        assert_eq!(
            extra.recv().await,
            Packet::Disconnected {
                reason: "Server full".to_string()
            }
        );
        extra.expect_closed().await;

        handle.abort();
    }
}

/// SESSION LIFECYCLE TESTS
mod lifecycle_tests {
    use super::*;

    /// Tests slot assignment and match start when the second player joins
    #[tokio::test]
    async fn second_connection_starts_the_match() {
        let (addr, handle) = start_server(test_config()).await;

        let mut player1 = TestClient::connect(addr).await;
        player1.recv().await;
        assert_eq!(player1.recv().await, occupancy(true, false));

        let mut player2 = TestClient::connect(addr).await;
        match player2.recv().await {
            Packet::PlayerAssigned { slot, .. } => assert_eq!(slot, Some(PlayerSlot::Two)),
            other => panic!("Expected PlayerAssigned, got {:?}", other),
        }

        for client in [&mut player1, &mut player2] {
            assert_eq!(client.recv().await, occupancy(true, true));
            assert_eq!(client.recv().await, Packet::GameStarted);

            let state = client.recv_state().await;
            assert_eq!(state.tick, 1);
            assert_eq!(state.score.player1, 0);
            assert_eq!(state.score.player2, 0);
        }

        handle.abort();
    }

    /// Tests that a third connection watches without disturbing the match
    #[tokio::test]
    async fn third_connection_becomes_spectator() {
        let (addr, handle) = start_server(test_config()).await;
        let (mut player1, _player2) = start_match(addr).await;

        let mut spectator = TestClient::connect(addr).await;
        match spectator.recv().await {
            Packet::PlayerAssigned { slot, .. } => assert_eq!(slot, None),
            other => panic!("Expected PlayerAssigned, got {:?}", other),
        }
        assert_eq!(spectator.recv().await, occupancy(true, true));

        // The running match keeps ticking for everyone, spectator included
        let first = spectator.recv_state().await;
        let later = spectator.recv_state().await;
        assert!(later.tick > first.tick);

        // Players see the new occupancy but no second start
        player1
            .recv_until(|packet| *packet == occupancy(true, true))
            .await;
        player1
            .expect_only_states_until(Instant::now() + QUIET_WINDOW)
            .await;

        handle.abort();
    }

    /// Tests that a player leaving mid-match halts the match for the rest
    #[tokio::test]
    async fn player_disconnect_halts_the_match() {
        let (addr, handle) = start_server(test_config()).await;
        let (mut player1, player2) = start_match(addr).await;

        player1.recv_state().await;
        drop(player2);

        player1
            .recv_until(|packet| *packet == occupancy(true, false))
            .await;
        player1.expect_quiet(QUIET_WINDOW).await;

        handle.abort();
    }

    /// Tests that an explicit Disconnect packet is handled like a closed stream
    #[tokio::test]
    async fn disconnect_packet_frees_the_slot() {
        let (addr, handle) = start_server(test_config()).await;
        let (mut player1, mut player2) = start_match(addr).await;

        player2.send(&Packet::Disconnect).await;

        player1
            .recv_until(|packet| *packet == occupancy(true, false))
            .await;

        // The freed slot goes to the next connection and the match starts again
        let mut replacement = TestClient::connect(addr).await;
        match replacement.recv().await {
            Packet::PlayerAssigned { slot, .. } => assert_eq!(slot, Some(PlayerSlot::Two)),
            other => panic!("Expected PlayerAssigned, got {:?}", other),
        }
        assert_eq!(replacement.recv().await, occupancy(true, true));
        assert_eq!(replacement.recv().await, Packet::GameStarted);

        player1
            .recv_until(|packet| *packet == Packet::GameStarted)
            .await;
        let state = player1.recv_state().await;
        assert_eq!(state.tick, 1);

        handle.abort();
    }

    /// Tests the full end of a match followed by a restart
    #[tokio::test]
    async fn winning_goal_ends_match_and_restart_begins_a_new_one() {
        let config = ServerConfig {
            game: GameConfig {
                field_width: 10.0,
                paddle_x_offset: 4.0,
                max_score: 1,
                ..GameConfig::default()
            },
            ..test_config()
        };
        let (addr, handle) = start_server(config).await;
        let (player1, player2) = start_match(addr).await;

        let ((mut player1, events1), (mut player2, events2)) =
            tokio::join!(dodge_until_game_over(player1), dodge_until_game_over(player2));

        // Score precedes GameOver, and both see the same outcome
        assert_eq!(events1, events2);
        assert_eq!(events1.len(), 2);
        let winner = match events1[1] {
            Packet::GameOver { winner } => winner,
            ref other => panic!("Expected GameOver, got {:?}", other),
        };
        match events1[0] {
            Packet::Score(score) => {
                assert_eq!(score.get(winner), 1);
                assert_eq!(score.get(winner.opponent()), 0);
            }
            ref other => panic!("Expected Score, got {:?}", other),
        }

        // The final snapshot follows, then the match is silent
        for client in [&mut player1, &mut player2] {
            let state = client.recv_state().await;
            assert_eq!(state.score.get(winner), 1);
            client.expect_quiet(QUIET_WINDOW).await;
        }

        player2.send(&Packet::RestartRequest).await;

        for client in [&mut player1, &mut player2] {
            assert_eq!(client.recv().await, Packet::GameStarted);
            let state = client.recv_state().await;
            assert_eq!(state.tick, 1);
            assert_eq!(state.score.player1, 0);
            assert_eq!(state.score.player2, 0);
        }

        handle.abort();
    }
}

/// RESTART GATING TESTS
mod restart_tests {
    use super::*;

    /// Tests that a restart needs both slots filled
    #[tokio::test]
    async fn restart_with_one_player_is_ignored() {
        let (addr, handle) = start_server(test_config()).await;

        let mut player1 = TestClient::connect(addr).await;
        player1.recv().await;
        player1.recv().await;

        player1.send(&Packet::RestartRequest).await;
        player1.expect_quiet(QUIET_WINDOW).await;

        handle.abort();
    }

    /// Tests that a spectator may restart by default
    #[tokio::test]
    async fn spectator_restart_is_honored_by_default() {
        let (addr, handle) = start_server(test_config()).await;
        let (mut player1, _player2) = start_match(addr).await;

        let mut spectator = TestClient::connect(addr).await;
        spectator.recv().await;
        spectator.send(&Packet::RestartRequest).await;

        player1
            .recv_until(|packet| *packet == Packet::GameStarted)
            .await;
        let state = player1.recv_state().await;
        assert_eq!(state.tick, 1);

        handle.abort();
    }

    /// Tests that restart can be limited to slot holders
    #[tokio::test]
    async fn spectator_restart_is_ignored_when_participants_only() {
        let config = ServerConfig {
            restart_requires_slot: true,
            ..test_config()
        };
        let (addr, handle) = start_server(config).await;
        let (mut player1, mut player2) = start_match(addr).await;

        let mut spectator = TestClient::connect(addr).await;
        spectator.recv().await;
        spectator.send(&Packet::RestartRequest).await;

        // The match keeps running without a new start
        let deadline = Instant::now() + QUIET_WINDOW;
        player1.expect_only_states_until(deadline).await;

        player2.send(&Packet::RestartRequest).await;
        player2
            .recv_until(|packet| *packet == Packet::GameStarted)
            .await;

        handle.abort();
    }
}

/// PADDLE INPUT TESTS
mod input_tests {
    use super::*;

    /// Tests that each player moves only its own paddle
    #[tokio::test]
    async fn paddle_moves_are_isolated_per_slot() {
        let (addr, handle) = start_server(test_config()).await;
        let (mut player1, mut player2) = start_match(addr).await;

        player1.send(&Packet::PaddleMove { y: 4.0 }).await;
        let state = player1
            .recv_state_where(|state| state.paddle1.y == 4.0)
            .await;
        assert_eq!(state.paddle2.y, 0.0);

        player2.send(&Packet::PaddleMove { y: 100.0 }).await;
        let state = player2
            .recv_state_where(|state| state.paddle2.y != 0.0)
            .await;
        assert_eq!(state.paddle2.y, 7.0);
        assert_eq!(state.paddle1.y, 4.0);

        handle.abort();
    }

    /// Tests that spectator paddle commands change nothing
    #[tokio::test]
    async fn spectator_paddle_move_is_discarded() {
        let (addr, handle) = start_server(test_config()).await;
        let (mut player1, _player2) = start_match(addr).await;

        let mut spectator = TestClient::connect(addr).await;
        spectator.recv().await;
        spectator.send(&Packet::PaddleMove { y: 5.0 }).await;

        // Ordered after the spectator's command on the server's loop
        player1.send(&Packet::PaddleMove { y: -3.0 }).await;
        let state = player1
            .recv_state_where(|state| state.paddle1.y == -3.0)
            .await;
        assert_eq!(state.paddle2.y, 0.0);

        handle.abort();
    }
}

// HELPER FUNCTIONS

fn test_config() -> ServerConfig {
    ServerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        restart_delay: Duration::from_millis(50),
        ..ServerConfig::default()
    }
}

fn occupancy(slot1_filled: bool, slot2_filled: bool) -> Packet {
    Packet::PlayersConnected {
        slot1_filled,
        slot2_filled,
    }
}

async fn start_server(config: ServerConfig) -> (SocketAddr, JoinHandle<io::Result<()>>) {
    let mut server = Server::bind(config).await.expect("Failed to bind server");
    let addr = server.local_addr();
    let handle = tokio::spawn(async move { server.run().await });
    (addr, handle)
}

/// Connects two players and consumes everything up to `GameStarted`.
async fn start_match(addr: SocketAddr) -> (TestClient, TestClient) {
    let mut player1 = TestClient::connect(addr).await;
    player1.recv().await;
    player1.recv().await;

    let mut player2 = TestClient::connect(addr).await;
    player2.recv().await;

    for client in [&mut player1, &mut player2] {
        client
            .recv_until(|packet| *packet == Packet::GameStarted)
            .await;
    }

    (player1, player2)
}

/// Keeps the paddle on the far side of the ball until the match ends.
///
/// Returns the client and the non-snapshot events seen along the way.
async fn dodge_until_game_over(mut client: TestClient) -> (TestClient, Vec<Packet>) {
    let mut events = Vec::new();
    let mut target = 0.0;

    loop {
        match client.recv().await {
            Packet::GameState(state) => {
                let away = if state.ball.y > 0.0 { -7.0 } else { 7.0 };
                if away != target {
                    target = away;
                    client.send(&Packet::PaddleMove { y: target }).await;
                }
            }
            packet @ Packet::GameOver { .. } => {
                events.push(packet);
                return (client, events);
            }
            packet => events.push(packet),
        }
    }
}

struct TestClient {
    stream: TcpStream,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr)
            .await
            .expect("Failed to connect to server");
        Self { stream }
    }

    async fn send(&mut self, packet: &Packet) {
        write_packet(&mut self.stream, packet)
            .await
            .expect("Failed to send packet");
    }

    async fn recv(&mut self) -> Packet {
        timeout(RECV_TIMEOUT, read_packet(&mut self.stream))
            .await
            .expect("Timed out waiting for packet")
            .expect("Failed to read packet")
            .expect("Server closed the connection")
    }

    async fn recv_until<F>(&mut self, mut predicate: F) -> Packet
    where
        F: FnMut(&Packet) -> bool,
    {
        loop {
            let packet = self.recv().await;
            if predicate(&packet) {
                return packet;
            }
        }
    }

    async fn recv_state(&mut self) -> GameState {
        match self.recv().await {
            Packet::GameState(state) => state,
            other => panic!("Expected GameState, got {:?}", other),
        }
    }

    async fn recv_state_where<F>(&mut self, mut predicate: F) -> GameState
    where
        F: FnMut(&GameState) -> bool,
    {
        loop {
            if let Packet::GameState(state) = self.recv().await {
                if predicate(&state) {
                    return state;
                }
            }
        }
    }

    /// Asserts nothing arrives within `window`. Leaves the stream unusable
    /// for further reads if a frame was cut off.
    async fn expect_quiet(&mut self, window: Duration) {
        if let Ok(result) = timeout(window, read_packet(&mut self.stream)).await {
            panic!("Expected silence, got {:?}", result);
        }
    }

    /// Asserts every packet before `deadline` is a snapshot.
    async fn expect_only_states_until(&mut self, deadline: Instant) {
        while let Ok(result) =
            tokio::time::timeout_at(deadline, read_packet(&mut self.stream)).await
        {
            match result {
                Ok(Some(Packet::GameState(_))) => {}
                other => panic!("Expected only snapshots, got {:?}", other),
            }
        }
    }

    /// Reads until the server closes the stream.
    async fn expect_closed(&mut self) {
        let closed = timeout(RECV_TIMEOUT, async {
            loop {
                match read_packet(&mut self.stream).await {
                    Ok(Some(_)) => continue,
                    Ok(None) | Err(_) => return,
                }
            }
        })
        .await;

        assert!(closed.is_ok(), "Server kept the connection open");
    }
}
