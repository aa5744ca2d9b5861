//! In-memory game rooms.
//!
//! Locking is two-level: the registry map has its own lock, held only for a
//! lookup-or-insert, and every room has its own lock for player mutation.
//! A room lock is never held while waiting on the registry lock. The
//! registry only touches room locks through `try_lock` while it holds its
//! own, so the two can never wait on each other.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::{debug, info};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

pub const STARTING_HEALTH: u32 = 100;

/// Handle identifying the connection that owns a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        ConnectionId(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomState {
    Waiting,
    Active,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub health: u32,
    #[serde(skip)]
    pub connection: ConnectionId,
}

impl Player {
    pub fn new(id: String, name: String, connection: ConnectionId) -> Self {
        Player {
            id,
            name,
            x: 0.0,
            y: 0.0,
            health: STARTING_HEALTH,
            connection,
        }
    }

    pub fn is_defeated(&self) -> bool {
        self.health == 0
    }
}

struct RoomInner {
    state: RoomState,
    players: HashMap<String, Player>,
    evicted: bool,
}

pub struct GameRoom {
    id: String,
    inner: Mutex<RoomInner>,
}

/// Point-in-time copy of a room, taken under its lock.
#[derive(Debug, Clone, Serialize)]
pub struct RoomSnapshot {
    pub id: String,
    pub state: RoomState,
    pub players: Vec<Player>,
}

impl GameRoom {
    fn new(id: String) -> Self {
        GameRoom {
            id,
            inner: Mutex::new(RoomInner {
                state: RoomState::Waiting,
                players: HashMap::new(),
                evicted: false,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn state(&self) -> RoomState {
        self.inner.lock().await.state
    }

    /// Moves the room through its lifecycle. Commands never call this; it is
    /// the hook for match flow built on top of the registry.
    pub async fn set_state(&self, state: RoomState) {
        self.inner.lock().await.state = state;
    }

    pub async fn player_count(&self) -> usize {
        self.inner.lock().await.players.len()
    }

    pub async fn snapshot(&self) -> RoomSnapshot {
        let inner = self.inner.lock().await;
        RoomSnapshot {
            id: self.id.clone(),
            state: inner.state,
            players: inner.players.values().cloned().collect(),
        }
    }
}

#[derive(Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, Arc<GameRoom>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the room for `room_id`, creating it in `Waiting` state on first use.
    pub async fn get_or_create(&self, room_id: &str) -> Arc<GameRoom> {
        let mut rooms = self.rooms.lock().await;
        if let Some(room) = rooms.get(room_id) {
            return Arc::clone(room);
        }

        debug!("Creating room {}", room_id);
        let room = Arc::new(GameRoom::new(room_id.to_string()));
        rooms.insert(room_id.to_string(), Arc::clone(&room));
        room
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    /// Inserts the player, replacing any previous player with the same id.
    pub async fn join(&self, room_id: &str, player: Player) {
        loop {
            let room = self.get_or_create(room_id).await;
            let mut inner = room.inner.lock().await;
            // Lost a race with eviction; the next lookup makes a fresh room.
            if inner.evicted {
                continue;
            }
            debug!("Player {} joined room {}", player.id, room_id);
            inner.players.insert(player.id.clone(), player);
            return;
        }
    }

    /// Returns false when the player is not in the room.
    pub async fn move_player(&self, room_id: &str, player_id: &str, x: f64, y: f64) -> bool {
        let room = self.get_or_create(room_id).await;
        let mut inner = room.inner.lock().await;
        match inner.players.get_mut(player_id) {
            Some(player) => {
                player.x = x;
                player.y = y;
                true
            }
            None => false,
        }
    }

    /// Subtracts `amount` from the player's health, stopping at zero.
    /// Returns false when the player is not in the room.
    pub async fn apply_damage(&self, room_id: &str, player_id: &str, amount: u32) -> bool {
        let room = self.get_or_create(room_id).await;
        let mut inner = room.inner.lock().await;
        match inner.players.get_mut(player_id) {
            Some(player) => {
                player.health = player.health.saturating_sub(amount);
                if player.is_defeated() {
                    debug!("Player {} defeated in room {}", player_id, room_id);
                }
                true
            }
            None => false,
        }
    }

    pub async fn player(&self, room_id: &str, player_id: &str) -> Option<Player> {
        let room = self.existing(room_id).await?;
        let inner = room.inner.lock().await;
        inner.players.get(player_id).cloned()
    }

    pub async fn snapshot(&self, room_id: &str) -> Option<RoomSnapshot> {
        let room = self.existing(room_id).await?;
        Some(room.snapshot().await)
    }

    /// Drops every player owned by `connection` from every room.
    /// Returns the number of players removed.
    pub async fn remove_connection(&self, connection: ConnectionId) -> usize {
        let rooms: Vec<Arc<GameRoom>> = self.rooms.lock().await.values().cloned().collect();

        let mut removed = 0;
        for room in rooms {
            let mut inner = room.inner.lock().await;
            let before = inner.players.len();
            inner.players.retain(|_, p| p.connection != connection);
            removed += before - inner.players.len();
        }

        if removed > 0 {
            info!("Removed {} player(s) owned by connection {}", removed, connection);
        }
        removed
    }

    /// Removes rooms that currently hold no players. Rooms whose lock is busy
    /// are skipped. Returns the number of rooms evicted.
    pub async fn evict_empty(&self) -> usize {
        let mut rooms = self.rooms.lock().await;
        let before = rooms.len();

        rooms.retain(|_, room| match room.inner.try_lock() {
            Ok(mut inner) if inner.players.is_empty() => {
                inner.evicted = true;
                false
            }
            _ => true,
        });

        let evicted = before - rooms.len();
        if evicted > 0 {
            info!("Evicted {} empty room(s)", evicted);
        }
        evicted
    }

    async fn existing(&self, room_id: &str) -> Option<Arc<GameRoom>> {
        self.rooms.lock().await.get(room_id).cloned()
    }
}
