use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::protocol::ProtocolError;
use crate::room::{ConnectionId, RoomRegistry};
use crate::service::{ConversationService, MessageService};
use crate::store::DocumentStore;

#[derive(Clone)]
pub struct Server {
    dispatcher: Arc<Dispatcher>,
}

impl Server {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Server {
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Wires a fresh room registry and the conversation services over `store`.
    pub fn with_store(store: Arc<dyn DocumentStore>, config: &Config) -> Self {
        let dispatcher = Dispatcher::new(
            Arc::new(RoomRegistry::new()),
            ConversationService::new(Arc::clone(&store), config.store_timeout),
            MessageService::new(store, config.store_timeout),
        );
        Self::new(dispatcher)
    }

    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        self.dispatcher.rooms()
    }

    /// Accepts connections until the listener fails, one task per connection.
    pub async fn run(&self, listener: TcpListener) -> io::Result<()> {
        info!("Listening on {}", listener.local_addr()?);

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let server = self.clone();
                    tokio::spawn(async move {
                        server.handle_connection(stream, peer).await;
                    });
                }
                Err(e) => error!("Failed to accept connection: {}", e),
            }
        }
    }

    pub async fn handle_connection<S>(&self, stream: S, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let connection = ConnectionId::new();
        info!("New connection {} ({})", connection, peer);

        if let Err(e) = self.serve_lines(stream, connection).await {
            error!("Connection {} ({}) failed: {}", connection, peer, e);
        }

        self.rooms().remove_connection(connection).await;
        info!("Connection {} ({}) closed", connection, peer);
    }

    /// Reads newline-terminated commands and writes one reply line each, in
    /// order, until the peer closes the stream.
    pub async fn serve_lines<S>(&self, stream: S, connection: ConnectionId) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                return Ok(());
            }

            let mut reply = match std::str::from_utf8(&buf) {
                Ok(line) => {
                    let msg = line.trim();
                    debug!("[{}] {}", connection, msg);
                    self.dispatcher.handle_line(msg, connection).await
                }
                Err(e) => {
                    warn!("[{}] Rejected non-UTF-8 line: {}", connection, e);
                    ProtocolError::InvalidFormat.to_string()
                }
            };
            debug!("[{}] -> {}", connection, reply);
            reply.push('\n');

            writer.write_all(reply.as_bytes()).await?;
            writer.flush().await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn server() -> Server {
        Server::with_store(Arc::new(MemoryStore::new()), &Config::default())
    }

    #[tokio::test]
    async fn replies_once_per_line_and_survives_bad_input() {
        let server = server();
        let (client, remote) = tokio::io::duplex(1024);
        let conn = ConnectionId::new();
        let task = tokio::spawn({
            let server = server.clone();
            async move { server.serve_lines(remote, conn).await }
        });

        let (read_half, mut write_half) = tokio::io::split(client);
        let mut lines = BufReader::new(read_half).lines();

        write_half.write_all(b"not json\n").await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "Invalid JSON format");

        write_half
            .write_all(b"  {\"type\":\"create_room\",\"roomId\":\"r1\",\"playerId\":\"p1\",\"playerName\":\"Alice\"}  \n")
            .await
            .unwrap();
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "Room created and player joined: r1"
        );

        drop(write_half);
        drop(lines);
        task.await.unwrap().unwrap();
        assert!(server.rooms().player("r1", "p1").await.is_some());
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_rejected_without_closing() {
        let server = server();
        let (client, remote) = tokio::io::duplex(1024);
        let peer: SocketAddr = "127.0.0.1:4001".parse().unwrap();
        let task = tokio::spawn({
            let server = server.clone();
            async move { server.handle_connection(remote, peer).await }
        });

        let (read_half, mut write_half) = tokio::io::split(client);
        let mut lines = BufReader::new(read_half).lines();
        write_half
            .write_all(b"{\"type\":\"create_room\",\"roomId\":\"r1\",\"playerId\":\"p1\",\"playerName\":\"Ann\"}\n")
            .await
            .unwrap();
        lines.next_line().await.unwrap().unwrap();

        write_half.write_all(b"\xff\xfe garbage\n").await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "Invalid JSON format");
        assert!(server.rooms().player("r1", "p1").await.is_some());

        write_half.write_all(b"{\"type\":\"ping\"}\n").await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "Unknown command");

        drop(write_half);
        drop(lines);
        task.await.unwrap();
        assert!(server.rooms().player("r1", "p1").await.is_none());
    }

    #[tokio::test]
    async fn closing_connection_drops_its_players() {
        let server = server();
        let (client, remote) = tokio::io::duplex(1024);
        let peer: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let task = tokio::spawn({
            let server = server.clone();
            async move { server.handle_connection(remote, peer).await }
        });

        let (read_half, mut write_half) = tokio::io::split(client);
        let mut lines = BufReader::new(read_half).lines();
        write_half
            .write_all(b"{\"type\":\"create_room\",\"roomId\":\"r9\",\"playerId\":\"p1\",\"playerName\":\"Bob\"}\n")
            .await
            .unwrap();
        lines.next_line().await.unwrap().unwrap();
        assert!(server.rooms().player("r9", "p1").await.is_some());

        drop(write_half);
        drop(lines);
        task.await.unwrap();
        assert!(server.rooms().player("r9", "p1").await.is_none());
        assert_eq!(server.rooms().room_count().await, 1);
    }
}
