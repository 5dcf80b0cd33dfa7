/// End-to-end over TCP: welcome, join, move, rooms, broadcast and shutdown.
use std::net::SocketAddr;
use std::time::Duration;

use project_bomber::config::ServerConfig;
use project_bomber::shutdown::{shutdown_channel, ShutdownTx};
use project_bomber::{Server, ServerError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

struct Running {
    addr: SocketAddr,
    shutdown: ShutdownTx,
    task: JoinHandle<Result<(), ServerError>>,
}

async fn start() -> Running {
    let mut config = ServerConfig::default();
    config.net.addr = "127.0.0.1".into();
    config.net.port = 0;
    config.room.seed = Some(2024);

    let server = Server::bind(&config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let (shutdown, rx) = shutdown_channel();
    let task = tokio::spawn(server.run(rx));
    Running { addr, shutdown, task }
}

struct Client {
    stream: BufReader<TcpStream>,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let mut client = Self {
            stream: BufReader::new(TcpStream::connect(addr).await.unwrap()),
        };
        client.read_until(|l| l == "Current Rooms:").await;
        client
    }

    async fn send(&mut self, line: &str) {
        self.stream
            .get_mut()
            .write_all(format!("{}\r\n", line).as_bytes())
            .await
            .unwrap();
    }

    /// Next line without its CRLF, or `None` at EOF.
    async fn line(&mut self) -> Option<String> {
        let mut buf = String::new();
        let n = tokio::time::timeout(READ_TIMEOUT, self.stream.read_line(&mut buf))
            .await
            .expect("timed out waiting for server")
            .unwrap();
        (n > 0).then(|| buf.trim_end_matches(['\r', '\n']).to_string())
    }

    async fn read_until(&mut self, pred: impl Fn(&str) -> bool) -> Vec<String> {
        let mut seen = Vec::new();
        loop {
            let line = self.line().await.expect("connection closed early");
            let done = pred(&line);
            seen.push(line);
            if done {
                return seen;
            }
        }
    }

    /// One full 13x11 snapshot.
    async fn snapshot(&mut self) -> Vec<String> {
        let mut rows = Vec::new();
        for _ in 0..11 {
            rows.push(self.line().await.expect("snapshot cut short"));
        }
        rows
    }
}

fn count(rows: &[String], symbol: char) -> usize {
    rows.iter().map(|r| r.matches(symbol).count()).sum()
}

#[tokio::test]
async fn join_move_and_list_rooms() {
    let server = start().await;
    let mut client = Client::connect(server.addr).await;
    // Pre-created default room shows in the welcome listing.
    assert_eq!(client.line().await.unwrap(), "  room-1: 0 players");

    client.send("b").await;
    assert_eq!(client.line().await.unwrap(), "Please JOIN <room> first.");

    client.send("JOIN").await;
    assert_eq!(client.line().await.unwrap(), "Joined room: room-1");
    let rows = client.snapshot().await;
    assert!(rows.iter().all(|r| r.len() == 13));
    assert_eq!(count(&rows, 'P'), 1);
    assert!(rows[0].chars().all(|c| c == '#'));

    client.send("\x1b[A").await;
    let reply = client.line().await.unwrap();
    if reply != "Can't move" {
        // A successful move answers with a full snapshot.
        let mut rows = vec![reply];
        for _ in 0..10 {
            rows.push(client.line().await.unwrap());
        }
        assert_eq!(count(&rows, 'P'), 1);
    }

    client.send("dance").await;
    assert_eq!(client.line().await.unwrap(), "Unknown command");

    client.send("ROOMS").await;
    let listing = client.read_until(|l| l.starts_with("  room-1:")).await;
    assert_eq!(listing.last().unwrap(), "  room-1: 1 players");

    server.shutdown.trigger();
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn second_player_is_broadcast_to_the_first() {
    let server = start().await;
    let mut a = Client::connect(server.addr).await;
    let mut b = Client::connect(server.addr).await;

    a.send("JOIN").await;
    a.read_until(|l| l == "Joined room: room-1").await;
    a.snapshot().await;

    b.send("JOIN room-1").await;
    b.read_until(|l| l == "Joined room: room-1").await;
    assert_eq!(count(&b.snapshot().await, 'P'), 2);
    assert_eq!(count(&a.snapshot().await, 'P'), 2);

    b.send("b").await;
    assert_eq!(count(&a.snapshot().await, 'B'), 1);

    // Disconnect removes b from a's view.
    drop(b);
    let rows = a.snapshot().await;
    assert_eq!(count(&rows, 'P'), 1);

    server.shutdown.trigger();
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_notifies_and_closes_clients() {
    let server = start().await;
    let mut client = Client::connect(server.addr).await;
    client.send("JOIN").await;
    client.read_until(|l| l == "Joined room: room-1").await;
    client.snapshot().await;

    server.shutdown.trigger();
    let rest = {
        let mut rest = Vec::new();
        while let Some(line) = client.line().await {
            rest.push(line);
        }
        rest
    };
    assert_eq!(rest.last().map(String::as_str), Some("Server is shutting down."));
    tokio::time::timeout(READ_TIMEOUT, server.task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
