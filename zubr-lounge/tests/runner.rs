//! Network runner against an in-process IRC server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use zubr_irc::reconnect::ReconnectConfig;
use zubr_lounge::ident::IdentRegistry;
use zubr_lounge::network::{ChanType, ChannelConfig, Network, NetworkConfig};
use zubr_lounge::probe::{CapabilityProbe, ProbeConfig};
use zubr_lounge::runner::{NetworkCommand, NetworkRunner, RunnerContext, SaveHook};
use zubr_lounge::status::StatusPublisher;
use zubr_lounge::supervisor::{SessionLink, SupervisorConfig};
use zubr_lounge::viewer::{ViewerEvent, ViewerHub};

struct FakeSession;

impl SessionLink for FakeSession {
    fn name(&self) -> String {
        "alice".into()
    }
    fn away_message(&self) -> Option<String> {
        None
    }
    fn viewer_count(&self) -> usize {
        1
    }
    fn viewer_addr(&self) -> Option<SocketAddr> {
        None
    }
    fn bearer_token(&self) -> Option<String> {
        None
    }
}

#[derive(Default)]
struct CountingSaver(AtomicUsize);

impl SaveHook for CountingSaver {
    fn save(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

struct Fixture {
    ctx: RunnerContext,
    ident: Arc<IdentRegistry>,
    viewer: mpsc::Receiver<ViewerEvent>,
}

async fn fixture() -> Fixture {
    // Nothing listens here, so every probe classifies as plain.
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let home_url = format!("http://{}", closed.local_addr().unwrap());
    drop(closed);

    let hub = Arc::new(ViewerHub::new());
    let (_, viewer) = hub.attach(None);
    let ident = Arc::new(IdentRegistry::new());
    let ctx = RunnerContext {
        supervisor: SupervisorConfig::default(),
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(200),
            ..Default::default()
        },
        probe: CapabilityProbe::new(ProbeConfig {
            home_url,
            timeout: Duration::from_secs(1),
            ..Default::default()
        })
        .unwrap(),
        publisher: StatusPublisher::new(hub),
        ident: Arc::clone(&ident),
        session: Arc::new(FakeSession),
        saver: Arc::new(CountingSaver::default()),
    };
    Fixture { ctx, ident, viewer }
}

fn network(port: u16) -> Network {
    Network::from_config(NetworkConfig {
        name: "MockNet".into(),
        host: "127.0.0.1".into(),
        port,
        tls: false,
        nick: "alice".into(),
        username: "alice".into(),
        realname: "Alice".into(),
        commands: vec!["/msg NickServ identify hunter2".into()],
        channels: vec![
            ChannelConfig {
                name: "#a".into(),
                key: String::new(),
                kind: ChanType::Channel,
            },
            ChannelConfig {
                name: "#b".into(),
                key: "k".into(),
                kind: ChanType::Channel,
            },
        ],
        ..Default::default()
    })
}

async fn read_until(reader: &mut BufReader<OwnedReadHalf>, prefix: &str) -> String {
    let mut line = String::new();
    loop {
        line.clear();
        let n = tokio::time::timeout(Duration::from_secs(10), reader.read_line(&mut line))
            .await
            .expect("timed out reading from client")
            .unwrap();
        assert!(n > 0, "client hung up before sending {prefix}");
        if line.starts_with(prefix) {
            return line.trim_end().to_string();
        }
    }
}

async fn welcome(stream: TcpStream) -> (BufReader<OwnedReadHalf>, OwnedWriteHalf) {
    let (r, mut w) = stream.into_split();
    let mut reader = BufReader::new(r);
    read_until(&mut reader, "USER ").await;
    w.write_all(
        b":srv 001 alice :Welcome\r\n\
          :srv 005 alice NETWORK=MockNet CHANTYPES=# :are supported by this server\r\n\
          :srv 376 alice :End of MOTD\r\n",
    )
    .await
    .unwrap();
    (reader, w)
}

/// Next lobby/channel text pushed to the viewer that contains `needle`.
async fn wait_for_msg(viewer: &mut mpsc::Receiver<ViewerEvent>, needle: &str) -> String {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), viewer.recv())
            .await
            .expect("timed out waiting for viewer event")
            .expect("viewer channel closed");
        if let ViewerEvent::Msg { msg, .. } = event
            && msg.text.contains(needle)
        {
            return msg.text;
        }
    }
}

#[tokio::test]
async fn startup_actions_follow_registration_in_order() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (mut reader, w) = welcome(stream).await;
        let registered_at = Instant::now();
        let mut seen = Vec::new();
        for prefix in ["PRIVMSG NickServ", "JOIN #a", "JOIN #b"] {
            let line = read_until(&mut reader, prefix).await;
            seen.push((line, registered_at.elapsed()));
        }
        // Hand the socket back so the client stays connected.
        (seen, reader, w)
    });

    let fx = fixture().await;
    let handle = NetworkRunner::spawn(network(port), fx.ctx.clone());

    let (seen, _reader, _w) = server.await.unwrap();
    assert_eq!(seen[0].0, "PRIVMSG NickServ :identify hunter2");
    assert_eq!(seen[1].0, "JOIN #a");
    assert_eq!(seen[2].0, "JOIN #b k");
    assert!(seen[0].1 >= Duration::from_millis(900), "command sent too early: {:?}", seen[0].1);
    assert!(seen[1].1 > seen[0].1 && seen[2].1 > seen[1].1);
    assert!(seen[2].1 >= Duration::from_millis(2900));

    assert_eq!(fx.ident.len(), 1);
    handle.shutdown().await;
    assert!(fx.ident.is_empty());
}

#[tokio::test]
async fn server_drop_reconnects_and_reregisters() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (reader, w) = welcome(stream).await;
        drop((reader, w));

        let (stream, _) = listener.accept().await.unwrap();
        let (mut reader, _w) = welcome(stream).await;
        read_until(&mut reader, "QUIT").await
    });

    let mut fx = fixture().await;
    let mut net = network(port);
    net.commands.clear();
    net.channels.clear();
    let handle = NetworkRunner::spawn(net, fx.ctx.clone());

    wait_for_msg(&mut fx.viewer, "Connected to the network.").await;
    let notice = wait_for_msg(&mut fx.viewer, "Reconnecting in").await;
    assert!(notice.ends_with("(Attempt 1)"), "{notice}");
    wait_for_msg(&mut fx.viewer, "Connected to the network.").await;

    // Exactly one live registration after the reconnect.
    assert_eq!(fx.ident.len(), 1);
    assert!(handle.network.lock().status.connected);

    handle.shutdown().await;
    assert!(server.await.unwrap().starts_with("QUIT"));
    assert!(fx.ident.is_empty());
}

#[tokio::test]
async fn manual_disconnect_stays_down() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (mut reader, _w) = welcome(stream).await;
        read_until(&mut reader, "QUIT").await
    });

    let mut fx = fixture().await;
    let mut net = network(port);
    net.commands.clear();
    let handle = NetworkRunner::spawn(net, fx.ctx.clone());

    wait_for_msg(&mut fx.viewer, "Connected to the network.").await;
    handle
        .send(NetworkCommand::Disconnect {
            message: Some("later".into()),
        })
        .await
        .unwrap();

    assert_eq!(server.await.unwrap(), "QUIT :later");
    wait_for_msg(&mut fx.viewer, "will not reconnect").await;
    assert!(fx.ident.is_empty());
    {
        let net = handle.network.lock();
        assert!(!net.status.connected);
        assert!(net.user_disconnected);
    }
    handle.shutdown().await;
}

#[tokio::test]
async fn shutdown_leaves_viewers_with_a_disconnected_status() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (mut reader, _w) = welcome(stream).await;
        read_until(&mut reader, "QUIT").await
    });

    let mut fx = fixture().await;
    let mut net = network(port);
    net.commands.clear();
    net.channels.clear();
    let handle = NetworkRunner::spawn(net, fx.ctx.clone());
    wait_for_msg(&mut fx.viewer, "Connected to the network.").await;

    handle.shutdown().await;
    assert!(server.await.unwrap().starts_with("QUIT"));

    let mut last_status = None;
    while let Ok(event) = fx.viewer.try_recv() {
        if let ViewerEvent::NetworkStatus(status) = event {
            last_status = Some(status);
        }
    }
    let status = last_status.expect("no status published");
    assert!(!status.connected);
    assert!(!status.secure);
}
