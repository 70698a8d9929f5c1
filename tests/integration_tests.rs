//! End-to-end tests for the control protocol over TCP

use async_trait::async_trait;
use mailpush::delivery::{Deliverer, DeliveryOutcome};
use mailpush::store::r#impl::JsonFileStore;
use mailpush::{DispatchContext, OutcomeHandler, PushServer, Registration, Registry, Scheduler};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const TOPIC: &str = "com.apple.mail.XServer.integration";

const REGISTER_ALICE: &str = "REGISTER aps-account-id=\"A1\"\taps-device-token=\"D1\"\taps-subtopic=\"com.apple.mobilemail\"\tdovecot-username=\"alice\"\tdovecot-mailboxes=(\"INBOX\",\"Notes\")";

#[derive(Default)]
struct RecordingDeliverer {
    delivered: Mutex<Vec<Registration>>,
}

impl RecordingDeliverer {
    fn delivered(&self) -> Vec<Registration> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Deliverer for RecordingDeliverer {
    async fn deliver(&self, registration: &Registration) -> mailpush::Result<DeliveryOutcome> {
        self.delivered.lock().unwrap().push(registration.clone());
        Ok(DeliveryOutcome::Delivered)
    }
}

struct TestServer {
    _tmp_dir: TempDir,
    addr: String,
    context: DispatchContext,
    deliverer: Arc<RecordingDeliverer>,
}

/// Set up a test server with a file backed registry and a zero delay
async fn setup_test_server() -> TestServer {
    let tmp_dir = TempDir::new().unwrap();
    let store = Arc::new(JsonFileStore::new(tmp_dir.path().join("registry.json")));
    let registry = Arc::new(Registry::open(store, Duration::from_secs(900)).await.unwrap());

    let deliverer = Arc::new(RecordingDeliverer::default());
    let scheduler = Arc::new(Scheduler::new(
        deliverer.clone(),
        OutcomeHandler::new(Arc::clone(&registry)),
        Duration::ZERO,
    ));
    let context = DispatchContext::new(registry, scheduler, TOPIC);
    let server = PushServer::new(context.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move { server.listen_on_tcp(listener).await });

    TestServer {
        _tmp_dir: tmp_dir,
        addr,
        context,
        deliverer,
    }
}

struct Client {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: &str) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer,
        }
    }

    async fn request(&mut self, line: &str) -> String {
        self.request_bytes(line.as_bytes()).await
    }

    async fn request_bytes(&mut self, line: &[u8]) -> String {
        self.writer.write_all(line).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        let mut response = String::new();
        self.reader.read_line(&mut response).await.unwrap();
        response
    }
}

#[tokio::test]
async fn test_register_returns_topic() {
    let server = setup_test_server().await;
    let mut client = Client::connect(&server.addr).await;

    let response = client.request(REGISTER_ALICE).await;

    assert_eq!(response, format!("OK {}\n", TOPIC));
    assert_eq!(
        server.context.registry.find("alice", "INBOX").await,
        vec![Registration::new("A1", "D1")]
    );
}

#[tokio::test]
async fn test_register_then_new_message() {
    let server = setup_test_server().await;
    let mut client = Client::connect(&server.addr).await;

    client.request(REGISTER_ALICE).await;
    let response = client
        .request("NOTIFY dovecot-username=\"alice\"\tdovecot-mailbox=\"INBOX\"\tevents=(\"MessageNew\")")
        .await;

    assert_eq!(response, "OK\n");
    assert_eq!(server.deliverer.delivered(), vec![Registration::new("A1", "D1")]);
}

#[tokio::test]
async fn test_notify_other_mailbox_does_not_deliver() {
    let server = setup_test_server().await;
    let mut client = Client::connect(&server.addr).await;

    client.request(REGISTER_ALICE).await;
    let response = client
        .request("NOTIFY dovecot-username=\"alice\"\tdovecot-mailbox=\"Notes\"\tevents=(\"MessageNew\")")
        .await;

    assert_eq!(response, "OK\n");
    assert!(server.deliverer.delivered().is_empty());
    assert_eq!(server.context.scheduler.pending_count().await, 0);
}

#[tokio::test]
async fn test_flag_changes_are_coalesced() {
    let server = setup_test_server().await;
    let mut client = Client::connect(&server.addr).await;

    client.request(REGISTER_ALICE).await;
    for _ in 0..3 {
        let response = client
            .request("NOTIFY dovecot-username=\"alice\"\tdovecot-mailbox=\"INBOX\"\tevents=(\"FlagsSet\")")
            .await;
        assert_eq!(response, "OK\n");
    }
    assert!(server.deliverer.delivered().is_empty());
    assert_eq!(server.context.scheduler.pending_count().await, 1);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(server.context.scheduler.sweep().await, 1);
    assert_eq!(server.deliverer.delivered(), vec![Registration::new("A1", "D1")]);
}

#[tokio::test]
async fn test_bad_requests_keep_connection_open() {
    let server = setup_test_server().await;
    let mut client = Client::connect(&server.addr).await;

    let response = client.request("GARBAGE").await;
    assert!(response.starts_with("ERROR "), "got {:?}", response);

    let response = client.request("NOTIFY dovecot-username=alice").await;
    assert!(response.starts_with("ERROR "), "got {:?}", response);

    let response = client.request("SUBSCRIBE topic=\"x\"").await;
    assert_eq!(response, "ERROR Unknown command\n");

    let response = client
        .request("REGISTER aps-subtopic=\"com.apple.mobilemail\"\taps-device-token=\"D1\"")
        .await;
    assert_eq!(response, "ERROR Missing aps-account-id argument\n");

    let response = client.request(REGISTER_ALICE).await;
    assert_eq!(response, format!("OK {}\n", TOPIC));
}

#[tokio::test]
async fn test_non_utf8_request_keeps_connection_open() {
    let server = setup_test_server().await;
    let mut client = Client::connect(&server.addr).await;

    let response = client
        .request_bytes(b"NOTIFY dovecot-username=\"\xff\xfe\"\tdovecot-mailbox=\"INBOX\"")
        .await;
    assert!(response.starts_with("ERROR Malformed command"), "got {:?}", response);

    let response = client.request(REGISTER_ALICE).await;
    assert_eq!(response, format!("OK {}\n", TOPIC));
    assert!(server.deliverer.delivered().is_empty());
}

#[tokio::test]
async fn test_registration_survives_restart() {
    let tmp_dir = TempDir::new().unwrap();
    let path = tmp_dir.path().join("registry.json");

    {
        let registry = Registry::open(Arc::new(JsonFileStore::new(&path)), Duration::from_secs(900))
            .await
            .unwrap();
        registry
            .upsert("alice", "A1", "D1", vec!["INBOX".to_string()])
            .await;
    }

    let registry = Registry::open(Arc::new(JsonFileStore::new(&path)), Duration::from_secs(900))
        .await
        .unwrap();
    assert_eq!(
        registry.find("alice", "INBOX").await,
        vec![Registration::new("A1", "D1")]
    );
}
