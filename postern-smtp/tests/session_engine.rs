//! End-to-end session tests over an in-memory socket.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use postern_common::{
    Signal,
    config::ServerTimeouts,
    error::SessionError,
    listener::Listener,
    status::{Status, enhanced},
};
use postern_smtp::{
    Smtp, SmtpArgs,
    chain::HandlerChain,
    command::Command,
    delivery::{MemorySink, SizeLimited},
    handler::{CommandHandler, Outcome},
    handlers::{self, Blocklist},
    policy::RelayPolicy,
    response::Response,
    session::{Session, SessionConfig, SessionConfigBuilder, SmtpSession, UnknownCommand},
};
use pretty_assertions::assert_eq;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf, duplex},
    net::{TcpListener, TcpStream},
    sync::broadcast,
    task::JoinHandle,
};

const PEER: &str = "192.0.2.1:40025";

struct Client<Stream> {
    reader: BufReader<ReadHalf<Stream>>,
    writer: WriteHalf<Stream>,
}

impl<Stream: tokio::io::AsyncRead + tokio::io::AsyncWrite> Client<Stream> {
    fn new(stream: Stream) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn send(&mut self, data: &str) {
        self.writer.write_all(data.as_bytes()).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn command(&mut self, line: &str) -> Vec<String> {
        self.send(&format!("{line}\r\n")).await;
        self.response().await
    }

    /// Every line of the next reply, without terminators.
    async fn response(&mut self) -> Vec<String> {
        let mut lines = Vec::new();

        loop {
            let mut line = String::new();
            let read = self.reader.read_line(&mut line).await.unwrap();
            assert!(read > 0, "connection closed after {lines:?}");

            let line = line.trim_end_matches("\r\n").to_string();
            let last = line.as_bytes().get(3) != Some(&b'-');
            lines.push(line);

            if last {
                return lines;
            }
        }
    }

    async fn line(&mut self) -> String {
        let mut response = self.response().await;
        assert_eq!(response.len(), 1, "expected a single line: {response:?}");
        response.remove(0)
    }

    async fn line_after(&mut self, line: &str) -> String {
        self.send(&format!("{line}\r\n")).await;
        self.line().await
    }

    async fn is_closed(&mut self) -> bool {
        let mut line = String::new();
        self.reader.read_line(&mut line).await.unwrap() == 0
    }
}

struct Harness {
    client: Client<DuplexStream>,
    task: JoinHandle<Result<(), SessionError>>,
    signal: broadcast::Sender<Signal>,
}

fn config() -> SessionConfigBuilder {
    SessionConfig::builder()
        .with_hostname("mx.example.com")
        .with_policy(Arc::new(RelayPolicy {
            local_domains: vec!["example.com".to_string()],
            ..RelayPolicy::default()
        }))
}

async fn connect(config: SessionConfig) -> Harness {
    let (client, server) = duplex(64 * 1024);
    let (signal, receiver) = broadcast::channel(4);
    let session = Session::create(server, PEER.parse().unwrap(), Arc::new(config));

    let mut client = Client::new(client);
    let task = tokio::spawn(session.run(receiver));

    let greeting = client.line().await;
    assert!(
        greeting.starts_with("220 mx.example.com SMTP Server (Postern "),
        "{greeting}"
    );

    Harness {
        client,
        task,
        signal,
    }
}

#[tokio::test]
async fn helo_then_quit() {
    let mut harness = connect(config().build()).await;
    let client = &mut harness.client;

    assert_eq!(
        client.line_after("HELO foo.com").await,
        "250 mx.example.com Hello foo.com (192.0.2.1 [192.0.2.1])"
    );
    assert_eq!(client.line_after("noop").await, "250 2.0.0 OK");
    assert_eq!(
        client.line_after("QUIT").await,
        "221 2.0.0 mx.example.com Service closing transmission channel"
    );
    assert!(client.is_closed().await);
    assert!(harness.task.await.unwrap().is_ok());
}

#[tokio::test]
async fn ehlo_advertises_extensions() {
    let mut harness = connect(config().with_max_message_size(1024).build()).await;

    assert_eq!(
        harness.client.command("EHLO client.example").await,
        vec![
            "250-mx.example.com Hello client.example (192.0.2.1 [192.0.2.1])",
            "250-SIZE 1024",
            "250-8BITMIME",
            "250 HELP",
        ]
    );

    let help = harness.client.command("HELP").await;
    assert_eq!(help.len(), 4);
    assert!(help.iter().all(|line| line.starts_with("214")));
    assert!(help[2].contains("MAIL NOOP QUIT RCPT"), "{help:?}");
}

#[tokio::test]
async fn unknown_command_closes_by_default() {
    let mut harness = connect(config().build()).await;

    harness.client.send("FOO bar\r\n").await;

    assert!(harness.client.is_closed().await);
    assert!(harness.task.await.unwrap().is_ok());
}

#[tokio::test]
async fn unknown_command_can_be_rejected() {
    let mut harness = connect(
        config()
            .with_unknown_command(UnknownCommand::Reject)
            .build(),
    )
    .await;

    assert_eq!(
        harness.client.line_after("FOO").await,
        "500 5.5.1 Command unrecognized"
    );
    assert_eq!(harness.client.line_after("NOOP").await, "250 2.0.0 OK");
}

#[tokio::test]
async fn empty_chain_closes_without_reply() {
    let mut harness = connect(
        config()
            .with_chain(Arc::new(HandlerChain::default()))
            .build(),
    )
    .await;

    harness.client.send("HELO foo.com\r\n").await;

    assert!(harness.client.is_closed().await);
    assert!(harness.task.await.unwrap().is_ok());
}

#[derive(Debug)]
struct Recording {
    name: &'static str,
    respond: bool,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl CommandHandler for Recording {
    fn commands(&self) -> &'static [&'static str] {
        &["PING"]
    }

    async fn on_command(
        &self,
        session: &mut dyn SmtpSession,
        _command: &Command,
    ) -> Result<Outcome, SessionError> {
        self.calls.lock().unwrap().push(self.name);

        if self.respond {
            session
                .reply(Response::enhanced(Status::Ok, enhanced::UNDEFINED, self.name))
                .await?;
        }

        Ok(Outcome::Continue)
    }
}

#[tokio::test]
async fn handlers_run_in_order_until_one_responds() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let handler = |name, respond| Recording {
        name,
        respond,
        calls: Arc::clone(&calls),
    };

    let chain = HandlerChain::builder()
        .command(handler("first", false))
        .command(handler("second", true))
        .command(handler("third", true))
        .build();

    let mut harness = connect(config().with_chain(Arc::new(chain)).build()).await;

    assert_eq!(harness.client.line_after("PING").await, "250 2.0.0 second");
    assert_eq!(harness.client.line_after("PING").await, "250 2.0.0 second");
    assert_eq!(
        *calls.lock().unwrap(),
        vec!["first", "second", "first", "second"]
    );
}

async fn start_transaction<S>(client: &mut Client<S>)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite,
{
    assert!(client.line_after("HELO client.example").await.starts_with("250 "));
    assert_eq!(
        client.line_after("MAIL FROM:<sender@example.org>").await,
        "250 2.1.0 Sender <sender@example.org> OK"
    );
    assert_eq!(
        client.line_after("RCPT TO:<user@example.com>").await,
        "250 2.1.5 Recipient <user@example.com> OK"
    );
    assert_eq!(
        client.line_after("DATA").await,
        "354 Ok Send data ending with <CRLF>.<CRLF>"
    );
}

#[tokio::test]
async fn mail_is_delivered_and_state_cleared() {
    let sink = MemorySink::new();
    let mut harness = connect(config().with_sink(Arc::new(sink.clone())).build()).await;
    let client = &mut harness.client;

    start_transaction(client).await;
    client
        .send("Subject: hello\r\n\r\nbody\r\n..leading dot\r\n.\r\n")
        .await;
    assert_eq!(client.line().await, "250 2.6.0 Message received");

    let messages = sink.messages();
    assert_eq!(messages.len(), 1);

    let mail = &messages[0];
    assert_eq!(mail.sender.to_string(), "<sender@example.org>");
    assert_eq!(mail.helo.as_deref(), Some("client.example"));

    let data = String::from_utf8_lossy(&mail.data);
    assert!(
        data.starts_with("Received: from client.example (192.0.2.1 [192.0.2.1])\r\n"),
        "{data}"
    );
    assert!(data.contains("for <user@example.com>;"), "{data}");
    assert!(
        data.ends_with("Subject: hello\r\n\r\nbody\r\n.leading dot\r\n"),
        "{data}"
    );

    // The transaction is gone: a recipient now needs a new sender
    assert_eq!(
        client.line_after("RCPT TO:<user@example.com>").await,
        "503 5.5.1 Need MAIL before RCPT"
    );
    assert!(
        client
            .line_after("MAIL FROM:<>")
            .await
            .starts_with("250 2.1.0")
    );
}

#[tokio::test]
async fn aborted_message_is_not_delivered() {
    let sink = MemorySink::new();
    let mut harness = connect(config().with_sink(Arc::new(sink.clone())).build()).await;
    let client = &mut harness.client;

    start_transaction(client).await;
    client.send("Bad Header: value\r\n\r\nbody\r\n.\r\n").await;

    assert_eq!(
        client.line().await,
        "554 5.6.0 Malformed message headers"
    );
    assert!(sink.is_empty());
    assert_eq!(
        client.line_after("DATA").await,
        "503 5.5.1 No sender specified"
    );
}

#[tokio::test]
async fn oversized_message_is_refused() {
    let sink = MemorySink::new();
    let mut harness = connect(
        config()
            .with_max_message_size(64)
            .with_sink(Arc::new(SizeLimited::new(sink.clone(), 64)))
            .build(),
    )
    .await;
    let client = &mut harness.client;

    start_transaction(client).await;
    client
        .send(&format!("Subject: big\r\n\r\n{}\r\n.\r\n", "x".repeat(200)))
        .await;

    let response = client.line().await;
    assert!(
        response.starts_with("552 5.3.4 Error processing message: Message size "),
        "{response}"
    );
    assert!(sink.is_empty());
    assert_eq!(
        client.line_after("RCPT TO:<user@example.com>").await,
        "503 5.5.1 Need MAIL before RCPT"
    );
}

#[tokio::test]
async fn message_under_limit_is_accepted_after_trace_header() {
    let sink = MemorySink::new();
    let mut harness = connect(
        config()
            .with_max_message_size(1000)
            .with_sink(Arc::new(SizeLimited::new(sink.clone(), 1000)))
            .build(),
    )
    .await;
    let client = &mut harness.client;

    start_transaction(client).await;
    client
        .send(&format!("Subject: fits\r\n\r\n{}\r\n.\r\n", "x".repeat(880)))
        .await;

    assert_eq!(client.line().await, "250 2.6.0 Message received");

    let messages = sink.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].size, 899);
    assert!(messages[0].data.starts_with(b"Received: from client.example"));
    assert!(messages[0].is_complete());
}

#[tokio::test]
async fn declared_size_is_checked() {
    let mut harness = connect(config().with_max_message_size(64).build()).await;
    let client = &mut harness.client;

    client.line_after("EHLO client.example").await;
    assert_eq!(
        client.line_after("MAIL FROM:<a@example.org> SIZE=65").await,
        "552 5.3.4 Message size exceeds fixed maximum message size"
    );
    assert_eq!(
        client.line_after("MAIL FROM:<a@example.org> SIZE=abc").await,
        "501 5.5.4 Invalid SIZE parameter: SIZE=abc"
    );
}

#[tokio::test]
async fn command_sequence_and_syntax() {
    let mut harness = connect(config().build()).await;
    let client = &mut harness.client;

    assert_eq!(
        client.line_after("MAIL FROM:<a@example.org>").await,
        "503 5.5.1 Need HELO or EHLO before MAIL"
    );
    assert_eq!(
        client.line_after("HELO").await,
        "501 5.5.4 Domain address required: HELO"
    );
    client.line_after("HELO client.example").await;
    assert_eq!(
        client.line_after("MAIL <a@example.org>").await,
        "501 5.5.4 Usage: MAIL FROM:<sender>"
    );
    assert_eq!(
        client.line_after("MAIL FROM:a@@example.org").await,
        "501 5.1.7 Syntax error in sender address"
    );
    client.line_after("MAIL FROM:<a@example.org>").await;
    assert_eq!(
        client.line_after("MAIL FROM:<b@example.org>").await,
        "503 5.5.1 Sender already specified"
    );
    assert_eq!(
        client.line_after("DATA").await,
        "503 5.5.1 No recipients specified"
    );
    assert_eq!(
        client.line_after("RCPT TO:<>").await,
        "501 5.1.3 Syntax error in recipient address"
    );
    assert_eq!(
        client.line_after("RCPT <x@example.com>").await,
        "501 5.5.4 Usage: RCPT TO:<recipient>"
    );
    assert_eq!(
        client.line_after("RSET").await,
        "250 2.0.0 OK"
    );
    assert_eq!(
        client.line_after("RCPT TO:<x@example.com>").await,
        "503 5.5.1 Need MAIL before RCPT"
    );
    assert_eq!(
        client.line_after("VRFY postmaster").await,
        "252 2.5.2 Cannot VRFY user, but will accept message and attempt delivery"
    );
    assert_eq!(
        client.line_after("EXPN staff").await,
        "502 5.3.3 EXPN is not supported"
    );
}

#[tokio::test]
async fn relaying_is_denied() {
    let mut harness = connect(config().build()).await;
    let client = &mut harness.client;

    client.line_after("HELO client.example").await;
    client.line_after("MAIL FROM:<a@example.org>").await;
    assert_eq!(
        client.line_after("RCPT TO:<someone@elsewhere.net>").await,
        "550 5.7.1 Requested action not taken: relaying denied"
    );
}

#[tokio::test]
async fn relaying_requires_authentication() {
    let policy = RelayPolicy {
        require_auth: true,
        local_domains: vec!["example.com".to_string()],
        ..RelayPolicy::default()
    };
    let mut harness = connect(config().with_policy(Arc::new(policy)).build()).await;
    let client = &mut harness.client;

    client.line_after("HELO client.example").await;
    client.line_after("MAIL FROM:<a@example.org>").await;
    assert_eq!(
        client.line_after("RCPT TO:<someone@elsewhere.net>").await,
        "530 5.7.1 Authentication Required"
    );
    assert!(
        client
            .line_after("RCPT TO:<local@example.com>")
            .await
            .starts_with("250 2.1.5")
    );
}

#[tokio::test]
async fn blocklisted_clients_cannot_add_recipients() {
    let chain = handlers::core()
        .connect(Blocklist::new(vec!["192.0.2.0/24".parse().unwrap()]))
        .build();
    let mut harness = connect(config().with_chain(Arc::new(chain)).build()).await;
    let client = &mut harness.client;

    client.line_after("HELO client.example").await;
    client.line_after("MAIL FROM:<a@example.org>").await;
    assert_eq!(
        client.line_after("RCPT TO:<user@example.com>").await,
        "554 5.7.1 Rejected: unauthenticated e-mail from 192.0.2.1 is restricted. Contact the postmaster for details."
    );
}

#[tokio::test]
async fn bare_line_feed_is_reported() {
    let mut harness = connect(config().build()).await;

    harness.client.send("NOOP\n").await;
    assert_eq!(
        harness.client.line().await,
        "501 Syntax error at character position 4. CR and LF must be CRLF paired."
    );
    assert_eq!(harness.client.line_after("NOOP").await, "250 2.0.0 OK");
}

#[tokio::test]
async fn overlong_line_is_refused() {
    let mut harness = connect(config().with_max_line_length(32).build()).await;

    assert_eq!(
        harness.client.line_after(&format!("NOOP {}", "x".repeat(64))).await,
        "500 5.5.2 Line too long"
    );
    assert_eq!(harness.client.line_after("NOOP").await, "250 2.0.0 OK");
}

#[tokio::test(start_paused = true)]
async fn idle_session_times_out() {
    let timeouts = ServerTimeouts {
        idle_secs: 5,
        ..ServerTimeouts::default()
    };
    let mut harness = connect(config().with_timeouts(timeouts).build()).await;

    assert_eq!(harness.client.line_after("NOOP").await, "250 2.0.0 OK");

    let result = harness.task.await.unwrap();
    assert!(matches!(result, Err(SessionError::Timeout(5))), "{result:?}");
    assert!(harness.client.is_closed().await);
}

#[tokio::test(start_paused = true)]
async fn watchdog_is_kept_alive_during_data() {
    let timeouts = ServerTimeouts {
        idle_secs: 5,
        ..ServerTimeouts::default()
    };
    let sink = MemorySink::new();
    let mut harness = connect(
        config()
            .with_timeouts(timeouts)
            .with_sink(Arc::new(sink.clone()))
            .build(),
    )
    .await;
    let client = &mut harness.client;

    start_transaction(client).await;
    for line in ["Subject: slow\r\n", "\r\n", "one\r\n", "two\r\n"] {
        tokio::time::sleep(Duration::from_secs(3)).await;
        client.send(line).await;
    }
    tokio::time::sleep(Duration::from_secs(3)).await;
    client.send(".\r\n").await;

    assert_eq!(client.line().await, "250 2.6.0 Message received");
    assert_eq!(sink.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn lifetime_is_enforced_while_idle() {
    let timeouts = ServerTimeouts {
        idle_secs: 60,
        connection_secs: 4,
    };
    let mut harness = connect(config().with_timeouts(timeouts).build()).await;

    assert_eq!(harness.client.line_after("NOOP").await, "250 2.0.0 OK");

    let result = harness.task.await.unwrap();
    assert!(matches!(result, Err(SessionError::Lifetime(4))), "{result:?}");
    assert!(harness.client.is_closed().await);
}

#[tokio::test(start_paused = true)]
async fn lifetime_is_enforced_during_data() {
    let timeouts = ServerTimeouts {
        idle_secs: 5,
        connection_secs: 8,
    };
    let sink = MemorySink::new();
    let mut harness = connect(
        config()
            .with_timeouts(timeouts)
            .with_sink(Arc::new(sink.clone()))
            .build(),
    )
    .await;

    start_transaction(&mut harness.client).await;
    for line in ["Subject: slow\r\n", "\r\n"] {
        tokio::time::sleep(Duration::from_secs(3)).await;
        harness.client.send(line).await;
    }

    let result = harness.task.await.unwrap();
    assert!(matches!(result, Err(SessionError::Lifetime(8))), "{result:?}");
    assert!(harness.client.is_closed().await);
    assert!(sink.is_empty());
}

#[tokio::test]
async fn shutdown_is_announced() {
    let mut harness = connect(config().build()).await;

    harness.client.line_after("HELO client.example").await;
    harness.signal.send(Signal::Shutdown).unwrap();

    assert_eq!(
        harness.client.line().await,
        "421 4.3.2 mx.example.com Service shutting down"
    );
    assert!(harness.task.await.unwrap().is_ok());
}

#[tokio::test]
async fn client_disconnect_ends_session() {
    let harness = connect(config().build()).await;
    drop(harness.client);

    assert!(harness.task.await.unwrap().is_ok());
}

#[tokio::test]
async fn serves_over_tcp() {
    let sink = MemorySink::new();
    let args = SmtpArgs::builder()
        .with_hostname("mx.example.com")
        .with_sink(Arc::new(sink.clone()));

    let mut listener = Listener::<Smtp>::new("127.0.0.1:0".parse().unwrap(), args);
    listener.init().unwrap();

    let socket = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address: SocketAddr = socket.local_addr().unwrap();
    let (signal, receiver) = broadcast::channel(4);
    let server = tokio::spawn(async move { listener.serve_on(socket, receiver).await });

    let mut client = Client::new(TcpStream::connect(address).await.unwrap());
    assert!(client.line().await.starts_with("220 mx.example.com"));
    assert!(
        client
            .line_after("HELO client.example")
            .await
            .starts_with("250 mx.example.com Hello client.example (127.0.0.1 [127.0.0.1])")
    );
    client.line_after("MAIL FROM:<a@example.org>").await;
    assert_eq!(
        client.line_after("RCPT TO:<postmaster@mx.example.com>").await,
        "250 2.1.5 Recipient <postmaster@mx.example.com> OK"
    );
    client.line_after("DATA").await;
    client.send("Subject: tcp\r\n\r\nhello\r\n.\r\n").await;
    assert_eq!(client.line().await, "250 2.6.0 Message received");
    assert_eq!(
        client.line_after("QUIT").await,
        "221 2.0.0 mx.example.com Service closing transmission channel"
    );

    signal.send(Signal::Shutdown).unwrap();
    assert!(server.await.unwrap().is_ok());
    assert_eq!(sink.len(), 1);
}
