//! Wire-level tests: a real `Session` on one end of a duplex pipe, a
//! scripted client on the other.

use std::sync::{Arc, Mutex};

use epistle::{
    extensions::{EightBitMime, Pipelining},
    Config, Protocol, Reply, Session, SessionError,
};
use pretty_assertions::assert_eq;
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

type Client = BufReader<DuplexStream>;

fn config() -> Config {
    Config {
        hostname: Some("mx.example.test".to_string()),
        ..Config::default()
    }
}

async fn send(client: &mut Client, text: &str) {
    client.get_mut().write_all(text.as_bytes()).await.unwrap();
}

/// Read one (possibly multi-line) reply; the final line separates code and
/// text with a space.
async fn recv(client: &mut Client) -> Vec<String> {
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        let read = client.read_line(&mut line).await.unwrap();
        if read == 0 {
            break;
        }

        let line = line.trim_end().to_string();
        let done = line.len() < 4 || line.as_bytes().get(3) == Some(&b' ');
        lines.push(line);
        if done {
            break;
        }
    }
    lines
}

async fn recv_one(client: &mut Client) -> String {
    let lines = recv(client).await;
    assert_eq!(lines.len(), 1, "expected a single-line reply: {lines:?}");
    lines.into_iter().next().unwrap()
}

#[tokio::test]
async fn esmtp_end_to_end() {
    let (client, server) = duplex(64 * 1024);
    let mut client = BufReader::new(client);

    let queue: Arc<Mutex<Vec<Vec<u8>>>> = Arc::default();
    let spool = Arc::clone(&queue);

    let mut session = Session::new(server, Protocol::Esmtp, config());
    session.register(Pipelining::default()).unwrap();
    session.register(EightBitMime).unwrap();
    session.set_callback("RCPT", |_engine, payload| {
        let recipient = &payload.args[0];
        match recipient.rsplit_once('@') {
            None => Reply::rejected(513u16, "Syntax error."),
            Some((_, domain)) if domain == "example.com" || domain == "example.org" => {
                Reply::default()
            }
            Some(_) => Reply::rejected(
                554u16,
                format!("{recipient}: Recipient address rejected: Relay access denied"),
            ),
        }
    });
    session.set_callback("DATA", move |_engine, payload| {
        spool
            .lock()
            .unwrap()
            .push(payload.data.unwrap_or_default().to_vec());
        Reply::accepted(250u16, "message queued 1")
    });

    let handle = tokio::spawn(session.run());

    let banner = recv_one(&mut client).await;
    assert!(banner.starts_with("220 mx.example.test ESMTP"));
    assert!(banner.ends_with("Service ready"));

    send(&mut client, "EHLO localhost\r\n").await;
    let ehlo = recv(&mut client).await;
    assert_eq!(ehlo[0], "250-mx.example.test Service ready");
    assert!(ehlo.contains(&"250-PIPELINING".to_string()));
    assert_eq!(ehlo.last().unwrap(), "250 8BITMIME");

    send(&mut client, "MAIL FROM: <from@example.net>\r\n").await;
    assert_eq!(
        recv_one(&mut client).await,
        "250 sender from@example.net OK"
    );

    send(&mut client, "RCPT TO: <to@example.com>\r\n").await;
    assert_eq!(recv_one(&mut client).await, "250 recipient to@example.com OK");

    send(&mut client, "RCPT TO: <to@elsewhere.example>\r\n").await;
    assert_eq!(
        recv_one(&mut client).await,
        "554 to@elsewhere.example: Recipient address rejected: Relay access denied"
    );

    send(&mut client, "DATA\r\n").await;
    assert_eq!(
        recv_one(&mut client).await,
        "354 Start mail input; end with <CRLF>.<CRLF>"
    );

    send(
        &mut client,
        "From: from@example.net\r\nTo: to@example.com\r\nSubject: Test Mail\r\n\r\nThis is test mail.\r\n.\r\n",
    )
    .await;
    assert_eq!(recv_one(&mut client).await, "250 message queued 1");

    send(&mut client, "QUIT\r\n").await;
    assert_eq!(
        recv_one(&mut client).await,
        "221 mx.example.test Service closing transmission channel"
    );

    handle.await.unwrap().unwrap();

    assert_eq!(
        queue.lock().unwrap().as_slice(),
        &[b"From: from@example.net\r\nTo: to@example.com\r\nSubject: Test Mail\r\n\r\nThis is test mail.\r\n".to_vec()]
    );
}

#[tokio::test]
async fn pipelined_commands_get_ordered_replies() {
    let (client, server) = duplex(64 * 1024);
    let mut client = BufReader::new(client);

    let mut session = Session::new(server, Protocol::Esmtp, config());
    session.register(Pipelining::default()).unwrap();
    session.register(EightBitMime).unwrap();

    let handle = tokio::spawn(session.run());

    recv_one(&mut client).await;
    send(&mut client, "EHLO localhost\r\n").await;
    recv(&mut client).await;

    send(
        &mut client,
        "MAIL FROM: <from@example.com> BODY=8BITMIME\r\nRCPT TO: <to@example.com>\r\n",
    )
    .await;
    assert_eq!(
        recv_one(&mut client).await,
        "250 sender from@example.com OK"
    );
    assert_eq!(recv_one(&mut client).await, "250 recipient to@example.com OK");

    send(&mut client, "QUIT\r\n").await;
    recv_one(&mut client).await;
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn helo_session_rejects_mail_options() {
    let (client, server) = duplex(64 * 1024);
    let mut client = BufReader::new(client);

    let mut session = Session::new(server, Protocol::Esmtp, config());
    session.register(EightBitMime).unwrap();

    let handle = tokio::spawn(session.run());

    recv_one(&mut client).await;
    send(&mut client, "HELO localhost\r\n").await;
    assert_eq!(
        recv_one(&mut client).await,
        "250 Requested mail action okey, completed"
    );

    send(&mut client, "MAIL FROM: <from@example.net> BODY=8BITMIME\r\n").await;
    assert_eq!(
        recv_one(&mut client).await,
        "555 Unsupported option: BODY=8BITMIME"
    );

    send(&mut client, "QUIT\r\n").await;
    recv_one(&mut client).await;
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn lmtp_replies_once_per_recipient() {
    let (client, server) = duplex(64 * 1024);
    let mut client = BufReader::new(client);

    let session = Session::new(server, Protocol::Lmtp, config());
    let handle = tokio::spawn(session.run());

    recv_one(&mut client).await;
    send(&mut client, "LHLO localhost\r\n").await;
    let lhlo = recv(&mut client).await;
    assert_eq!(lhlo.last().unwrap(), "250 PIPELINING");

    send(&mut client, "MAIL FROM: <from@example.net>\r\n").await;
    recv_one(&mut client).await;
    send(&mut client, "RCPT TO: <one@example.com>\r\n").await;
    recv_one(&mut client).await;
    send(&mut client, "RCPT TO: <two@example.com>\r\n").await;
    recv_one(&mut client).await;

    send(&mut client, "DATA\r\n").await;
    recv_one(&mut client).await;
    send(&mut client, "shared body\r\n.\r\n").await;

    assert_eq!(recv_one(&mut client).await, "250 Ok");
    assert_eq!(recv_one(&mut client).await, "250 Ok");

    send(&mut client, "QUIT\r\n").await;
    recv_one(&mut client).await;
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn overlong_line_closes_the_session() {
    let (client, server) = duplex(64 * 1024);
    let mut client = BufReader::new(client);

    let session = Session::new(server, Protocol::Smtp, config());
    let handle = tokio::spawn(session.run());

    recv_one(&mut client).await;

    let long = "X".repeat(1100);
    send(&mut client, &long).await;
    assert_eq!(recv_one(&mut client).await, "552 line too long");

    handle.await.unwrap().unwrap();

    // the server end is gone; the next read sees EOF
    assert!(recv(&mut client).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn idle_session_times_out() {
    let (client, server) = duplex(64 * 1024);
    let mut client = BufReader::new(client);

    let session = Session::new(
        server,
        Protocol::Smtp,
        Config {
            idle_timeout: 30,
            ..config()
        },
    );
    let handle = tokio::spawn(session.run());

    recv_one(&mut client).await;

    assert_eq!(
        recv_one(&mut client).await,
        "421 mx.example.test Timeout exceeded, closing transmission channel"
    );
    assert!(matches!(
        handle.await.unwrap(),
        Err(SessionError::Timeout(30))
    ));
}
