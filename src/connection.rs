use crate::{
    address::TargetAddr,
    config::Config,
    error::SessionError,
    relay::Relay,
    session::{Action, Session},
};
use anyhow::Result;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    select, time,
};
use tracing::{debug, info, warn};

/// Size of a single read from the client during the handshake
const READ_CHUNK: usize = 4096;

/// handle_connection runs one client connection from greeting to relay
pub async fn handle_connection(mut stream: TcpStream, config: Arc<Config>) -> Result<()> {
    let mut session = Session::new(Arc::clone(&config));

    // Greeting, auth and request, optionally bounded as a whole
    let handshake = run_handshake(&mut stream, &mut session);
    let target = match bounded(config.handshake_timeout, handshake).await {
        Some(Ok(target)) => target,
        Some(Err(e)) => {
            session.close();
            shutdown(&mut stream).await;
            return Err(e.into());
        }
        None => {
            session.close();
            shutdown(&mut stream).await;
            return Err(SessionError::HandshakeTimeout.into());
        }
    };

    // Connect to target
    info!("connecting to {target}");
    let connecting = connect(&target, config.connect_timeout);
    let mut outbound = match watch_client(&mut stream, &mut session, connecting).await {
        Ok(outbound) => outbound,
        Err(e @ (SessionError::ConnectFailed { .. } | SessionError::ConnectTimeout(_))) => {
            // Single attempt, the reply is best effort
            let _ = stream.write_all(&session.connect_failed()).await;
            shutdown(&mut stream).await;
            return Err(e.into());
        }
        Err(e) => {
            // Client went away first, nobody is left to reply to
            session.close();
            return Err(e.into());
        }
    };

    let bound = match outbound.local_addr() {
        Ok(bound) => bound,
        Err(e) => {
            let _ = stream.write_all(&session.connect_failed()).await;
            shutdown(&mut stream).await;
            return Err(SessionError::Io(e).into());
        }
    };

    let (reply, leftover) = session.connect_succeeded(bound);
    stream.write_all(&reply).await?;

    if !leftover.is_empty() {
        debug!("forwarding {} pipelined bytes to {target}", leftover.len());
        outbound.write_all(&leftover).await?;
    }

    Relay {
        inbound: stream,
        outbound,
    }
    .run()
    .await
}

/// run_handshake reads from the client and performs the session's actions
/// until it asks for a connect
async fn run_handshake(
    stream: &mut TcpStream,
    session: &mut Session,
) -> Result<TargetAddr, SessionError> {
    let mut buf = [0u8; READ_CHUNK];

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(SessionError::ClientClosed);
        }

        let mut target = None;
        for action in session.receive(&buf[..n]) {
            match action {
                Action::Send(bytes) => stream.write_all(&bytes).await?,
                Action::Connect(requested) => target = Some(requested),
                Action::Close(e) => {
                    warn!("closing session: {e}");
                    return Err(e);
                }
            }
        }

        if let Some(target) = target {
            return Ok(target);
        }
    }
}

/// watch_client drives `connecting` while still reading from the client.
/// Bytes that arrive meanwhile are buffered in the session for the
/// destination. A client hangup abandons the connect
async fn watch_client<F>(
    stream: &mut TcpStream,
    session: &mut Session,
    connecting: F,
) -> Result<TcpStream, SessionError>
where
    F: Future<Output = Result<TcpStream, SessionError>>,
{
    tokio::pin!(connecting);
    let mut buf = [0u8; READ_CHUNK];

    loop {
        select! {
            outcome = &mut connecting => return outcome,
            read = stream.read(&mut buf) => match read? {
                0 => return Err(SessionError::ClientClosed),
                n => {
                    debug!("buffering {n} bytes while the connect is pending");
                    session.receive(&buf[..n]);
                }
            },
        }
    }
}

/// connect opens the outbound connection, making exactly one attempt
async fn connect(target: &TargetAddr, limit: Option<Duration>) -> Result<TcpStream, SessionError> {
    let host = target.host();
    match bounded(limit, TcpStream::connect((host.as_str(), target.port))).await {
        Some(Ok(outbound)) => Ok(outbound),
        Some(Err(source)) => Err(SessionError::ConnectFailed {
            target: target.to_string(),
            source,
        }),
        None => Err(SessionError::ConnectTimeout(target.to_string())),
    }
}

/// bounded awaits `fut`, giving up after `limit` when one is set.
/// Returns None on timeout
async fn bounded<F: Future>(limit: Option<Duration>, fut: F) -> Option<F::Output> {
    match limit {
        Some(limit) => time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}

/// shutdown closes the write half, ignoring errors from an already
/// closed socket
async fn shutdown(stream: &mut TcpStream) {
    let _ = stream.shutdown().await;
}
