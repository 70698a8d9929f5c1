//! Control socket server

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UnixListener};

use crate::command_handlers::CommandHandlers;
use crate::connection::Connection;
use crate::dispatch_context::DispatchContext;
use crate::error::Result;
use crate::session::Session;

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Control protocol server accepting plugin connections
#[derive(Clone)]
pub struct PushServer {
    context: DispatchContext,
    handlers: Arc<CommandHandlers>,
}

impl PushServer {
    /// Create a server with the built-in REGISTER and NOTIFY handlers
    pub fn new(context: DispatchContext) -> Self {
        Self {
            context,
            handlers: Arc::new(CommandHandlers::with_defaults()),
        }
    }

    /// Serve connections from an existing UnixListener
    pub async fn listen_on_unix(&self, listener: UnixListener) {
        let listener = &listener;
        self.accept_loop(move || async move {
            let (stream, _) = listener.accept().await?;
            Ok(Connection::unix(stream))
        })
        .await
    }

    /// Serve connections from an existing TcpListener
    pub async fn listen_on_tcp(&self, listener: TcpListener) {
        let listener = &listener;
        self.accept_loop(move || async move {
            let (stream, _) = listener.accept().await?;
            Connection::tcp(stream)
        })
        .await
    }

    /// Spawn a session per accepted connection
    ///
    /// A failed accept is logged and retried after a short pause, so a
    /// burst of errors such as running out of file descriptors does not
    /// take the listener down.
    async fn accept_loop<F, Fut>(&self, mut accept: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Connection>>,
    {
        loop {
            match accept().await {
                Ok(connection) => self.spawn_session(connection),
                Err(e) => {
                    log::error!("Accept error: {}", e);
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }
    }

    fn spawn_session(&self, connection: Connection) {
        let session = Session::new(connection, self.context.clone(), Arc::clone(&self.handlers));
        tokio::spawn(async move {
            if let Err(e) = session.run().await {
                log::error!("Session error: {}", e);
            }
        });
    }
}

/// Bind a Unix socket any local process can connect to
///
/// A socket file left behind by a previous run is removed first.
pub fn bind_unix_socket<P: AsRef<Path>>(path: P) -> Result<UnixListener> {
    let path = path.as_ref();
    match std::fs::remove_file(path) {
        Ok(()) => log::debug!("Removed stale socket {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let listener = UnixListener::bind(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o777))?;
    }

    log::info!("Listening on {}", path.display());
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::test_support::{dispatch_context, RecordingDeliverer};
    use std::collections::VecDeque;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::UnixStream;

    #[tokio::test]
    async fn test_accept_errors_do_not_stop_listener() {
        let server = PushServer::new(dispatch_context(Arc::new(RecordingDeliverer::new())).await);
        let (server_stream, client_stream) = UnixStream::pair().unwrap();

        let mut accepted: VecDeque<Result<Connection>> = VecDeque::new();
        accepted.push_back(Err(Error::Io(std::io::Error::from_raw_os_error(24))));
        accepted.push_back(Err(Error::Io(std::io::Error::from_raw_os_error(103))));
        accepted.push_back(Ok(Connection::unix(server_stream)));
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&attempts);
        let listener = tokio::spawn(async move {
            server
                .accept_loop(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let next = accepted.pop_front();
                    async move {
                        match next {
                            Some(result) => result,
                            None => std::future::pending().await,
                        }
                    }
                })
                .await
        });

        let mut client = BufReader::new(client_stream);
        client
            .get_mut()
            .write_all(b"REGISTER aps-account-id=\"A1\"\taps-device-token=\"D1\"\taps-subtopic=\"com.apple.mobilemail\"\tdovecot-username=\"alice\"\tdovecot-mailboxes=(\"INBOX\")\n")
            .await
            .unwrap();
        let mut response = String::new();
        client.read_line(&mut response).await.unwrap();

        assert_eq!(response, "OK com.apple.mail.XServer.test\n");
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert!(!listener.is_finished());
        listener.abort();
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("push.sock");
        std::fs::write(&path, b"stale").unwrap();

        let _listener = bind_unix_socket(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o777);
    }
}
