//! Per-connection session loop
//!
//! Reads one command per line, dispatches it and writes exactly one
//! response line back. Errors in a request never close the connection;
//! only I/O failures or end of stream do.

use std::sync::Arc;

use crate::command_handlers::CommandHandlers;
use crate::connection::{Connection, Line, MAX_LINE_LENGTH};
use crate::dispatch_context::DispatchContext;
use crate::error::{Error, Result};
use crate::protocol::{parse_command, Response};

/// Control protocol session for one plugin connection
pub struct Session {
    connection: Connection,
    context: DispatchContext,
    handlers: Arc<CommandHandlers>,
}

impl Session {
    pub fn new(connection: Connection, context: DispatchContext, handlers: Arc<CommandHandlers>) -> Self {
        Self {
            connection,
            context,
            handlers,
        }
    }

    /// Serve requests until the peer closes the connection
    pub async fn run(&self) -> Result<()> {
        log::debug!("Connection from {}", self.connection.peer());

        loop {
            let response = match self.connection.read_line().await? {
                Line::Closed => break,
                Line::TooLong => reject(Error::MalformedCommand(format!(
                    "request longer than {} bytes",
                    MAX_LINE_LENGTH
                ))),
                Line::Bytes(bytes) => match String::from_utf8(bytes) {
                    Ok(line) => {
                        log::debug!("Received request: {}", line.trim_end());
                        self.process_line(&line).await
                    }
                    Err(e) => reject(Error::MalformedCommand(format!(
                        "request is not valid UTF-8 ({})",
                        e.utf8_error()
                    ))),
                },
            };
            log::debug!("Returning: {}", response.to_string().trim_end());
            self.connection.write_response(&response).await?;
        }

        log::debug!("Connection from {} closed", self.connection.peer());
        Ok(())
    }

    async fn process_line(&self, line: &str) -> Response {
        match parse_command(line) {
            Ok(command) => self.handlers.handle(&command, &self.context).await,
            Err(e) => reject(e),
        }
    }
}

fn reject(error: Error) -> Response {
    log::warn!("Rejecting request: {}", error);
    Response::error(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{dispatch_context, RecordingDeliverer};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::UnixStream;

    const REGISTER: &[u8] = b"REGISTER aps-account-id=\"A1\"\taps-device-token=\"D1\"\taps-subtopic=\"com.apple.mobilemail\"\tdovecot-username=\"alice\"\tdovecot-mailboxes=(\"INBOX\")\n";

    async fn start_session() -> (BufReader<UnixStream>, DispatchContext) {
        let context = dispatch_context(Arc::new(RecordingDeliverer::new())).await;
        let (server_stream, client_stream) = UnixStream::pair().unwrap();
        let session = Session::new(
            Connection::unix(server_stream),
            context.clone(),
            Arc::new(CommandHandlers::with_defaults()),
        );
        tokio::spawn(async move { session.run().await });
        (BufReader::new(client_stream), context)
    }

    async fn response(client: &mut BufReader<UnixStream>) -> String {
        let mut line = String::new();
        client.read_line(&mut line).await.unwrap();
        line
    }

    #[tokio::test]
    async fn test_invalid_utf8_keeps_connection_open() {
        let (mut client, context) = start_session().await;

        client
            .get_mut()
            .write_all(b"NOTIFY dovecot-username=\"\xff\xfe\"\n")
            .await
            .unwrap();
        let rejected = response(&mut client).await;
        assert!(rejected.starts_with("ERROR Malformed command: request is not valid UTF-8"));

        client.get_mut().write_all(REGISTER).await.unwrap();
        assert_eq!(response(&mut client).await, "OK com.apple.mail.XServer.test\n");
        assert_eq!(context.registry.find("alice", "INBOX").await.len(), 1);
    }

    #[tokio::test]
    async fn test_overlong_request_keeps_connection_open() {
        let (mut client, _context) = start_session().await;

        let mut request = b"NOTIFY dovecot-username=\"".to_vec();
        request.extend(std::iter::repeat(b'a').take(MAX_LINE_LENGTH + 10));
        request.extend_from_slice(b"\"\n");
        client.get_mut().write_all(&request).await.unwrap();

        assert_eq!(
            response(&mut client).await,
            format!(
                "ERROR Malformed command: request longer than {} bytes\n",
                MAX_LINE_LENGTH
            )
        );

        client.get_mut().write_all(REGISTER).await.unwrap();
        assert_eq!(response(&mut client).await, "OK com.apple.mail.XServer.test\n");
    }
}
