// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local admin transport: a line-oriented Unix socket sharing the command
//! processor and session manager with the mesh engine.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::commands::parser::parse_command;
use crate::commands::processor::CommandProcessor;
use crate::commands::CommandRegistry;
use crate::error::ErrorCode;
use crate::state::Services;
use crate::transport::meshcore::protocol::format_message;
use crate::transport::packets::{FromUser, FromUserPayload, ToUser};
use crate::transport::prompt::insert_prompt;
use crate::workflows::{WorkflowKind, WorkflowRegistry};

pub struct CliEngine {
    services: Services,
    registry: Arc<CommandRegistry>,
    processor: Arc<CommandProcessor>,
    workflows: Arc<WorkflowRegistry>,
    socket_path: PathBuf,
    state: tokio::sync::Mutex<Option<CancellationToken>>,
}

impl CliEngine {
    pub fn new(
        services: Services,
        registry: Arc<CommandRegistry>,
        workflows: Arc<WorkflowRegistry>,
    ) -> Arc<Self> {
        let processor = CommandProcessor::new(
            services.clone(),
            Arc::clone(&registry),
            Arc::clone(&workflows),
        );
        let socket_path = services.config.transport.cli.socket.clone();
        Arc::new(Self {
            services,
            registry,
            processor,
            workflows,
            socket_path,
            state: tokio::sync::Mutex::new(None),
        })
    }

    pub async fn start(this: &Arc<Self>) -> anyhow::Result<()> {
        let mut state = this.state.lock().await;
        if state.is_some() {
            return Ok(());
        }
        if this.socket_path.exists() {
            std::fs::remove_file(&this.socket_path)
                .with_context(|| format!("removing stale socket {:?}", this.socket_path))?;
        }
        let listener = UnixListener::bind(&this.socket_path)
            .with_context(|| format!("binding {:?}", this.socket_path))?;
        let cancel = CancellationToken::new();

        let engine = Arc::clone(this);
        let accept_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut client_count: u64 = 0;
            loop {
                let accepted = tokio::select! {
                    _ = accept_cancel.cancelled() => break,
                    accepted = listener.accept() => accepted,
                };
                match accepted {
                    Ok((stream, _)) => {
                        client_count += 1;
                        let engine = Arc::clone(&engine);
                        let client_cancel = accept_cancel.clone();
                        tokio::spawn(async move {
                            if let Err(e) =
                                engine.handle_client(stream, client_count, client_cancel).await
                            {
                                tracing::warn!(client = client_count, err = %e,
                                    "cli client session ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(err = %e, "cli accept failed");
                    }
                }
            }
            tracing::info!("cli accept loop shut down");
        });

        *state = Some(cancel);
        tracing::info!(socket = ?this.socket_path, "cli transport engine started");
        Ok(())
    }

    pub async fn stop(&self) {
        let Some(cancel) = self.state.lock().await.take() else { return };
        cancel.cancel();
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
        tracing::info!("cli transport engine stopped");
    }

    async fn handle_client(
        &self,
        stream: UnixStream,
        client_id: u64,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        tracing::info!(client = client_id, "cli client connected");
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half).lines();

        // Single writer task; both the command loop and the session outbox
        // feed it.
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let writer = tokio::spawn(async move {
            while let Some(line) = out_rx.recv().await {
                if write_half.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if write_half.write_all(b"\n").await.is_err() {
                    break;
                }
            }
            let _ = write_half.shutdown().await;
        });

        let session_id = self.services.sessions.create_session(None);
        let _ = out_tx.send("CONNECTED".to_owned());
        let _ = out_tx.send(format!("SESSION_ID: {session_id}"));

        // Async notifications (mail, expiry notices) flow through the
        // session outbox like any other transport.
        {
            let outbox = self.services.sessions.take_outbox(&session_id);
            if let Some(mut outbox) = outbox {
                let out_tx = out_tx.clone();
                let outbox_cancel = cancel.clone();
                tokio::spawn(async move {
                    loop {
                        let packet = tokio::select! {
                            _ = outbox_cancel.cancelled() => break,
                            packet = outbox.recv() => packet,
                        };
                        let Some(packet) = packet else { break };
                        if out_tx.send(render(&packet)).is_err() {
                            break;
                        }
                    }
                });
            }
        }

        // Local users go straight into the login workflow.
        let replies = self
            .workflows
            .start_workflow(&self.services, &session_id, WorkflowKind::Login)
            .await?;
        for reply in &replies {
            let _ = out_tx.send(render(reply));
        }

        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = reader.next_line() => line,
            };
            let Some(line) = line.context("cli read failed")? else {
                break;
            };
            let line = line.trim().to_owned();
            if line.is_empty() {
                continue;
            }

            // An anonymous session with no workflow (blocked or cancelled
            // login) gets a fresh login prompt; the input itself is only
            // the knock on the door.
            let logged_in = self
                .services
                .sessions
                .get_session_state(&session_id)
                .map(|s| s.logged_in)
                .unwrap_or(false);
            if !logged_in && self.services.sessions.get_workflow(&session_id).is_none() {
                let replies = self
                    .workflows
                    .start_workflow(&self.services, &session_id, WorkflowKind::Login)
                    .await?;
                for reply in &replies {
                    let _ = out_tx.send(render(reply));
                }
                continue;
            }

            let packet = self.packet_for(&session_id, &line);
            let Some(packet) = packet else {
                let _ = out_tx.send(format!(
                    "ERROR[{}]: Unknown command. H for help.",
                    ErrorCode::UnknownCommand
                ));
                continue;
            };

            let mut replies = self.processor.process(packet).await;
            let session_alive = self.services.sessions.validate_session(&session_id);
            if let Some(last) = replies.last_mut() {
                if session_alive {
                    insert_prompt(&self.services, &session_id, last).await;
                }
            }
            for reply in &replies {
                if reply.session_id != session_id {
                    let _ = out_tx.send(format!("SESSION_ID: {}", reply.session_id));
                }
                let _ = out_tx.send(render(reply));
            }
            if !session_alive {
                let _ = out_tx.send("DISCONNECTED".to_owned());
                break;
            }
        }

        self.services.sessions.expire_session(&session_id);
        drop(out_tx);
        let _ = writer.await;
        tracing::info!(client = client_id, "cli client disconnected");
        Ok(())
    }

    fn packet_for(&self, session_id: &str, line: &str) -> Option<FromUser> {
        if self.services.sessions.get_workflow(session_id).is_some() {
            return Some(FromUser {
                session_id: session_id.to_owned(),
                payload: FromUserPayload::WorkflowResponse(line.to_owned()),
            });
        }
        let cmd = parse_command(&self.registry, line)?;
        Some(FromUser {
            session_id: session_id.to_owned(),
            payload: FromUserPayload::Command(cmd),
        })
    }
}

/// Render a packet for the line protocol.
fn render(packet: &ToUser) -> String {
    let body = match &packet.message {
        Some(view) => format_message(view),
        None => packet.text.clone(),
    };
    if packet.is_error {
        let code = packet
            .error_code
            .map(|c| c.as_str())
            .unwrap_or("error");
        format!("ERROR[{code}]: {body}")
    } else {
        body
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
