// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound pipeline: dedupe, session attach, auth-cache check, workflow vs
//! command routing, response delivery.

use std::sync::Arc;

use crate::commands::parser::parse_command;
use crate::commands::processor::CommandProcessor;
use crate::commands::CommandRegistry;
use crate::db::system_rooms;
use crate::error::ErrorCode;
use crate::state::Services;
use crate::transport::meshcore::coordinator::SessionCoordinator;
use crate::transport::meshcore::dedupe::MessageDeduplicator;
use crate::transport::meshcore::disconnect_session;
use crate::transport::meshcore::node_auth::NodeAuth;
use crate::transport::meshcore::protocol::ProtocolHandler;
use crate::transport::packets::{FromUser, FromUserPayload, ToUser};
use crate::transport::prompt::insert_prompt;
use crate::workflows::{WorkflowKind, WorkflowRegistry};

pub struct MessageRouter {
    services: Services,
    registry: Arc<CommandRegistry>,
    workflows: Arc<WorkflowRegistry>,
    processor: Arc<CommandProcessor>,
    protocol: Arc<ProtocolHandler>,
    coordinator: Arc<SessionCoordinator>,
    dedupe: Arc<MessageDeduplicator>,
    node_auth: NodeAuth,
}

impl MessageRouter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        services: Services,
        registry: Arc<CommandRegistry>,
        workflows: Arc<WorkflowRegistry>,
        processor: Arc<CommandProcessor>,
        protocol: Arc<ProtocolHandler>,
        coordinator: Arc<SessionCoordinator>,
        dedupe: Arc<MessageDeduplicator>,
    ) -> Arc<Self> {
        let node_auth =
            NodeAuth::new(services.db.clone(), Arc::clone(&services.config));
        Arc::new(Self {
            services,
            registry,
            workflows,
            processor,
            protocol,
            coordinator,
            dedupe,
            node_auth,
        })
    }

    /// Handle one inbound contact message. Never propagates errors; a
    /// failure here must not take down the event pump.
    pub async fn handle_contact_msg(&self, node_id: &str, text: &str) {
        if let Err(e) = self.route(node_id, text).await {
            tracing::error!(node_id = %node_id, err = %e, "message routing failed");
            // Best-effort notice; the subscription stays alive regardless.
            let _ = self
                .protocol
                .send_text(node_id, "user", "System temporarily unavailable. Please try later.")
                .await;
        }
    }

    async fn route(&self, node_id: &str, text: &str) -> anyhow::Result<()> {
        if node_id.is_empty() || text.is_empty() {
            tracing::warn!("malformed message event, dropping");
            return Ok(());
        }

        if self.dedupe.is_duplicate(node_id, text) {
            tracing::debug!(node_id = %node_id, "duplicate message, skipping");
            return Ok(());
        }

        let (session_id, is_new_session) =
            match self.services.sessions.get_session_by_node_id(node_id) {
                Some(session_id) => (session_id, false),
                None => {
                    let session_id = self.services.sessions.create_session(Some(node_id));
                    SessionCoordinator::start_listener(&self.coordinator, &session_id);
                    (session_id, true)
                }
            };

        // Workflow input short-circuits everything else.
        if self.services.sessions.get_workflow(&session_id).is_some() {
            let packet = FromUser {
                session_id: session_id.clone(),
                payload: FromUserPayload::WorkflowResponse(text.to_owned()),
            };
            return self.dispatch(node_id, &session_id, packet).await;
        }

        let cached_username = self.node_auth.has_cache(node_id).await?;
        let Some(username) = cached_username else {
            tracing::info!(node_id = %node_id, "no password cache, starting login");
            return self.start_login(node_id, &session_id).await;
        };

        // Valid cache: refresh it and log the session in.
        self.node_auth.touch(&username, node_id).await?;
        self.services.sessions.mark_username(&session_id, Some(&username));
        self.services.sessions.mark_logged_in(&session_id, true);

        if is_new_session {
            // Reconnection after expiry. The inbound text only served to
            // re-establish contact; don't interpret it as a command.
            self.place_in_starting_room(&session_id).await;
            let mut welcome = ToUser::new(
                &session_id,
                format!("Welcome back, {username}! You've been automatically logged in."),
            );
            insert_prompt(&self.services, &session_id, &mut welcome).await;
            tokio::time::sleep(self.meshcore_delay()).await;
            let sent = self
                .protocol
                .send_to_node(node_id, &username, &[welcome])
                .await
                .unwrap_or(false);
            if !sent {
                tracing::warn!(node_id = %node_id, "no ack for welcome back message");
                disconnect_session(
                    &self.services.sessions,
                    &self.protocol,
                    &self.coordinator,
                    &session_id,
                )
                .await;
            }
            return Ok(());
        }

        let packet = match parse_command(&self.registry, text) {
            Some(cmd) => FromUser {
                session_id: session_id.clone(),
                payload: FromUserPayload::Command(cmd),
            },
            None => {
                let mut reply = ToUser::error(
                    &session_id,
                    ErrorCode::UnknownCommand,
                    "Unknown command. H for help.",
                );
                insert_prompt(&self.services, &session_id, &mut reply).await;
                let sent = self
                    .protocol
                    .send_to_node(node_id, &username, &[reply])
                    .await
                    .unwrap_or(false);
                if !sent {
                    disconnect_session(
                        &self.services.sessions,
                        &self.protocol,
                        &self.coordinator,
                        &session_id,
                    )
                    .await;
                }
                return Ok(());
            }
        };
        self.dispatch(node_id, &session_id, packet).await
    }

    /// Run the packet through the command processor and deliver replies,
    /// appending the prompt to the final one.
    async fn dispatch(
        &self,
        node_id: &str,
        session_id: &str,
        packet: FromUser,
    ) -> anyhow::Result<()> {
        let mut replies = self.processor.process(packet).await;

        // A quit leaves no session behind; its listener must go too.
        let session_alive = self.services.sessions.validate_session(session_id);
        if !session_alive {
            self.coordinator.cleanup_listener(session_id);
        }

        if let Some(last) = replies.last_mut() {
            if session_alive {
                insert_prompt(&self.services, session_id, last).await;
            }
        }

        let username = self
            .services
            .sessions
            .get_session_state(session_id)
            .and_then(|s| s.username)
            .unwrap_or_default();

        tokio::time::sleep(self.meshcore_delay()).await;
        for reply in &replies {
            let sent = self
                .protocol
                .send_to_node(node_id, &username, std::slice::from_ref(reply))
                .await
                .unwrap_or(false);
            if !sent {
                tracing::warn!(node_id = %node_id, "reply not acknowledged, disconnecting");
                if session_alive {
                    disconnect_session(
                        &self.services.sessions,
                        &self.protocol,
                        &self.coordinator,
                        session_id,
                    )
                    .await;
                }
                return Ok(());
            }
        }
        Ok(())
    }

    async fn start_login(&self, node_id: &str, session_id: &str) -> anyhow::Result<()> {
        let replies = self
            .workflows
            .start_workflow(&self.services, session_id, WorkflowKind::Login)
            .await?;
        let sent = self
            .protocol
            .send_to_node(node_id, "unknown", &replies)
            .await
            .unwrap_or(false);
        if !sent {
            disconnect_session(
                &self.services.sessions,
                &self.protocol,
                &self.coordinator,
                session_id,
            )
            .await;
        }
        Ok(())
    }

    /// Drop the session into the configured starting room.
    async fn place_in_starting_room(&self, session_id: &str) {
        let starting = &self.services.config.bbs.starting_room;
        let room_id = match self.services.rooms.get_id_by_name(starting).await {
            Ok(Some(id)) => id,
            _ => system_rooms::LOBBY,
        };
        self.services.sessions.set_current_room(session_id, room_id);
    }

    fn meshcore_delay(&self) -> std::time::Duration {
        self.services.config.transport.meshcore.inter_packet_delay()
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
