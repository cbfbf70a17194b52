// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command dispatch: session validation, workflow delegation, permission
//! enforcement.

use std::sync::Arc;

use crate::auth::checker::is_allowed;
use crate::commands::{builtins, CommandRegistry, CommandSpec};
use crate::error::ErrorCode;
use crate::rooms::Room;
use crate::state::Services;
use crate::transport::packets::{FromUser, FromUserPayload, ToUser};
use crate::workflows::{WorkflowContext, WorkflowRegistry};

pub struct CommandProcessor {
    pub(crate) services: Services,
    pub(crate) registry: Arc<CommandRegistry>,
    pub(crate) workflows: Arc<WorkflowRegistry>,
}

impl CommandProcessor {
    pub fn new(
        services: Services,
        registry: Arc<CommandRegistry>,
        workflows: Arc<WorkflowRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self { services, registry, workflows })
    }

    /// Run one inbound packet through validation, workflow delegation or
    /// command dispatch. Always produces at least one reply; internal
    /// failures surface as `internal_error`.
    pub async fn process(&self, packet: FromUser) -> Vec<ToUser> {
        let session_id = packet.session_id.clone();

        let Some(snapshot) = self.services.sessions.get_session_state(&session_id) else {
            return vec![ToUser::error(
                &session_id,
                ErrorCode::InvalidSession,
                "Session expired or invalid.",
            )];
        };
        self.services.sessions.touch_session(&session_id);

        // An attached workflow captures all input.
        if let Some(wf_state) = snapshot.workflow.clone() {
            let input = match &packet.payload {
                FromUserPayload::WorkflowResponse(text) => text.clone(),
                FromUserPayload::Command(cmd) => {
                    // Transports route raw text while a workflow is attached;
                    // a parsed command here means a transport bug.
                    tracing::warn!(session_id = %session_id, code = %cmd.code,
                        "command payload while workflow attached");
                    return vec![ToUser::error(
                        &session_id,
                        ErrorCode::InvalidCommand,
                        "Finish or cancel the current workflow first.",
                    )];
                }
            };

            if input.trim().eq_ignore_ascii_case("cancel") {
                return self.cancel_workflow(&session_id).await;
            }

            let Some(handler) = self.workflows.get(wf_state.kind) else {
                self.services.sessions.clear_workflow(&session_id);
                return vec![ToUser::error(
                    &session_id,
                    ErrorCode::WorkflowNotFound,
                    format!("Unknown workflow: {}", wf_state.kind),
                )];
            };
            let ctx = WorkflowContext {
                session_id: &session_id,
                services: &self.services,
                registry: &self.workflows,
                wf_state,
            };
            return match handler.handle(&ctx, &input).await {
                Ok(replies) => replies,
                Err(e) => {
                    tracing::error!(session_id = %session_id, err = %e, "workflow failed");
                    vec![ToUser::error(
                        &session_id,
                        ErrorCode::InternalError,
                        "Something went wrong. Please try again.",
                    )]
                }
            };
        }

        let cmd = match packet.payload {
            FromUserPayload::Command(cmd) => cmd,
            FromUserPayload::WorkflowResponse(_) => {
                return vec![ToUser::error(
                    &session_id,
                    ErrorCode::NoWorkflow,
                    "No active workflow.",
                )];
            }
        };

        let Some(spec) = self.registry.get(cmd.code) else {
            return vec![ToUser::error(
                &session_id,
                ErrorCode::UnknownCommand,
                format!("Unknown command: {}", cmd.code),
            )];
        };

        let Some(username) = snapshot.username.clone() else {
            return vec![ToUser::error(
                &session_id,
                ErrorCode::InvalidSession,
                "You are not logged in.",
            )];
        };
        let user = match self.services.users.load(&username).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                return vec![ToUser::error(
                    &session_id,
                    ErrorCode::InvalidSession,
                    "You are not logged in.",
                )];
            }
            Err(e) => return self.internal_error(&session_id, &e),
        };

        let room = match snapshot.current_room {
            Some(room_id) => match self.services.rooms.load(room_id).await {
                Ok(room) => room,
                Err(e) => return self.internal_error(&session_id, &e),
            },
            None => None,
        };

        if !spec.implemented {
            return vec![ToUser::new(
                &session_id,
                format!("{} - {} (not yet implemented)", spec.code, spec.short_text),
            )];
        }

        if !is_allowed(spec.permission_level, spec.room_access, &user, room.as_ref()) {
            return vec![permission_denied(&session_id, spec, room.as_ref())];
        }

        match builtins::run(self, &session_id, &cmd, &snapshot, &user, room.as_ref()).await {
            Ok(replies) => replies,
            Err(e) => {
                tracing::error!(session_id = %session_id, code = %cmd.code, err = %e,
                    "command failed");
                self.internal_error(&session_id, &e)
            }
        }
    }

    /// Cancel the attached workflow: run its cleanup hook (errors logged,
    /// never fatal) and detach it.
    pub async fn cancel_workflow(&self, session_id: &str) -> Vec<ToUser> {
        let Some(wf_state) = self.services.sessions.get_workflow(session_id) else {
            return vec![ToUser::error(
                session_id,
                ErrorCode::NoWorkflow,
                "No active workflow to cancel.",
            )];
        };
        let kind = wf_state.kind;
        if let Some(handler) = self.workflows.get(kind) {
            let ctx = WorkflowContext {
                session_id,
                services: &self.services,
                registry: &self.workflows,
                wf_state,
            };
            if let Err(e) = handler.cleanup(&ctx).await {
                tracing::warn!(session_id = %session_id, workflow = %kind, err = %e,
                    "workflow cleanup failed");
            }
        }
        self.services.sessions.clear_workflow(session_id);
        vec![ToUser::new(session_id, format!("Cancelled {kind} workflow."))]
    }

    fn internal_error(&self, session_id: &str, e: &anyhow::Error) -> Vec<ToUser> {
        tracing::error!(session_id = %session_id, err = %e, "internal error");
        vec![ToUser::error(
            session_id,
            ErrorCode::InternalError,
            "Something went wrong. Please try again.",
        )]
    }
}

fn permission_denied(session_id: &str, spec: &CommandSpec, room: Option<&Room>) -> ToUser {
    let place = match room {
        Some(room) => room.name.clone(),
        None => "this context".to_owned(),
    };
    ToUser::error(
        session_id,
        ErrorCode::PermissionDenied,
        format!(
            "You do not have permission to {} in {place}.",
            spec.short_text.to_lowercase()
        ),
    )
}

#[cfg(test)]
#[path = "processor_tests.rs"]
mod tests;
