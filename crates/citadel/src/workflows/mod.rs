// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multi-step interactive dialogues attached to sessions.
//!
//! While a workflow is attached, raw user text is routed to its `handle`
//! hook instead of the command dispatcher. Workflows mutate their step and
//! data through the session manager; the engine only ever sees
//! [`WorkflowState`] snapshots.

mod create_room;
mod edit_user;
mod enter_message;
mod login;
mod register_user;
mod validate_users;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;

use crate::error::ErrorCode;
use crate::session::{WorkflowData, WorkflowState};
use crate::state::Services;
use crate::transport::packets::ToUser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowKind {
    Login,
    RegisterUser,
    EnterMessage,
    CreateRoom,
    ValidateUsers,
    EditUser,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::RegisterUser => "register_user",
            Self::EnterMessage => "enter_message",
            Self::CreateRoom => "create_room",
            Self::ValidateUsers => "validate_users",
            Self::EditUser => "edit_user",
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a workflow hook may touch.
pub struct WorkflowContext<'a> {
    pub session_id: &'a str,
    pub services: &'a Services,
    pub registry: &'a WorkflowRegistry,
    pub wf_state: WorkflowState,
}

impl WorkflowContext<'_> {
    /// Store a new step/data pair for this session's workflow.
    fn advance(&self, step: u32, data: WorkflowData) {
        self.services
            .sessions
            .set_workflow(self.session_id, WorkflowState::at_step(self.wf_state.kind, step, data));
    }

    fn clear(&self) {
        self.services.sessions.clear_workflow(self.session_id);
    }

    fn reply(&self, text: impl Into<String>) -> ToUser {
        ToUser::new(self.session_id, text)
    }

    fn error(&self, code: ErrorCode, text: impl Into<String>) -> ToUser {
        ToUser::error(self.session_id, code, text)
    }

    fn invalid_step(&self) -> Vec<ToUser> {
        vec![self.error(
            ErrorCode::InvalidStep,
            format!("Unknown step {} in workflow {}", self.wf_state.step, self.wf_state.kind),
        )]
    }
}

#[async_trait]
pub trait Workflow: Send + Sync {
    fn kind(&self) -> WorkflowKind;

    /// Invoked when a command transitions the session into this workflow.
    async fn start(&self, ctx: &WorkflowContext<'_>) -> anyhow::Result<Vec<ToUser>>;

    /// Invoked for every subsequent input while attached.
    async fn handle(&self, ctx: &WorkflowContext<'_>, input: &str) -> anyhow::Result<Vec<ToUser>>;

    /// Invoked on explicit cancellation to undo side effects.
    async fn cleanup(&self, ctx: &WorkflowContext<'_>) -> anyhow::Result<()> {
        let _ = ctx;
        Ok(())
    }
}

/// All workflow handlers, built once at startup and passed by reference.
pub struct WorkflowRegistry {
    handlers: HashMap<WorkflowKind, Box<dyn Workflow>>,
}

impl WorkflowRegistry {
    pub fn builtin() -> Self {
        let handlers: Vec<Box<dyn Workflow>> = vec![
            Box::new(login::LoginWorkflow),
            Box::new(register_user::RegisterUserWorkflow),
            Box::new(enter_message::EnterMessageWorkflow),
            Box::new(create_room::CreateRoomWorkflow),
            Box::new(validate_users::ValidateUsersWorkflow),
            Box::new(edit_user::EditUserWorkflow),
        ];
        Self { handlers: handlers.into_iter().map(|h| (h.kind(), h)).collect() }
    }

    pub fn get(&self, kind: WorkflowKind) -> Option<&dyn Workflow> {
        self.handlers.get(&kind).map(Box::as_ref)
    }

    /// Attach `kind` to the session at step 1 and run its start hook.
    pub async fn start_workflow(
        &self,
        services: &Services,
        session_id: &str,
        kind: WorkflowKind,
    ) -> anyhow::Result<Vec<ToUser>> {
        let state = WorkflowState::new(kind);
        services.sessions.set_workflow(session_id, state.clone());
        let Some(handler) = self.get(kind) else {
            services.sessions.clear_workflow(session_id);
            return Ok(vec![ToUser::error(
                session_id,
                ErrorCode::WorkflowNotFound,
                format!("Workflow {kind} not found"),
            )]);
        };
        let ctx =
            WorkflowContext { session_id, services, registry: self, wf_state: state };
        handler.start(&ctx).await
    }
}

pub(crate) fn data_str<'a>(data: &'a WorkflowData, key: &str) -> Option<&'a str> {
    data.get(key).and_then(|v| v.as_str())
}

pub(crate) fn data_u64(data: &WorkflowData, key: &str) -> Option<u64> {
    data.get(key).and_then(serde_json::Value::as_u64)
}
