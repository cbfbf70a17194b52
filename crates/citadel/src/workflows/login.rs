// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Login dialogue: username, password, three-strikes lockout.

use async_trait::async_trait;

use crate::error::ErrorCode;
use crate::transport::meshcore::node_auth::NodeAuth;
use crate::transport::packets::{HintKind, PacketHints, ToUser};
use crate::workflows::{data_str, data_u64, Workflow, WorkflowContext, WorkflowKind};

const MAX_ATTEMPTS: u64 = 3;

/// Step 1 awaits the username, step 2 the password. Failed attempts are
/// counted in workflow data across both steps.
pub struct LoginWorkflow;

#[async_trait]
impl Workflow for LoginWorkflow {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::Login
    }

    async fn start(&self, ctx: &WorkflowContext<'_>) -> anyhow::Result<Vec<ToUser>> {
        ctx.advance(1, ctx.wf_state.data.clone());
        Ok(vec![self.username_prompt(ctx, None)])
    }

    async fn handle(&self, ctx: &WorkflowContext<'_>, input: &str) -> anyhow::Result<Vec<ToUser>> {
        match ctx.wf_state.step {
            1 => self.handle_username(ctx, input).await,
            2 => self.handle_password(ctx, input).await,
            _ => Ok(ctx.invalid_step()),
        }
    }

    /// A cancelled login must not leave a half-bound username behind.
    async fn cleanup(&self, ctx: &WorkflowContext<'_>) -> anyhow::Result<()> {
        let Some(state) = ctx.services.sessions.get_session_state(ctx.session_id) else {
            return Ok(());
        };
        if !state.logged_in && ctx.wf_state.data.contains_key("username") {
            ctx.services.sessions.mark_username(ctx.session_id, None);
            tracing::info!(session_id = %ctx.session_id,
                "reset session to anonymous after login cancellation");
        }
        Ok(())
    }
}

impl LoginWorkflow {
    fn username_prompt(&self, ctx: &WorkflowContext<'_>, error: Option<(ErrorCode, String)>) -> ToUser {
        let hints = PacketHints::workflow(self.kind().as_str(), 1, HintKind::Text);
        match error {
            Some((code, text)) => {
                ToUser::error(ctx.session_id, code, format!("{text}\nEnter your username:"))
                    .with_hints(hints)
            }
            None => ctx.reply("Enter your username:").with_hints(hints),
        }
    }

    async fn handle_username(
        &self,
        ctx: &WorkflowContext<'_>,
        input: &str,
    ) -> anyhow::Result<Vec<ToUser>> {
        let username = input.trim();
        let mut data = ctx.wf_state.data.clone();

        if username.eq_ignore_ascii_case("new") {
            // Hand the session over to registration.
            return ctx
                .registry
                .start_workflow(ctx.services, ctx.session_id, WorkflowKind::RegisterUser)
                .await;
        }

        if !ctx.services.users.username_exists(username).await? {
            let attempts = data_u64(&data, "attempts").unwrap_or(0) + 1;
            if attempts >= MAX_ATTEMPTS {
                return Ok(self.blocked(ctx));
            }
            data.insert("attempts".to_owned(), attempts.into());
            ctx.advance(1, data);
            return Ok(vec![self.username_prompt(
                ctx,
                Some((
                    ErrorCode::InvalidUsername,
                    format!(
                        "User '{username}' not found. Try again or type 'new' to register as a new user."
                    ),
                )),
            )]);
        }

        data.insert("username".to_owned(), username.into());
        ctx.advance(2, data);
        Ok(vec![ctx
            .reply("Enter your password:")
            .with_hints(PacketHints::workflow(self.kind().as_str(), 2, HintKind::Password))])
    }

    async fn handle_password(
        &self,
        ctx: &WorkflowContext<'_>,
        input: &str,
    ) -> anyhow::Result<Vec<ToUser>> {
        let mut data = ctx.wf_state.data.clone();
        let username = data_str(&data, "username").unwrap_or_default().to_owned();

        let user = ctx.services.users.authenticate(&username, input).await?;
        let Some(user) = user else {
            let attempts = data_u64(&data, "attempts").unwrap_or(0) + 1;
            if attempts >= MAX_ATTEMPTS {
                return Ok(self.blocked(ctx));
            }
            data.insert("attempts".to_owned(), attempts.into());
            data.remove("username");
            ctx.advance(1, data);
            return Ok(vec![self.username_prompt(
                ctx,
                Some((ErrorCode::LoginFailed, "Login failed. Try again.".to_owned())),
            )]);
        };

        let sessions = &ctx.services.sessions;
        sessions.mark_username(ctx.session_id, Some(&user.username));
        sessions.mark_logged_in(ctx.session_id, true);
        sessions.clear_workflow(ctx.session_id);

        // Fresh logins land in the configured starting room.
        let starting = &ctx.services.config.bbs.starting_room;
        if let Ok(Some(room_id)) = ctx.services.rooms.get_id_by_name(starting).await {
            sessions.set_current_room(ctx.session_id, room_id);
        }

        // Refresh the node's password cache so the next contact within the
        // window auto-relogs.
        if let Some(state) = sessions.get_session_state(ctx.session_id) {
            if let Some(node_id) = state.node_id {
                let node_auth = NodeAuth::new(
                    ctx.services.db.clone(),
                    std::sync::Arc::clone(&ctx.services.config),
                );
                node_auth.touch(&user.username, &node_id).await?;
            }
        }

        tracing::info!(username = %user.username, session_id = %ctx.session_id, "login complete");
        Ok(vec![ctx.reply(format!("Welcome, {}! You are now logged in.", user.username))])
    }

    fn blocked(&self, ctx: &WorkflowContext<'_>) -> Vec<ToUser> {
        ctx.clear();
        vec![ctx.error(
            ErrorCode::LoginBlocked,
            "Too many failed login attempts. Please try again later.",
        )]
    }
}

#[cfg(test)]
#[path = "login_tests.rs"]
mod tests;
