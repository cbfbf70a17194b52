// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! New-user registration: username, display name, password, terms, intro,
//! confirmation. Creates a provisional account up front and activates it on
//! submission.

use async_trait::async_trait;
use chrono::Utc;
use tokio_rusqlite::rusqlite::params;

use crate::auth::passwords::{generate_salt, hash_password};
use crate::auth::permissions::PermissionLevel;
use crate::error::ErrorCode;
use crate::transport::packets::{HintKind, PacketHints, ToUser};
use crate::users::UserStatus;
use crate::workflows::{data_str, Workflow, WorkflowContext, WorkflowKind};

const MIN_USERNAME_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 6;

fn is_ascii_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub struct RegisterUserWorkflow;

#[async_trait]
impl Workflow for RegisterUserWorkflow {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::RegisterUser
    }

    async fn start(&self, ctx: &WorkflowContext<'_>) -> anyhow::Result<Vec<ToUser>> {
        Ok(vec![ctx
            .reply("Choose a username to begin registration.")
            .with_hints(PacketHints::workflow(self.kind().as_str(), 1, HintKind::Text))])
    }

    async fn handle(&self, ctx: &WorkflowContext<'_>, input: &str) -> anyhow::Result<Vec<ToUser>> {
        match ctx.wf_state.step {
            1 => self.handle_username(ctx, input).await,
            2 => self.handle_display_name(ctx, input).await,
            3 => self.handle_password(ctx, input).await,
            4 => self.handle_terms(ctx, input).await,
            5 => self.handle_intro(ctx, input).await,
            6 => self.handle_confirmation(ctx, input).await,
            _ => Ok(ctx.invalid_step()),
        }
    }

    /// Cancellation discards the provisional account and its session.
    async fn cleanup(&self, ctx: &WorkflowContext<'_>) -> anyhow::Result<()> {
        let data = &ctx.wf_state.data;
        if let Some(username) = data_str(data, "username") {
            if let Some(user) = ctx.services.users.load(username).await? {
                if user.status == UserStatus::Provisional {
                    ctx.services.users.delete(username).await?;
                    tracing::info!(username = %username,
                        "deleted provisional user after registration cancellation");
                }
            }
        }
        if let Some(session_id) = data_str(data, "provisional_session_id") {
            ctx.services.sessions.expire_session(session_id);
        }
        Ok(())
    }
}

impl RegisterUserWorkflow {
    async fn handle_username(
        &self,
        ctx: &WorkflowContext<'_>,
        input: &str,
    ) -> anyhow::Result<Vec<ToUser>> {
        let username = input.trim();
        if !is_ascii_name(username) {
            return Ok(vec![ctx.error(
                ErrorCode::InvalidUsername,
                "Usernames are limited to ASCII letters, digits, '_' and '-'.",
            )]);
        }
        if username.len() < MIN_USERNAME_LEN {
            return Ok(vec![ctx.error(
                ErrorCode::InvalidUsername,
                "Username must be at least 3 characters.",
            )]);
        }
        if username.len() > ctx.services.config.auth.max_username_length {
            return Ok(vec![ctx.error(
                ErrorCode::InvalidUsername,
                format!(
                    "Username must be at most {} characters.",
                    ctx.services.config.auth.max_username_length
                ),
            )]);
        }
        if ctx.services.users.username_exists(username).await? {
            return Ok(vec![ctx.error(
                ErrorCode::UsernameTaken,
                format!("'{username}' is already in use. Please try again."),
            )]);
        }

        // Provisional account with throwaway credentials; the real password
        // arrives at step 3.
        let salt = generate_salt();
        let temp_hash = hash_password("temporary", &salt);
        ctx.services
            .users
            .create(
                username,
                &temp_hash,
                &salt,
                username,
                PermissionLevel::Unverified,
                UserStatus::Provisional,
            )
            .await?;

        // A fresh session id for transports that track one per account.
        let new_session_id = ctx.services.sessions.create_session(None);
        ctx.services.sessions.mark_username(&new_session_id, Some(username));

        let mut data = ctx.wf_state.data.clone();
        data.insert("username".to_owned(), username.into());
        data.insert("provisional_session_id".to_owned(), new_session_id.clone().into());
        ctx.advance(2, data);

        // The reply carries the new session id so session-tracking
        // transports can adopt it.
        Ok(vec![ToUser::new(new_session_id, "Choose a display name.")
            .with_hints(PacketHints::workflow(self.kind().as_str(), 2, HintKind::Text))])
    }

    async fn handle_display_name(
        &self,
        ctx: &WorkflowContext<'_>,
        input: &str,
    ) -> anyhow::Result<Vec<ToUser>> {
        let display_name = input.trim();
        if display_name.is_empty() {
            return Ok(vec![
                ctx.error(ErrorCode::InvalidDisplayName, "Display name cannot be empty.")
            ]);
        }
        let mut data = ctx.wf_state.data.clone();
        let username = data_str(&data, "username").unwrap_or_default().to_owned();
        ctx.services.users.set_display_name(&username, display_name).await?;
        data.insert("display_name".to_owned(), display_name.into());
        ctx.advance(3, data);
        Ok(vec![ctx
            .reply("Choose a password.")
            .with_hints(PacketHints::workflow(self.kind().as_str(), 3, HintKind::Password))])
    }

    async fn handle_password(
        &self,
        ctx: &WorkflowContext<'_>,
        input: &str,
    ) -> anyhow::Result<Vec<ToUser>> {
        if input.len() < MIN_PASSWORD_LEN {
            return Ok(vec![ctx.error(
                ErrorCode::InvalidPassword,
                "Password must be at least 6 characters.",
            )]);
        }
        if input.len() > ctx.services.config.auth.max_password_length {
            return Ok(vec![ctx.error(
                ErrorCode::InvalidPassword,
                format!(
                    "Password must be at most {} characters.",
                    ctx.services.config.auth.max_password_length
                ),
            )]);
        }
        let data = ctx.wf_state.data.clone();
        let username = data_str(&data, "username").unwrap_or_default().to_owned();
        let salt = generate_salt();
        let hash = hash_password(input, &salt);
        ctx.services.users.update_password(&username, &hash, &salt).await?;

        let registration = &ctx.services.config.bbs.registration;
        if registration.terms_required {
            let terms = registration.terms.clone();
            ctx.advance(4, data);
            return Ok(vec![ctx
                .reply(format!("{terms}\nDo you agree to the terms? (yes/no)"))
                .with_hints(PacketHints::workflow(self.kind().as_str(), 4, HintKind::Choice))]);
        }
        ctx.advance(5, data);
        Ok(vec![self.intro_prompt(ctx)])
    }

    async fn handle_terms(
        &self,
        ctx: &WorkflowContext<'_>,
        input: &str,
    ) -> anyhow::Result<Vec<ToUser>> {
        let agree = input.trim().to_ascii_lowercase();
        if agree != "yes" && agree != "y" {
            return Ok(vec![ctx.error(
                ErrorCode::TermsNotAccepted,
                "You must agree to the terms to continue.",
            )]);
        }
        let mut data = ctx.wf_state.data.clone();
        data.insert("agreed".to_owned(), true.into());
        ctx.advance(5, data);
        Ok(vec![self.intro_prompt(ctx)])
    }

    async fn handle_intro(
        &self,
        ctx: &WorkflowContext<'_>,
        input: &str,
    ) -> anyhow::Result<Vec<ToUser>> {
        let mut data = ctx.wf_state.data.clone();
        data.insert("intro".to_owned(), input.trim().into());
        ctx.advance(6, data);
        Ok(vec![ctx
            .reply("Submit registration? (yes/no)")
            .with_hints(PacketHints::workflow(self.kind().as_str(), 6, HintKind::Choice))])
    }

    async fn handle_confirmation(
        &self,
        ctx: &WorkflowContext<'_>,
        input: &str,
    ) -> anyhow::Result<Vec<ToUser>> {
        let confirm = input.trim().to_ascii_lowercase();
        let data = ctx.wf_state.data.clone();
        let username = data_str(&data, "username").unwrap_or_default().to_owned();

        if confirm != "yes" && confirm != "y" {
            self.cleanup(ctx).await?;
            ctx.clear();
            return Ok(vec![
                ctx.error(ErrorCode::RegistrationCancelled, "Registration not submitted.")
            ]);
        }

        ctx.services.users.set_status(&username, UserStatus::Active).await?;

        let intro = data_str(&data, "intro").unwrap_or_default().to_owned();
        let submitted_at = Utc::now().to_rfc3339();
        let insert_username = username.clone();
        ctx.services
            .db
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO pending_validations
                         (username, submitted_at, intro_text, transport_engine,
                          transport_metadata)
                     VALUES (?1, ?2, ?3, 'meshcore', '{}')",
                    params![insert_username, submitted_at, intro],
                )?;
                Ok(())
            })
            .await?;

        ctx.clear();
        tracing::info!(username = %username, "registration submitted for validation");
        Ok(vec![ctx.reply("Your registration has been submitted for validation.")])
    }

    fn intro_prompt(&self, ctx: &WorkflowContext<'_>) -> ToUser {
        ctx.reply("Tell us a bit about yourself.")
            .with_hints(PacketHints::workflow(self.kind().as_str(), 5, HintKind::Text))
    }
}

#[cfg(test)]
#[path = "register_user_tests.rs"]
mod tests;
