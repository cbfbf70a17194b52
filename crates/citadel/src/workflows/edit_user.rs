// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Menu-driven user editing. Ordinary users edit themselves; aides and
//! sysops pick a target first and may change permission level and status.

use async_trait::async_trait;

use crate::auth::passwords::{generate_salt, hash_password};
use crate::auth::permissions::PermissionLevel;
use crate::error::ErrorCode;
use crate::transport::packets::{HintKind, PacketHints, ToUser};
use crate::users::{User, UserStatus};
use crate::workflows::{data_str, Workflow, WorkflowContext, WorkflowKind};

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuOption {
    DisplayName,
    ResetPassword,
    PermissionLevel,
    Status,
    Quit,
}

impl MenuOption {
    fn label(&self) -> &'static str {
        match self {
            Self::DisplayName => "Display Name",
            Self::ResetPassword => "Reset Password",
            Self::PermissionLevel => "Permission Level",
            Self::Status => "Status",
            Self::Quit => "Quit",
        }
    }
}

fn menu_options(editor: &User) -> Vec<MenuOption> {
    let mut options = vec![MenuOption::DisplayName, MenuOption::ResetPassword];
    if editor.permission_level >= PermissionLevel::Aide {
        options.push(MenuOption::PermissionLevel);
        options.push(MenuOption::Status);
    }
    options.push(MenuOption::Quit);
    options
}

pub struct EditUserWorkflow;

#[async_trait]
impl Workflow for EditUserWorkflow {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::EditUser
    }

    async fn start(&self, ctx: &WorkflowContext<'_>) -> anyhow::Result<Vec<ToUser>> {
        let Some(editor) = self.editor(ctx).await? else {
            ctx.clear();
            return Ok(vec![ctx.error(ErrorCode::InvalidSession, "Session expired or invalid.")]);
        };

        if editor.permission_level >= PermissionLevel::Aide {
            ctx.advance(1, ctx.wf_state.data.clone());
            return Ok(vec![ctx
                .reply("Username to edit?\nType 'cancel' to quit")
                .with_hints(PacketHints::workflow(self.kind().as_str(), 1, HintKind::Text))]);
        }

        let mut data = ctx.wf_state.data.clone();
        data.insert("target_user".to_owned(), editor.username.clone().into());
        ctx.advance(2, data);
        Ok(vec![self.menu(ctx, &editor).await?])
    }

    async fn handle(&self, ctx: &WorkflowContext<'_>, input: &str) -> anyhow::Result<Vec<ToUser>> {
        let Some(editor) = self.editor(ctx).await? else {
            ctx.clear();
            return Ok(vec![ctx.error(ErrorCode::InvalidSession, "Session expired or invalid.")]);
        };

        match ctx.wf_state.step {
            1 => self.pick_target(ctx, &editor, input).await,
            2 => self.menu_choice(ctx, &editor, input).await,
            3 => self.set_display_name(ctx, &editor, input).await,
            4 => self.set_permission(ctx, &editor, input).await,
            5 => self.set_status(ctx, &editor, input).await,
            6 => self.reset_password(ctx, &editor, input).await,
            _ => Ok(ctx.invalid_step()),
        }
    }
}

impl EditUserWorkflow {
    async fn editor(&self, ctx: &WorkflowContext<'_>) -> anyhow::Result<Option<User>> {
        let Some(state) = ctx.services.sessions.get_session_state(ctx.session_id) else {
            return Ok(None);
        };
        let Some(username) = state.username else {
            return Ok(None);
        };
        ctx.services.users.load(&username).await
    }

    async fn target(&self, ctx: &WorkflowContext<'_>) -> anyhow::Result<Option<User>> {
        let Some(target) = data_str(&ctx.wf_state.data, "target_user") else {
            return Ok(None);
        };
        ctx.services.users.load(target).await
    }

    async fn pick_target(
        &self,
        ctx: &WorkflowContext<'_>,
        editor: &User,
        input: &str,
    ) -> anyhow::Result<Vec<ToUser>> {
        let username = input.trim();
        let target = if editor.permission_level >= PermissionLevel::Aide {
            match ctx.services.users.load(username).await? {
                Some(user) => user,
                None => {
                    return Ok(vec![ctx.error(
                        ErrorCode::InvalidUsername,
                        "User not found. Please enter a valid username or type 'cancel' to quit.",
                    )])
                }
            }
        } else {
            editor.clone()
        };

        let mut data = ctx.wf_state.data.clone();
        data.insert("target_user".to_owned(), target.username.into());
        ctx.advance(2, data);
        Ok(vec![self.menu(ctx, editor).await?])
    }

    async fn menu_choice(
        &self,
        ctx: &WorkflowContext<'_>,
        editor: &User,
        input: &str,
    ) -> anyhow::Result<Vec<ToUser>> {
        let options = menu_options(editor);
        let choice = input.trim().parse::<usize>().ok();
        let selected = match choice.and_then(|n| n.checked_sub(1)).and_then(|i| options.get(i)) {
            Some(option) => *option,
            None => return Ok(vec![self.menu(ctx, editor).await?]),
        };

        let data = ctx.wf_state.data.clone();
        match selected {
            MenuOption::Quit => {
                ctx.clear();
                Ok(vec![ctx.reply("Exiting user edit")])
            }
            MenuOption::DisplayName => {
                let Some(target) = self.target(ctx).await? else {
                    ctx.clear();
                    return Ok(vec![ctx.error(ErrorCode::InvalidUsername, "Target user vanished.")]);
                };
                ctx.advance(3, data);
                Ok(vec![ctx
                    .reply(format!(
                        "Current display name: {}\nEnter new display name:",
                        target.display_name
                    ))
                    .with_hints(PacketHints::workflow(self.kind().as_str(), 3, HintKind::Text))])
            }
            MenuOption::PermissionLevel => {
                ctx.advance(4, data);
                let menu = PermissionLevel::ALL
                    .iter()
                    .enumerate()
                    .map(|(i, level)| format!("{}. {}", i + 1, level.as_str()))
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(vec![ctx
                    .reply(format!("Select new permission level:\n{menu}"))
                    .with_hints(PacketHints::workflow(self.kind().as_str(), 4, HintKind::Menu))])
            }
            MenuOption::Status => {
                ctx.advance(5, data);
                let menu = UserStatus::ALL
                    .iter()
                    .enumerate()
                    .map(|(i, status)| format!("{}. {}", i + 1, status.as_str()))
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(vec![ctx
                    .reply(format!("Select new status:\n{menu}"))
                    .with_hints(PacketHints::workflow(self.kind().as_str(), 5, HintKind::Menu))])
            }
            MenuOption::ResetPassword => {
                let target = data_str(&ctx.wf_state.data, "target_user").unwrap_or_default();
                tracing::info!(editor = %editor.username, target = %target,
                    "password reset initiated");
                ctx.advance(6, data);
                Ok(vec![ctx
                    .reply("Resetting password\nEnter new password:")
                    .with_hints(PacketHints::workflow(
                        self.kind().as_str(),
                        6,
                        HintKind::Password,
                    ))])
            }
        }
    }

    async fn set_display_name(
        &self,
        ctx: &WorkflowContext<'_>,
        editor: &User,
        input: &str,
    ) -> anyhow::Result<Vec<ToUser>> {
        let new_name = input.trim();
        if new_name.is_empty() {
            return Ok(vec![
                ctx.error(ErrorCode::InvalidDisplayName, "Display name cannot be empty.")
            ]);
        }
        let Some(target) = self.target(ctx).await? else {
            ctx.clear();
            return Ok(vec![ctx.error(ErrorCode::InvalidUsername, "Target user vanished.")]);
        };
        ctx.services.users.set_display_name(&target.username, new_name).await?;
        tracing::info!(editor = %editor.username, target = %target.username,
            old = %target.display_name, new = %new_name, "display name changed");
        self.back_to_menu(ctx, editor).await
    }

    async fn set_permission(
        &self,
        ctx: &WorkflowContext<'_>,
        editor: &User,
        input: &str,
    ) -> anyhow::Result<Vec<ToUser>> {
        let picked = input
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| PermissionLevel::ALL.get(i).copied());
        let Some(new_level) = picked else {
            return Ok(vec![ctx.error(
                ErrorCode::InvalidCommand,
                "Invalid selection. Please choose a valid permission level.",
            )]);
        };
        let Some(target) = self.target(ctx).await? else {
            ctx.clear();
            return Ok(vec![ctx.error(ErrorCode::InvalidUsername, "Target user vanished.")]);
        };
        ctx.services.users.set_permission_level(&target.username, new_level).await?;
        tracing::info!(editor = %editor.username, target = %target.username,
            old = %target.permission_level, new = %new_level, "permission changed");
        self.back_to_menu(ctx, editor).await
    }

    async fn set_status(
        &self,
        ctx: &WorkflowContext<'_>,
        editor: &User,
        input: &str,
    ) -> anyhow::Result<Vec<ToUser>> {
        let picked = input
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| UserStatus::ALL.get(i).copied());
        let Some(new_status) = picked else {
            return Ok(vec![ctx.error(
                ErrorCode::InvalidCommand,
                "Invalid selection. Please choose a valid status.",
            )]);
        };
        let Some(target) = self.target(ctx).await? else {
            ctx.clear();
            return Ok(vec![ctx.error(ErrorCode::InvalidUsername, "Target user vanished.")]);
        };
        ctx.services.users.set_status(&target.username, new_status).await?;
        tracing::info!(editor = %editor.username, target = %target.username,
            old = %target.status, new = %new_status, "status changed");
        self.back_to_menu(ctx, editor).await
    }

    async fn reset_password(
        &self,
        ctx: &WorkflowContext<'_>,
        editor: &User,
        input: &str,
    ) -> anyhow::Result<Vec<ToUser>> {
        if input.len() < MIN_PASSWORD_LEN {
            return Ok(vec![ctx.error(
                ErrorCode::InvalidPassword,
                "Password must be at least 6 characters.",
            )]);
        }
        let Some(target) = self.target(ctx).await? else {
            ctx.clear();
            return Ok(vec![ctx.error(ErrorCode::InvalidUsername, "Target user vanished.")]);
        };
        let salt = generate_salt();
        let hash = hash_password(input, &salt);
        ctx.services.users.update_password(&target.username, &hash, &salt).await?;
        tracing::info!(editor = %editor.username, target = %target.username, "password reset");
        self.back_to_menu(ctx, editor).await
    }

    async fn back_to_menu(
        &self,
        ctx: &WorkflowContext<'_>,
        editor: &User,
    ) -> anyhow::Result<Vec<ToUser>> {
        ctx.advance(2, ctx.wf_state.data.clone());
        Ok(vec![self.menu(ctx, editor).await?])
    }

    async fn menu(&self, ctx: &WorkflowContext<'_>, editor: &User) -> anyhow::Result<ToUser> {
        let Some(target) = self.target(ctx).await? else {
            ctx.clear();
            return Ok(ctx.error(ErrorCode::InvalidUsername, "Target user vanished."));
        };
        let lines: Vec<String> = menu_options(editor)
            .iter()
            .enumerate()
            .map(|(i, option)| {
                let detail = match option {
                    MenuOption::DisplayName => format!(": {}", target.display_name),
                    MenuOption::PermissionLevel => format!(": {}", target.permission_level),
                    MenuOption::Status => format!(": {}", target.status),
                    _ => String::new(),
                };
                format!("{}. {}{}", i + 1, option.label(), detail)
            })
            .collect();
        Ok(ctx
            .reply(format!("Username: {}\n{}", target.username, lines.join("\n")))
            .with_hints(PacketHints::workflow(self.kind().as_str(), 2, HintKind::Menu)))
    }
}

#[cfg(test)]
#[path = "edit_user_tests.rs"]
mod tests;
