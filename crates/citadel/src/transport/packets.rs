// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Packets crossing the boundary between the BBS core and transports.

use serde::{Deserialize, Serialize};

use crate::commands::parser::ParsedCommand;
use crate::error::ErrorCode;
use crate::messages::MessageView;

/// Input-style hint for clients that can render richer prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintKind {
    Text,
    Password,
    Menu,
    Choice,
}

/// Optional rendering hints attached to a [`ToUser`] packet.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PacketHints {
    pub kind: Option<HintKind>,
    /// Workflow kind this prompt belongs to.
    pub workflow: Option<&'static str>,
    /// Step the answer will be routed to.
    pub step: Option<u32>,
    /// Choice options for single-keystroke prompts.
    pub options: Vec<String>,
}

impl PacketHints {
    pub fn workflow(kind: &'static str, step: u32, hint: HintKind) -> Self {
        Self { kind: Some(hint), workflow: Some(kind), step: Some(step), options: Vec::new() }
    }
}

/// Packet sent from the BBS to a transport for user display.
#[derive(Debug, Clone)]
pub struct ToUser {
    pub session_id: String,
    pub text: String,
    pub hints: PacketHints,
    /// When set, the transport formats this structured message instead of
    /// sending `text`.
    pub message: Option<MessageView>,
    pub is_error: bool,
    pub error_code: Option<ErrorCode>,
}

impl ToUser {
    pub fn new(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            text: text.into(),
            hints: PacketHints::default(),
            message: None,
            is_error: false,
            error_code: None,
        }
    }

    pub fn error(
        session_id: impl Into<String>,
        code: ErrorCode,
        text: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            text: text.into(),
            hints: PacketHints::default(),
            message: None,
            is_error: true,
            error_code: Some(code),
        }
    }

    pub fn with_hints(mut self, hints: PacketHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_message(mut self, message: MessageView) -> Self {
        self.message = Some(message);
        self
    }
}

/// Parsed user input handed from a transport to the command processor.
#[derive(Debug, Clone)]
pub struct FromUser {
    pub session_id: String,
    pub payload: FromUserPayload,
}

#[derive(Debug, Clone)]
pub enum FromUserPayload {
    Command(ParsedCommand),
    WorkflowResponse(String),
}
