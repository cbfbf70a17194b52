// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Text parsing: first token is the command code, remainder is args.

use crate::commands::{CommandName, CommandRegistry};

/// A recognized command plus its raw argument string.
#[derive(Debug, Clone)]
pub struct ParsedCommand {
    pub name: CommandName,
    pub code: &'static str,
    pub args: String,
}

/// Parse raw input against the registry. Empty input and unknown codes
/// both fail; the caller surfaces `unknown_command`.
pub fn parse_command(registry: &CommandRegistry, text: &str) -> Option<ParsedCommand> {
    let text = text.trim();
    if text.is_empty() {
        tracing::debug!("empty command input");
        return None;
    }
    let (code, args) = match text.split_once(char::is_whitespace) {
        Some((code, rest)) => (code, rest.trim()),
        None => (text, ""),
    };
    let Some(spec) = registry.get(code) else {
        tracing::debug!(code = %code, "unknown command");
        return None;
    };
    Some(ParsedCommand { name: spec.name, code: spec.code, args: args.to_owned() })
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
