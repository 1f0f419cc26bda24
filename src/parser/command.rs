use crate::error::SyntaxError;
use crate::parser::keys::KeyChord;
use crate::parser::modifier::ModifierSet;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// One value in a raw UI callback dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallbackValue {
    Number(i64),
    Bool(bool),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandKind {
    Action { name: String },
    Target { name: String },
    Click { element: String },
    SendKey { chord: KeyChord },
    HoldKey { chord: KeyChord },
    ReleaseKey { chord: KeyChord },
    WaitAddon { addon: String },
    Equip { item_id: u32 },
    Interact,
    Recipe { name: String },
    Require { condition: String },
    RunMacro { name: String },
    Callback { addon: String, update: bool, values: Vec<CallbackValue> },
    Wait { duration_ms: u64 },
    Loop { count: u32 },
    Gate { count: u32 },
    /// Unknown command name, forwarded verbatim to the host chat/command box.
    Native { line: String },
}

impl CommandKind {
    /// Commands that mutate live host state must run on the designated
    /// host-update thread; queries and engine-level control flow run inline.
    pub fn requires_frame_thread(&self) -> bool {
        matches!(
            self,
            CommandKind::Action { .. }
                | CommandKind::Target { .. }
                | CommandKind::Click { .. }
                | CommandKind::Equip { .. }
                | CommandKind::Interact
                | CommandKind::Recipe { .. }
                | CommandKind::Callback { .. }
                | CommandKind::Native { .. }
        )
    }
}

/// One parsed line of macro source: command name, raw parameter text, typed
/// kind, and the orthogonal modifier set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    pub parameters: String,
    pub kind: CommandKind,
    pub modifiers: ModifierSet,
}

impl Command {
    /// Dispatch on the command name to a dedicated builder. Unknown names
    /// fall through to the native passthrough representation.
    pub fn build(name: &str, parameters: &str, line: &str) -> Result<Self, SyntaxError> {
        let canonical = match name {
            "ac" => "action",
            "craft" => "gate",
            other => other,
        };
        let kind = match canonical {
            "action" => CommandKind::Action {
                name: require_text(canonical, parameters, line)?,
            },
            "target" => CommandKind::Target {
                name: require_text(canonical, parameters, line)?,
            },
            "click" => CommandKind::Click {
                element: require_text(canonical, parameters, line)?,
            },
            "send" => CommandKind::SendKey {
                chord: KeyChord::parse(&require_text(canonical, parameters, line)?)?,
            },
            "hold" => CommandKind::HoldKey {
                chord: KeyChord::parse(&require_text(canonical, parameters, line)?)?,
            },
            "release" => CommandKind::ReleaseKey {
                chord: KeyChord::parse(&require_text(canonical, parameters, line)?)?,
            },
            "waitaddon" => CommandKind::WaitAddon {
                addon: require_text(canonical, parameters, line)?,
            },
            "equip" => CommandKind::Equip {
                item_id: parse_number(canonical, parameters, line)?,
            },
            "interact" => CommandKind::Interact,
            "recipe" => CommandKind::Recipe {
                name: require_text(canonical, parameters, line)?,
            },
            "require" => CommandKind::Require {
                condition: require_text(canonical, parameters, line)?.to_ascii_lowercase(),
            },
            "runmacro" => CommandKind::RunMacro {
                name: require_text(canonical, parameters, line)?,
            },
            "callback" => build_callback(parameters, line)?,
            "wait" => {
                let seconds: f64 = parameters.trim().parse().map_err(|_| {
                    SyntaxError::InvalidParameter {
                        command: canonical.to_string(),
                        reason: format!("`{}` is not a number of seconds", parameters.trim()),
                        text: line.to_string(),
                    }
                })?;
                CommandKind::Wait {
                    duration_ms: (seconds * 1000.0).round() as u64,
                }
            }
            "loop" => CommandKind::Loop {
                count: parse_repeat_count(canonical, parameters, line)?,
            },
            "gate" => CommandKind::Gate {
                count: parse_repeat_count(canonical, parameters, line)?,
            },
            _ => CommandKind::Native {
                line: line.trim().to_string(),
            },
        };
        Ok(Self {
            name: canonical.to_string(),
            parameters: parameters.to_string(),
            kind,
            modifiers: ModifierSet::default(),
        })
    }

    /// Canonical text for this command, suitable for re-parsing.
    pub fn render(&self) -> String {
        let mut out = format!("/{}", self.name);
        if !self.parameters.trim().is_empty() {
            let _ = write!(out, " {}", self.parameters.trim());
        }
        let m = &self.modifiers;
        if let Some(wait) = &m.wait {
            if wait.min_ms == wait.max_ms {
                let _ = write!(out, " <wait.{}>", wait.min_ms as f64 / 1000.0);
            } else {
                let _ = write!(
                    out,
                    " <wait.{}-{}>",
                    wait.min_ms as f64 / 1000.0,
                    wait.max_ms as f64 / 1000.0
                );
            }
        }
        if let Some(max_wait) = &m.max_wait {
            let _ = write!(out, " <maxwait.{}>", max_wait.ms as f64 / 1000.0);
        }
        if let Some(condition) = &m.condition {
            let negation = if condition.negated { "not." } else { "" };
            let _ = write!(out, " <condition.{}{}>", negation, condition.conditions.join(","));
        }
        if let Some(index) = &m.index {
            let _ = write!(out, " <index.{}>", index.index);
        }
        if let Some(list) = &m.list_index {
            let _ = write!(out, " <list.{}>", list.index);
        }
        if let Some(party) = &m.party_slot {
            let _ = write!(out, " <party.{}>", party.slot);
        }
        if let Some(distance) = &m.distance {
            let _ = write!(out, " <distance.{}>", distance.distance);
        }
        if m.echo {
            out.push_str(" <echo>");
        }
        if m.unsafe_mode {
            out.push_str(" <unsafe>");
        }
        if m.high_quality {
            out.push_str(" <hq>");
        }
        out
    }
}

/// A bare loop/gate means "repeat indefinitely", represented as the maximum
/// representable count.
fn parse_repeat_count(command: &str, parameters: &str, line: &str) -> Result<u32, SyntaxError> {
    let trimmed = parameters.trim();
    if trimmed.is_empty() {
        return Ok(u32::MAX);
    }
    trimmed.parse().map_err(|_| SyntaxError::InvalidParameter {
        command: command.to_string(),
        reason: format!("`{}` is not a repeat count", trimmed),
        text: line.to_string(),
    })
}

fn parse_number(command: &str, parameters: &str, line: &str) -> Result<u32, SyntaxError> {
    parameters
        .trim()
        .parse()
        .map_err(|_| SyntaxError::InvalidParameter {
            command: command.to_string(),
            reason: format!("`{}` is not a number", parameters.trim()),
            text: line.to_string(),
        })
}

/// Strip one level of surrounding quotes; a quote left open is a parse error.
fn require_text(command: &str, parameters: &str, line: &str) -> Result<String, SyntaxError> {
    let trimmed = parameters.trim();
    if trimmed.is_empty() {
        return Err(SyntaxError::InvalidParameter {
            command: command.to_string(),
            reason: "missing parameter".to_string(),
            text: line.to_string(),
        });
    }
    if let Some(rest) = trimmed.strip_prefix('"') {
        return match rest.strip_suffix('"') {
            Some(inner) if !rest.is_empty() => Ok(inner.to_string()),
            _ => Err(SyntaxError::UnterminatedQuote(line.to_string())),
        };
    }
    Ok(trimmed.to_string())
}

fn build_callback(parameters: &str, line: &str) -> Result<CommandKind, SyntaxError> {
    let parts = split_quoted(parameters, line)?;
    if parts.len() < 2 {
        return Err(SyntaxError::InvalidParameter {
            command: "callback".to_string(),
            reason: "expected an addon name and an update flag".to_string(),
            text: line.to_string(),
        });
    }
    let update = match parts[1].as_str() {
        "true" => true,
        "false" => false,
        other => {
            return Err(SyntaxError::InvalidParameter {
                command: "callback".to_string(),
                reason: format!("`{}` is not a boolean update flag", other),
                text: line.to_string(),
            })
        }
    };
    let values = parts[2..]
        .iter()
        .map(|part| {
            if let Ok(number) = part.parse::<i64>() {
                CallbackValue::Number(number)
            } else if part == "true" || part == "false" {
                CallbackValue::Bool(part == "true")
            } else {
                CallbackValue::Text(part.clone())
            }
        })
        .collect();
    Ok(CommandKind::Callback {
        addon: parts[0].clone(),
        update,
        values,
    })
}

/// Split a structured parameter list on whitespace, keeping quoted segments
/// (which may contain internal whitespace) as one part.
fn split_quoted(text: &str, line: &str) -> Result<Vec<String>, SyntaxError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in text.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if in_quotes {
        return Err(SyntaxError::UnterminatedQuote(line.to_string()));
    }
    if !current.is_empty() {
        parts.push(current);
    }
    Ok(parts)
}
