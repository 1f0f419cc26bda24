pub mod command;
pub mod keys;
pub mod modifier;

pub use command::{CallbackValue, Command, CommandKind};
pub use keys::{KeyChord, VirtualKey};
pub use modifier::{
    ConditionModifier, DistanceModifier, IndexModifier, ListIndexModifier, MaxWaitModifier,
    ModifierSet, PartyIndexModifier, WaitModifier,
};

use crate::error::SyntaxError;
use regex::Regex;
use std::sync::LazyLock;

// Base command grammar, matched against the modifier-free line: a leading
// command name token followed by free-form parameters.
static RE_COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/(?P<name>[A-Za-z][\w-]*)(?:\s+(?P<params>.*))?$").unwrap());

/// Two-pass native dialect parser. Pass one strips modifier tokens, pass two
/// matches the base command grammar, so modifier syntax stays independent of
/// command identity.
#[derive(Debug, Default, Clone)]
pub struct MacroParser;

impl MacroParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a whole macro body, one command per non-empty line. The first
    /// bad line aborts the parse.
    pub fn parse(&self, source: &str) -> Result<Vec<Command>, SyntaxError> {
        source
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| self.parse_line(line))
            .collect()
    }

    pub fn parse_line(&self, line: &str) -> Result<Command, SyntaxError> {
        let (cleaned, tokens) = ModifierSet::scan(line)?;
        let cleaned = cleaned.trim();

        let caps = RE_COMMAND
            .captures(cleaned)
            .ok_or_else(|| SyntaxError::MalformedLine(line.to_string()))?;
        let name = caps["name"].to_ascii_lowercase();
        let parameters = caps.name("params").map(|m| m.as_str()).unwrap_or("");

        let mut command = Command::build(&name, parameters, cleaned)?;
        for token in &tokens {
            command.modifiers.attach(token)?;
        }
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_with_wait_range_and_condition() {
        let parser = MacroParser::new();
        let cmd = parser
            .parse_line("/ac \"Muscle Memory\" <wait.3-5><condition.crafting>")
            .unwrap();
        assert_eq!(cmd.name, "action");
        assert_eq!(
            cmd.kind,
            CommandKind::Action { name: "Muscle Memory".to_string() }
        );
        assert_eq!(cmd.modifiers.wait, Some(WaitModifier { min_ms: 3000, max_ms: 5000 }));
        let condition = cmd.modifiers.condition.as_ref().unwrap();
        assert_eq!(condition.conditions, vec!["crafting"]);
        assert!(!condition.negated);
    }

    #[test]
    fn test_parse_multiple_lines_skips_blanks() {
        let parser = MacroParser::new();
        let commands = parser
            .parse("/recipe \"Tisane\"\n\n  /ac Reflect <wait.2>\n/loop 3\n")
            .unwrap();
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[2].kind, CommandKind::Loop { count: 3 });
    }

    #[test]
    fn test_non_command_line_is_malformed() {
        let parser = MacroParser::new();
        assert!(matches!(
            parser.parse_line("do the thing"),
            Err(SyntaxError::MalformedLine(_))
        ));
    }

    #[test]
    fn test_bad_line_aborts_whole_parse() {
        let parser = MacroParser::new();
        assert!(parser.parse("/ac Reflect\n/wait abc\n/loop").is_err());
    }

    #[test]
    fn test_render_round_trips() {
        let parser = MacroParser::new();
        let lines = [
            "/ac \"Muscle Memory\" <wait.3-5> <condition.crafting> <echo>",
            "/target Stone <index.2> <distance.4.5> <hq>",
            "/send ctrl+shift+p <wait.0.5>",
            "/callback SelectYesno true 0 <unsafe>",
            "/loop 3",
            "/wait 1.5",
        ];
        for line in lines {
            let first = parser.parse_line(line).unwrap();
            let second = parser.parse_line(&first.render()).unwrap();
            assert_eq!(first, second, "round trip failed for `{}`", line);
        }
    }

    #[test]
    fn test_modifier_order_does_not_matter() {
        let parser = MacroParser::new();
        let a = parser.parse_line("/ac X <wait.1> <condition.crafting>").unwrap();
        let b = parser.parse_line("<condition.crafting>/ac X <wait.1>").unwrap();
        assert_eq!(a.modifiers, b.modifiers);
        assert_eq!(a.kind, b.kind);
    }
}
