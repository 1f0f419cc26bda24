use crate::error::SyntaxError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

// One combined pattern recognizes every modifier form so the scan stays
// independent of the command grammar. Bare `<word>` tokens outside the flag
// set are left alone; the host dialect uses placeholders like `<t>` in
// passthrough lines.
static RE_MODIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<\s*(wait|maxwait|condition|index|list|party|distance|echo|unsafe|hq)(?:\.([^>]*))?\s*>")
        .unwrap()
});
static RE_LEFTOVER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\s*[\w-]+\.[^>]*>").unwrap());

/// One scanned modifier span: token name, raw parameter text, original text.
#[derive(Debug, Clone)]
pub struct ModifierToken {
    pub name: String,
    pub param: Option<String>,
    pub text: String,
}

/// Sleep after the command, in milliseconds. A range picks a random duration
/// between floor and ceiling on each execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitModifier {
    pub min_ms: u64,
    pub max_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxWaitModifier {
    pub ms: u64,
}

/// Guard the command behind host condition flags, polled until satisfied or
/// the max-wait ceiling elapses. A comma list is satisfied by any member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionModifier {
    pub conditions: Vec<String>,
    pub negated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexModifier {
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListIndexModifier {
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyIndexModifier {
    pub slot: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceModifier {
    pub distance: f32,
}

/// The orthogonal modifier axes of one command. At most one modifier per
/// kind; attaching a second of the same kind silently overwrites the first,
/// so the rightmost token in the source line wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModifierSet {
    pub wait: Option<WaitModifier>,
    pub max_wait: Option<MaxWaitModifier>,
    pub condition: Option<ConditionModifier>,
    pub index: Option<IndexModifier>,
    pub list_index: Option<ListIndexModifier>,
    pub party_slot: Option<PartyIndexModifier>,
    pub distance: Option<DistanceModifier>,
    pub echo: bool,
    pub unsafe_mode: bool,
    pub high_quality: bool,
}

impl ModifierSet {
    /// Strip every modifier token from `line`. Matches are collected and
    /// excised right-to-left so earlier spans' offsets stay valid; the
    /// returned tuples are in source order.
    pub fn scan(line: &str) -> Result<(String, Vec<ModifierToken>), SyntaxError> {
        let mut cleaned = line.to_string();
        let mut tokens: Vec<ModifierToken> = Vec::new();

        let matches: Vec<_> = RE_MODIFIER
            .captures_iter(line)
            .map(|caps| {
                let whole = caps.get(0).unwrap();
                let token = ModifierToken {
                    name: caps[1].to_ascii_lowercase(),
                    param: caps.get(2).map(|m| m.as_str().to_string()),
                    text: whole.as_str().to_string(),
                };
                (whole.range(), token)
            })
            .collect();
        for (range, token) in matches.into_iter().rev() {
            cleaned.replace_range(range, "");
            tokens.push(token);
        }
        tokens.reverse();

        // Dotted angle tokens that survived the combined pattern are modifier
        // attempts with an unknown name.
        if let Some(leftover) = RE_LEFTOVER.find(&cleaned) {
            return Err(SyntaxError::InvalidModifier {
                text: leftover.as_str().to_string(),
                reason: "unknown modifier".to_string(),
            });
        }

        Ok((cleaned, tokens))
    }

    /// Build the typed modifier for one scanned token and attach it.
    pub fn attach(&mut self, token: &ModifierToken) -> Result<(), SyntaxError> {
        let invalid = |reason: &str| SyntaxError::InvalidModifier {
            text: token.text.clone(),
            reason: reason.to_string(),
        };
        let param = token.param.as_deref().map(str::trim).unwrap_or("");

        match token.name.as_str() {
            "wait" => {
                let (min_ms, max_ms) = match param.split_once('-') {
                    Some((floor, ceiling)) => {
                        (parse_seconds(floor, &token.text)?, parse_seconds(ceiling, &token.text)?)
                    }
                    None => {
                        let ms = parse_seconds(param, &token.text)?;
                        (ms, ms)
                    }
                };
                if min_ms > max_ms {
                    return Err(invalid("wait floor exceeds ceiling"));
                }
                self.wait = Some(WaitModifier { min_ms, max_ms });
            }
            "maxwait" => {
                self.max_wait = Some(MaxWaitModifier {
                    ms: parse_seconds(param, &token.text)?,
                });
            }
            "condition" => {
                let (list, negated) = if let Some(rest) = param.strip_prefix("not.") {
                    (rest, true)
                } else if let Some(rest) = param.strip_prefix('!') {
                    (rest, true)
                } else {
                    (param, false)
                };
                let conditions: Vec<String> = list
                    .split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(|c| c.to_ascii_lowercase())
                    .collect();
                if conditions.is_empty() {
                    return Err(invalid("empty condition list"));
                }
                self.condition = Some(ConditionModifier { conditions, negated });
            }
            "index" => {
                self.index = Some(IndexModifier {
                    index: param.parse().map_err(|_| invalid("index must be a number"))?,
                });
            }
            "list" => {
                self.list_index = Some(ListIndexModifier {
                    index: param.parse().map_err(|_| invalid("list index must be a number"))?,
                });
            }
            "party" => {
                let slot: u8 = param
                    .parse()
                    .map_err(|_| invalid("party slot must be a number"))?;
                if !(1..=8).contains(&slot) {
                    return Err(invalid("party slot must be between 1 and 8"));
                }
                self.party_slot = Some(PartyIndexModifier { slot });
            }
            "distance" => {
                self.distance = Some(DistanceModifier {
                    distance: param
                        .parse()
                        .map_err(|_| invalid("distance must be a number"))?,
                });
            }
            "echo" => self.echo = true,
            "unsafe" => self.unsafe_mode = true,
            "hq" => self.high_quality = true,
            _ => return Err(invalid("unknown modifier")),
        }
        Ok(())
    }
}

fn parse_seconds(text: &str, token: &str) -> Result<u64, SyntaxError> {
    let seconds: f64 = text.trim().parse().map_err(|_| SyntaxError::InvalidModifier {
        text: token.to_string(),
        reason: format!("`{}` is not a number of seconds", text.trim()),
    })?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(SyntaxError::InvalidModifier {
            text: token.to_string(),
            reason: "duration must be a non-negative number".to_string(),
        });
    }
    Ok((seconds * 1000.0).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_all(line: &str) -> (String, ModifierSet) {
        let (cleaned, tokens) = ModifierSet::scan(line).unwrap();
        let mut set = ModifierSet::default();
        for token in &tokens {
            set.attach(token).unwrap();
        }
        (cleaned, set)
    }

    #[test]
    fn test_wait_range_in_milliseconds() {
        let (_, set) = scan_all("/ac Veneration <wait.3-5>");
        assert_eq!(set.wait, Some(WaitModifier { min_ms: 3000, max_ms: 5000 }));
    }

    #[test]
    fn test_fractional_wait() {
        let (_, set) = scan_all("/ac Veneration <wait.0.5>");
        assert_eq!(set.wait, Some(WaitModifier { min_ms: 500, max_ms: 500 }));
    }

    #[test]
    fn test_wait_floor_above_ceiling_is_error() {
        let (_, tokens) = ModifierSet::scan("/ac X <wait.5-3>").unwrap();
        let mut set = ModifierSet::default();
        assert!(set.attach(&tokens[0]).is_err());
    }

    #[test]
    fn test_condition_negation_forms() {
        let (_, set) = scan_all("/ac X <condition.not.crafting,gathering>");
        let condition = set.condition.unwrap();
        assert!(condition.negated);
        assert_eq!(condition.conditions, vec!["crafting", "gathering"]);

        let (_, set) = scan_all("/ac X <condition.!mounted>");
        assert!(set.condition.unwrap().negated);
    }

    #[test]
    fn test_modifiers_anywhere_in_line() {
        let (cleaned, set) = scan_all("/target <index.2> \"Stone\" <distance.4.5><hq>");
        assert_eq!(cleaned.split_whitespace().collect::<Vec<_>>(), vec!["/target", "\"Stone\""]);
        assert_eq!(set.index, Some(IndexModifier { index: 2 }));
        assert_eq!(set.distance, Some(DistanceModifier { distance: 4.5 }));
        assert!(set.high_quality);
    }

    #[test]
    fn test_same_kind_overwrites_silently() {
        let (_, set) = scan_all("/ac X <wait.1> <wait.2>");
        assert_eq!(set.wait, Some(WaitModifier { min_ms: 2000, max_ms: 2000 }));
    }

    #[test]
    fn test_unknown_dotted_token_is_error() {
        assert!(ModifierSet::scan("/ac X <bogus.3>").is_err());
    }

    #[test]
    fn test_bare_placeholders_pass_through() {
        let (cleaned, tokens) = ModifierSet::scan("/ac \"Provoke\" <t>").unwrap();
        assert!(tokens.is_empty());
        assert!(cleaned.contains("<t>"));
    }

    #[test]
    fn test_party_slot_bounds() {
        let (_, tokens) = ModifierSet::scan("/target <party.9>").unwrap();
        let mut set = ModifierSet::default();
        assert!(set.attach(&tokens[0]).is_err());
    }
}
