//! Function-body extraction for trigger and cleanup dispatch.
//!
//! A minimal tokenizer walks the scripting dialect source and locates the
//! balanced `function <name> … end` span. Block keywords are counted against
//! their closers, with string literals and line comments skipped, so bodies
//! with nested `if`/`for`/`while`/`do`/`repeat` constructs (which a
//! line-oriented pattern cannot match) extract correctly. When the same name
//! is defined more than once, the first declaration in source order wins.

/// One keyword-ish token with its byte span in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Token<'a> {
    word: &'a str,
    start: usize,
    end: usize,
}

fn tokenize(source: &str) -> Vec<Token<'_>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        // Line comments run to end of line.
        if b == b'-' && bytes.get(i + 1) == Some(&b'-') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }
        // String literals, with backslash escapes.
        if b == b'"' || b == b'\'' {
            let quote = b;
            i += 1;
            while i < bytes.len() {
                if bytes[i] == b'\\' {
                    i += 2;
                    continue;
                }
                if bytes[i] == quote {
                    i += 1;
                    break;
                }
                i += 1;
            }
            continue;
        }
        if b.is_ascii_alphabetic() || b == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push(Token {
                word: &source[start..i],
                start,
                end: i,
            });
            continue;
        }
        i += 1;
    }
    tokens
}

/// Locate `function <name>` and return the full balanced definition text,
/// declaration through its matching `end`. Returns `None` when the function
/// is missing or its body never balances.
pub fn find_function(source: &str, name: &str) -> Option<String> {
    let tokens = tokenize(source);
    let mut head = None;
    for (position, token) in tokens.iter().enumerate() {
        if token.word == "function"
            && tokens
                .get(position + 1)
                .is_some_and(|next| next.word.eq_ignore_ascii_case(name))
        {
            head = Some(position);
            break;
        }
    }
    let head = head?;

    let mut depth = 0usize;
    // `for`/`while` headers carry their own `do`; it must not count twice.
    let mut header_do_pending = false;
    for token in &tokens[head..] {
        match token.word {
            "function" | "if" | "repeat" => depth += 1,
            "for" | "while" => {
                depth += 1;
                header_do_pending = true;
            }
            "do" => {
                if header_do_pending {
                    header_do_pending = false;
                } else {
                    depth += 1;
                }
            }
            "end" | "until" => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    let start = tokens[head].start;
                    return Some(source[start..token.end].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_simple_function() {
        let source = "local x = 1\nfunction OnLogin()\n  yield(\"/echo hi\")\nend\nprint(x)\n";
        let body = find_function(source, "OnLogin").unwrap();
        assert!(body.starts_with("function OnLogin()"));
        assert!(body.ends_with("end"));
        assert!(!body.contains("print"));
    }

    #[test]
    fn test_handles_nested_blocks() {
        let source = r#"
function OnChatMessage()
  for i = 1, 3 do
    if i > 1 then
      while busy() do
        yield("/wait 1")
      end
    end
  end
end
function After()
end
"#;
        let body = find_function(source, "OnChatMessage").unwrap();
        assert!(body.trim_end().ends_with("end"));
        assert!(body.contains("while busy() do"));
        assert!(!body.contains("After"));
    }

    #[test]
    fn test_handles_nested_function_and_repeat() {
        let source = r#"
function OnUpdate()
  local helper = function()
    repeat
      step()
    until done()
  end
  helper()
end
"#;
        let body = find_function(source, "OnUpdate").unwrap();
        assert!(body.contains("until done()"));
        assert_eq!(body.matches("function").count(), 2);
    }

    #[test]
    fn test_keywords_inside_strings_and_comments_do_not_count() {
        let source = "function OnLogout()\n  -- if this end comment counted, extraction breaks\n  say(\"the end\")\nend\n";
        let body = find_function(source, "OnLogout").unwrap();
        assert!(body.ends_with("end"));
        assert!(body.contains("say(\"the end\")"));
    }

    #[test]
    fn test_first_declaration_wins() {
        let source = "function Twice()\n  first()\nend\nfunction Twice()\n  second()\nend\n";
        let body = find_function(source, "Twice").unwrap();
        assert!(body.contains("first"));
        assert!(!body.contains("second"));
    }

    #[test]
    fn test_missing_or_unbalanced_returns_none() {
        assert!(find_function("local x = 1", "OnLogin").is_none());
        assert!(find_function("function OnLogin()\n  if x then\n", "OnLogin").is_none());
    }

    #[test]
    fn test_name_match_is_case_insensitive() {
        let source = "function onlogin()\nend\n";
        assert!(find_function(source, "OnLogin").is_some());
    }
}
