use super::commands::strip_comment;
use super::types::CallSite;

const CONDITIONS: [&str; 4] = ["z", "nz", "c", "nc"];

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Split off the leading run of word characters.
fn take_word(text: &str) -> (&str, &str) {
    let end = text.find(|c: char| !is_word_char(c)).unwrap_or(text.len());
    text.split_at(end)
}

/// Recognise a call instruction: a word ending in `call` (`call`, `bcall`,
/// `b_call`...) followed by an optional `z|nz|c|nc,` condition and a target
/// name, optionally wrapped in parentheses, with nothing after it but a comment.
pub fn match_call(line: &str) -> Option<CallSite> {
    let code = strip_comment(line);
    let mut rest = code;

    while !rest.is_empty() {
        let start = match rest.find(is_word_char) {
            Some(start) => start,
            None => return None,
        };
        let (word, after) = take_word(&rest[start..]);
        if word.to_ascii_lowercase().ends_with("call") {
            if let Some(site) = match_operands(word, after) {
                return Some(site);
            }
        }
        rest = after;
    }
    None
}

fn match_operands(command: &str, text: &str) -> Option<CallSite> {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c == '(' || c == '?' || c == '|' || c.is_whitespace() => {}
        _ => return None,
    }
    let mut rest = chars.as_str().trim_start();

    let mut condition = None;
    let (word, after) = take_word(rest);
    if CONDITIONS.iter().any(|c| word.eq_ignore_ascii_case(c)) && after.starts_with(',') {
        condition = Some(word.to_string());
        rest = after[1..].trim_start();
    }

    let (target, after) = take_word(rest);
    let after = after.strip_prefix(')').unwrap_or(after);
    if !after.trim().is_empty() {
        return None;
    }

    Some(CallSite {
        command: command.to_string(),
        condition,
        target: target.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_calls() {
        let site = match_call("\tcall DrawSprite").unwrap();
        assert_eq!(site.command, "call");
        assert_eq!(site.condition, None);
        assert_eq!(site.target, "DrawSprite");
        assert_eq!(site.call_type(), "call");
    }

    #[test]
    fn conditional_calls() {
        let site = match_call(" CALL NZ, update_score ; maybe").unwrap();
        assert_eq!(site.command, "CALL");
        assert_eq!(site.condition.as_deref(), Some("NZ"));
        assert_eq!(site.target, "update_score");
        assert_eq!(site.call_type(), "CALL NZ");

        let site = match_call(" call c_routine").unwrap();
        assert_eq!(site.condition, None);
        assert_eq!(site.target, "c_routine");
    }

    #[test]
    fn bcall_macros() {
        let site = match_call("main: bcall(_ClrLCDFull)").unwrap();
        assert_eq!(site.command, "bcall");
        assert_eq!(site.target, "_ClrLCDFull");

        let site = match_call(" b_call(_PutS)").unwrap();
        assert_eq!(site.command, "b_call");
        assert_eq!(site.target, "_PutS");
    }

    #[test]
    fn non_calls() {
        assert!(match_call(" ld hl,recall").is_none());
        assert!(match_call(" jp nz,label").is_none());
        assert!(match_call(" call pe,overflow").is_none());
        assert!(match_call(" ; call commented_out").is_none());
        assert!(match_call(" callx foo").is_none());
    }
}
