/// Mnemonics whose destination can't be known from the source line alone.
pub const CONTROL_TRANSFERS: [&str; 4] = ["jp", "jr", "ret", "djnz"];

/// Cut a line at its `;` comment, ignoring semicolons in strings and
/// character literals. A lone `'` (as in `ex af,af'`) is not a quote.
pub fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut in_string = false;
    let mut i = 0;

    while i < bytes.len() {
        match (in_string, bytes[i]) {
            (true, b'\\') => i += 1,
            (true, b'"') => in_string = false,
            (false, b'"') => in_string = true,
            (false, b'\'') if bytes.get(i + 2) == Some(&b'\'') => i += 2,
            (false, b';') => return &line[..i],
            _ => {}
        }
        i += 1;
    }
    line
}

/// Check if a line holds no code
pub fn is_comment(line: &str) -> bool {
    strip_comment(line).trim().is_empty()
}

/// Words of the code part of a line, split on whitespace and operand punctuation.
pub fn code_words(line: &str) -> impl Iterator<Item = &str> {
    strip_comment(line)
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | '(' | ')' | ':' | '+' | '-'))
        .filter(|w| !w.is_empty())
}

/// Does the line contain a jump or return?
pub fn is_control_transfer(line: &str) -> bool {
    code_words(line).any(|word| {
        CONTROL_TRANSFERS
            .iter()
            .any(|mnemonic| word.eq_ignore_ascii_case(mnemonic))
    })
}
