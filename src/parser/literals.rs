/// Parse an assembler-style number: `$1F`, `0x1F`, `1Fh`, `%1010`, `0b1010`
/// or decimal.
pub fn parse_number(text: &str) -> Option<u32> {
    let text = text.trim();
    let lower = text.to_ascii_lowercase();

    let (digits, radix) = if let Some(hex) = lower.strip_prefix('$') {
        (hex, 16)
    } else if let Some(hex) = lower.strip_prefix("0x") {
        (hex, 16)
    } else if let Some(bin) = lower.strip_prefix('%') {
        (bin, 2)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        (bin, 2)
    } else if let Some(hex) = lower.strip_suffix('h') {
        (hex, 16)
    } else {
        (lower.as_str(), 10)
    };

    if digits.is_empty() {
        return None;
    }
    u32::from_str_radix(digits, radix).ok()
}

/// Like [`parse_number`] but limited to 16 bits.
pub fn parse_word(text: &str) -> Option<u16> {
    parse_number(text).and_then(|n| u16::try_from(n).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radix_markers() {
        assert_eq!(parse_number("$4000"), Some(0x4000));
        assert_eq!(parse_number("0x9D95"), Some(0x9D95));
        assert_eq!(parse_number("0FFh"), Some(0xFF));
        assert_eq!(parse_number("%1010"), Some(10));
        assert_eq!(parse_number("0b11"), Some(3));
        assert_eq!(parse_number("42"), Some(42));
        assert_eq!(parse_number("$"), None);
        assert_eq!(parse_number("hl"), None);
        assert_eq!(parse_word("$10000"), None);
    }
}
