//! Text cleanup before export.

use unicode_normalization::UnicodeNormalization;

/// NFC-normalizes `text` and drops control characters other than tab,
/// newline and carriage return. Noncharacters U+FFFE and U+FFFF are dropped
/// too; spreadsheet XML cannot carry them.
pub fn clean_text(text: &str) -> String {
    text.nfc().filter(|c| is_exportable(*c)).collect()
}

fn is_exportable(c: char) -> bool {
    match c {
        '\t' | '\n' | '\r' => true,
        '\u{FFFE}' | '\u{FFFF}' => false,
        c => !c.is_control(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composes_to_nfc() {
        // "e" + combining acute accent
        let decomposed = "caf\u{0065}\u{0301}";
        assert_eq!(clean_text(decomposed), "caf\u{00e9}");
    }

    #[test]
    fn test_strips_control_characters() {
        let dirty = "a\u{0000}b\u{0007}c\u{001b}[0md\u{007f}";
        assert_eq!(clean_text(dirty), "abc[0md");
    }

    #[test]
    fn test_keeps_whitespace_controls() {
        assert_eq!(clean_text("col1\tcol2\r\nnext"), "col1\tcol2\r\nnext");
    }

    #[test]
    fn test_drops_noncharacters() {
        assert_eq!(clean_text("x\u{FFFE}y\u{FFFF}"), "xy");
    }
}
