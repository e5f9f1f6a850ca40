/// ANSI escape code stripping
///
/// Producers that log to a terminal often leave colour codes in their output.
/// They are removed before parsing so that anchors such as `<PRI>` or `CEF:`
/// are found; the event keeps the untouched line in `raw`.

use std::borrow::Cow;

const ESC: char = '\u{1b}';
const BEL: char = '\u{07}';

/// Strip ANSI escape sequences (CSI, OSC and two-byte Fe sequences).
///
/// Returns `Cow::Borrowed` when the input has no ESC character.
pub fn strip_ansi_codes(input: &str) -> Cow<'_, str> {
    if !input.contains(ESC) {
        return Cow::Borrowed(input);
    }

    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != ESC {
            output.push(c);
            continue;
        }
        match chars.peek().copied() {
            // CSI: ESC [ params final-byte(0x40-0x7E)
            Some('[') => {
                chars.next();
                for b in chars.by_ref() {
                    if ('\u{40}'..='\u{7e}').contains(&b) {
                        break;
                    }
                }
            }
            // OSC: ESC ] ... terminated by BEL or ESC \
            Some(']') => {
                chars.next();
                while let Some(b) = chars.next() {
                    if b == BEL {
                        break;
                    }
                    if b == ESC && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            Some(next) if ('\u{40}'..='\u{5f}').contains(&next) => {
                chars.next();
            }
            // lone or trailing ESC
            _ => {}
        }
    }

    Cow::Owned(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_borrowed() {
        let input = "<34>Oct 11 22:14:15 host su: failed";
        assert!(matches!(strip_ansi_codes(input), Cow::Borrowed(_)));
    }

    #[test]
    fn test_strip_colours() {
        let input = "\x1b[31mERROR\x1b[0m disk full";
        assert_eq!(strip_ansi_codes(input), "ERROR disk full");
    }

    #[test]
    fn test_strip_wrapped_json() {
        let input = "\x1b[32m{\"level\":\"info\",\"msg\":\"ok\"}\x1b[0m";
        assert_eq!(strip_ansi_codes(input), "{\"level\":\"info\",\"msg\":\"ok\"}");
    }

    #[test]
    fn test_strip_osc_hyperlink() {
        let input = "\x1b]8;;https://example.com\x07Link\x1b]8;;\x07";
        assert_eq!(strip_ansi_codes(input), "Link");
    }

    #[test]
    fn test_trailing_escape_dropped() {
        assert_eq!(strip_ansi_codes("done\x1b"), "done");
    }
}
