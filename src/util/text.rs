use std::borrow::Cow;

use unicode_width::UnicodeWidthChar;

const ELLIPSIS: &str = "...";

/// Longest error text (in columns) kept on a single log line.
const MAX_ERROR_WIDTH: usize = 200;

/// Cuts `s` down to at most `max_width` terminal columns, appending "..."
/// when anything was dropped. Wide (CJK, emoji) characters count as two.
///
/// ```
/// use textpipe::util::preview;
///
/// assert_eq!(preview("Short", 10), "Short");
/// assert_eq!(preview("Hello World", 8), "Hello...");
/// ```
pub fn preview(s: &str, max_width: usize) -> Cow<'_, str> {
    let mut width = 0;
    let mut fits_until = s.len();
    let mut cut_for_ellipsis = None;
    let budget = max_width.saturating_sub(ELLIPSIS.len());

    for (idx, c) in s.char_indices() {
        let w = c.width().unwrap_or(0);
        if cut_for_ellipsis.is_none() && width + w > budget {
            cut_for_ellipsis = Some(idx);
        }
        if width + w > max_width {
            fits_until = idx;
            break;
        }
        width += w;
    }

    if fits_until == s.len() {
        return Cow::Borrowed(s);
    }

    // Too narrow for an ellipsis: hard cut
    if max_width <= ELLIPSIS.len() {
        return Cow::Owned(s[..fits_until].to_string());
    }

    let cut = cut_for_ellipsis.unwrap_or(fits_until);
    Cow::Owned(format!("{}{}", &s[..cut], ELLIPSIS))
}

/// Shrinks a possibly huge error message to something fit for one log line.
///
/// Wrapped HTTP errors can carry whole HTML bodies; only the first line is
/// kept, any embedded markup dump is dropped and the rest is width-capped.
pub fn condense_error(message: &str) -> String {
    let first_line = message.lines().next().unwrap_or_default();
    let without_markup = match first_line.find("<!") {
        Some(idx) => first_line[..idx].trim_end_matches([',', ':', ' ']),
        None => first_line,
    };
    preview(without_markup.trim(), MAX_ERROR_WIDTH).into_owned()
}

/// Strips terminal control characters and ANSI escape sequences.
///
/// Feed titles and extracted text are remote input and end up printed to a
/// terminal. Tab, newline and carriage return are kept. Returns
/// `Cow::Borrowed` when nothing needed removing.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_unwanted = |c: char| {
        c == '\x1b' || c == '\x7f' || (c < ' ' && !matches!(c, '\t' | '\n' | '\r'))
    };

    if !s.chars().any(is_unwanted) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\x1b' {
            if !is_unwanted(c) {
                out.push(c);
            }
            continue;
        }

        match chars.peek() {
            // CSI: ESC [ params... final byte in 0x40..=0x7e
            Some('[') => {
                chars.next();
                for c in chars.by_ref() {
                    if ('\x40'..='\x7e').contains(&c) {
                        break;
                    }
                }
            }
            // OSC: ESC ] ... terminated by BEL or ESC \
            Some(']') => {
                chars.next();
                while let Some(c) = chars.next() {
                    if c == '\x07' {
                        break;
                    }
                    if c == '\x1b' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    Cow::Owned(out)
}
