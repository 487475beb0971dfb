//! Escaping helpers for paths echoed back to clients.
//!
//! `quote` percent-encodes a raw path for use inside a URL (redirect
//! `Location`, listing links); `html_escape` makes text safe for HTML bodies.

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Percent-encode every byte outside the unreserved set, keeping `/`.
///
/// The output never exceeds `max_len` bytes; an escape sequence is never
/// split by the cut.
///
/// ```
/// use gx_httpd::http::quote::quote;
/// assert_eq!(quote(b"/a b/c%d", 1024), "/a%20b/c%25d");
/// assert_eq!(quote(b"/abc", 2), "/a");
/// ```
pub fn quote(raw: &[u8], max_len: usize) -> String {
    let mut out = String::with_capacity(raw.len().min(max_len));
    for &b in raw {
        let unreserved = b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~' | b'/');
        let needed = if unreserved { 1 } else { 3 };
        if out.len() + needed > max_len {
            break;
        }
        if unreserved {
            out.push(char::from(b));
        } else {
            out.push('%');
            out.push(char::from(HEX[usize::from(b >> 4)]));
            out.push(char::from(HEX[usize::from(b & 0x0f)]));
        }
    }
    out
}

/// Escape the characters with a meaning in HTML text and attributes.
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
