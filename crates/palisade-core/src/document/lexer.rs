//! Lexical token counting for the document parse cap.
//!
//! The cap must be enforced before the real parser allocates an AST, so this
//! scanner only counts tokens per the GraphQL lexical grammar: ignored
//! characters (whitespace, commas, comments, BOM) contribute nothing, and
//! every punctuator, name, number, or string counts as one. Malformed input
//! is not rejected here; the parser does that.

/// Count the lexical tokens in a GraphQL source text.
#[must_use]
pub fn count_tokens(source: &str) -> usize {
    let bytes = source.as_bytes();
    let mut index = 0;
    let mut count = 0;

    while index < bytes.len() {
        match bytes[index] {
            // Ignored: whitespace, line terminators, commas, BOM bytes.
            b' ' | b'\t' | b'\r' | b'\n' | b',' => index += 1,
            0xEF | 0xBB | 0xBF => index += 1,
            // Comment to end of line.
            b'#' => {
                while index < bytes.len() && bytes[index] != b'\n' {
                    index += 1;
                }
            },
            // Spread.
            b'.' => {
                count += 1;
                index += if bytes[index..].starts_with(b"...") { 3 } else { 1 };
            },
            // String values, block or quoted.
            b'"' => {
                count += 1;
                index = if bytes[index..].starts_with(b"\"\"\"") {
                    skip_block_string(bytes, index + 3)
                } else {
                    skip_string(bytes, index + 1)
                };
            },
            // Names.
            b'_' | b'a'..=b'z' | b'A'..=b'Z' => {
                count += 1;
                while index < bytes.len()
                    && (bytes[index] == b'_' || bytes[index].is_ascii_alphanumeric())
                {
                    index += 1;
                }
            },
            // Numbers (int or float, optionally signed).
            b'-' | b'0'..=b'9' => {
                count += 1;
                index += 1;
                while index < bytes.len()
                    && matches!(bytes[index], b'0'..=b'9' | b'.' | b'e' | b'E' | b'+' | b'-')
                {
                    index += 1;
                }
            },
            // Punctuators and anything else the parser will judge.
            _ => {
                count += 1;
                index += 1;
            },
        }
    }

    count
}

fn skip_string(bytes: &[u8], mut index: usize) -> usize {
    while index < bytes.len() {
        match bytes[index] {
            b'\\' => index += 2,
            b'"' => return index + 1,
            _ => index += 1,
        }
    }
    index
}

fn skip_block_string(bytes: &[u8], mut index: usize) -> usize {
    while index < bytes.len() {
        if bytes[index..].starts_with(b"\\\"\"\"") {
            index += 4;
        } else if bytes[index..].starts_with(b"\"\"\"") {
            return index + 3;
        } else {
            index += 1;
        }
    }
    index
}
