// Line and column helpers shared by the scanners

/// Split source text into lines, dropping the `\r` of CRLF endings.
///
/// Unlike `str::lines`, a trailing newline yields a final empty line so that
/// the last line index matches what the editor reports.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect()
}

/// Number of UTF-16 code units in `s`.
pub fn utf16_len(s: &str) -> u32 {
    s.encode_utf16().count() as u32
}

/// Convert a byte offset within `line` to a UTF-16 column.
pub fn utf16_column(line: &str, byte: usize) -> u32 {
    let byte = floor_char_boundary(line, byte.min(line.len()));
    utf16_len(&line[..byte])
}

/// Convert a UTF-16 column to a byte offset within `line`, clamped to the line.
pub fn byte_offset(line: &str, column: u32) -> usize {
    let mut units = 0u32;
    for (idx, ch) in line.char_indices() {
        if units >= column {
            return idx;
        }
        units += ch.len_utf16() as u32;
    }
    line.len()
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Replace comment text with spaces, keeping byte offsets stable.
///
/// Handles `//` line comments and `/* */` block comments spanning lines.
/// Quoted strings are left untouched so `"http://"` survives.
pub fn mask_comments(lines: &[&str]) -> Vec<String> {
    mask(lines, false)
}

/// Like [`mask_comments`], but string contents are blanked too. The quotes
/// themselves stay, so `print("def f(")` reads as `print("       ")`.
pub fn mask_code(lines: &[&str]) -> Vec<String> {
    mask(lines, true)
}

fn mask(lines: &[&str], blank_strings: bool) -> Vec<String> {
    let mut in_block = false;
    let mut masked = Vec::with_capacity(lines.len());

    for line in lines {
        let bytes = line.as_bytes();
        let mut out = bytes.to_vec();
        let mut quote: Option<u8> = None;
        let mut i = 0;

        while i < bytes.len() {
            let b = bytes[i];
            let next = bytes.get(i + 1).copied();

            if in_block {
                if b == b'*' && next == Some(b'/') {
                    out[i] = b' ';
                    out[i + 1] = b' ';
                    in_block = false;
                    i += 2;
                } else {
                    out[i] = b' ';
                    i += 1;
                }
                continue;
            }

            if let Some(q) = quote {
                if b == q {
                    quote = None;
                    i += 1;
                    continue;
                }
                let width = match b {
                    b'\\' => 1 + line[i + 1..].chars().next().map_or(0, char::len_utf8),
                    _ => 1,
                };
                if blank_strings {
                    for byte in out.iter_mut().skip(i).take(width) {
                        *byte = b' ';
                    }
                }
                i += width;
                continue;
            }

            match (b, next) {
                (b'"', _) | (b'\'', _) => {
                    quote = Some(b);
                    i += 1;
                }
                (b'/', Some(b'/')) => {
                    for byte in &mut out[i..] {
                        *byte = b' ';
                    }
                    break;
                }
                (b'/', Some(b'*')) => {
                    out[i] = b' ';
                    out[i + 1] = b' ';
                    in_block = true;
                    i += 2;
                }
                _ => i += 1,
            }
        }

        // Every byte of a comment or string body is blanked, so the buffer
        // stays valid UTF-8.
        masked.push(String::from_utf8_lossy(&out).into_owned());
    }

    masked
}
