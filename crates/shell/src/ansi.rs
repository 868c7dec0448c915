// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Escape-sequence stripping for the plain-text projection of the raw log,
//! plus detection of cursor-position queries (DSR) in the output stream.

/// Strip CSI, OSC, and simple escape sequences from raw terminal bytes,
/// returning plain text.
///
/// Keeps `\n` and `\t`; drops `\r` (so `\r\n` collapses to `\n`) and all
/// other C0 controls. Bytes that are not valid UTF-8 decode lossily.
pub fn strip_ansi(data: &[u8]) -> String {
    let text = String::from_utf8_lossy(data);
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\x1b' => consume_escape(&mut chars),
            '\n' | '\t' => out.push(c),
            c if (c as u32) < 0x20 || c == '\x7f' => {}
            c => out.push(c),
        }
    }

    out
}

/// Consume one escape sequence from the stream, cursor positioned after ESC.
fn consume_escape(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    match chars.peek().copied() {
        // CSI: parameters (0x30..=0x3f), intermediates (0x20..=0x2f),
        // one final byte (0x40..=0x7e).
        Some('[') => {
            chars.next();
            for c in chars.by_ref() {
                if ('\u{40}'..='\u{7e}').contains(&c) {
                    break;
                }
            }
        }
        // OSC: terminated by BEL or ST (ESC \).
        Some(']') => {
            chars.next();
            while let Some(c) = chars.next() {
                if c == '\x07' {
                    break;
                }
                if c == '\x1b' {
                    if chars.peek() == Some(&'\\') {
                        chars.next();
                    }
                    break;
                }
            }
        }
        // Charset designation: ESC ( X / ESC ) X take one more byte.
        Some('(') | Some(')') => {
            chars.next();
            chars.next();
        }
        // Any other two-char escape (ESC c, ESC 7, ESC =, ...).
        Some(_) => {
            chars.next();
        }
        None => {}
    }
}

/// Count Device Status Report cursor queries (`ESC[6n` / `ESC[?6n`) in a
/// chunk of child output. The session answers each with a cursor report.
pub fn count_dsr(data: &[u8]) -> usize {
    const PLAIN: &[u8] = b"\x1b[6n";
    const DEC: &[u8] = b"\x1b[?6n";

    let mut count = 0;
    let mut i = 0;
    while i < data.len() {
        if data[i..].starts_with(DEC) {
            count += 1;
            i += DEC.len();
        } else if data[i..].starts_with(PLAIN) {
            count += 1;
            i += PLAIN.len();
        } else {
            i += 1;
        }
    }
    count
}

/// Format the cursor report the child expects back: `ESC[<row>;<col>R`
/// with 1-based coordinates.
pub fn dsr_reply(row: usize, col: usize) -> Vec<u8> {
    format!("\x1b[{row};{col}R").into_bytes()
}

#[cfg(test)]
#[path = "ansi_tests.rs"]
mod tests;
