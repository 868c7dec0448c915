// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Input translation: key tokens, hex payloads, and bracketed paste to raw
//! PTY bytes. Pure functions, no session state.

/// Structured input from the driver. Concatenation order on encode:
/// hex bytes, `text`, each `key` token, then `paste` wrapped in
/// bracketed-paste markers.
#[derive(Debug, Clone, Default)]
pub struct InputSpec {
    pub text: Option<String>,
    pub keys: Vec<String>,
    pub hex: Vec<String>,
    pub paste: Option<String>,
}

/// Bracketed paste start marker.
const PASTE_BEGIN: &[u8] = b"\x1b[200~";
/// Bracketed paste end marker.
const PASTE_END: &[u8] = b"\x1b[201~";

/// Encode a full input spec to bytes.
pub fn encode_input(spec: &InputSpec) -> Vec<u8> {
    let mut out = Vec::new();
    for entry in &spec.hex {
        out.extend_from_slice(&decode_hex(entry));
    }
    if let Some(ref text) = spec.text {
        out.extend_from_slice(text.as_bytes());
    }
    for key in &spec.keys {
        out.extend_from_slice(&encode_key(key));
    }
    if let Some(ref paste) = spec.paste {
        out.extend_from_slice(PASTE_BEGIN);
        out.extend_from_slice(paste.as_bytes());
        out.extend_from_slice(PASTE_END);
    }
    out
}

/// Modifier set parsed from a key token prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Mods {
    shift: bool,
    alt: bool,
    ctrl: bool,
}

impl Mods {
    fn any(&self) -> bool {
        self.shift || self.alt || self.ctrl
    }

    /// xterm modifier parameter: 1 + shift + 2*alt + 4*ctrl.
    fn xterm_param(&self) -> u8 {
        1 + u8::from(self.shift) + 2 * u8::from(self.alt) + 4 * u8::from(self.ctrl)
    }
}

/// Encode a single key token to bytes.
///
/// Unknown tokens are forwarded literally, so a plain string passed through
/// here is unchanged.
pub fn encode_key(token: &str) -> Vec<u8> {
    let (mods, base) = split_mods(token);
    match encode_base(base, mods) {
        Some(bytes) => bytes,
        None => token.as_bytes().to_vec(),
    }
}

/// Peel modifier prefixes (`ctrl+`/`ctrl-`/`c-`, `alt+`/`alt-`/`m-`,
/// `shift+`/`shift-`/`s-`) in any order.
fn split_mods(token: &str) -> (Mods, &str) {
    let mut mods = Mods::default();
    let mut rest = token;

    loop {
        let lower = rest.to_ascii_lowercase();
        let stripped = if let Some(r) = strip_any(&lower, rest, &["ctrl+", "ctrl-", "c-"]) {
            mods.ctrl = true;
            r
        } else if let Some(r) = strip_any(&lower, rest, &["alt+", "alt-", "m-"]) {
            mods.alt = true;
            r
        } else if let Some(r) = strip_any(&lower, rest, &["shift+", "shift-", "s-"]) {
            mods.shift = true;
            r
        } else {
            break;
        };
        // A bare modifier prefix ("ctrl+") has nothing left to modify;
        // treat the whole token as unknown.
        if stripped.is_empty() {
            return (Mods::default(), token);
        }
        rest = stripped;
    }

    (mods, rest)
}

fn strip_any<'a>(lower: &str, original: &'a str, prefixes: &[&str]) -> Option<&'a str> {
    for p in prefixes {
        if lower.starts_with(p) {
            return Some(&original[p.len()..]);
        }
    }
    None
}

/// Keys that take the xterm modified encoding `ESC[<n>;<mod><suffix>`.
///
/// Returns `(code, suffix)`: a letter suffix uses `ESC[1;<mod><letter>`,
/// a `~` suffix uses `ESC[<code>;<mod>~`.
fn xterm_slot(base: &str) -> Option<(u8, char)> {
    match base {
        "up" => Some((1, 'A')),
        "down" => Some((1, 'B')),
        "right" => Some((1, 'C')),
        "left" => Some((1, 'D')),
        "home" => Some((1, 'H')),
        "end" => Some((1, 'F')),
        "insert" | "ic" => Some((2, '~')),
        "delete" | "del" | "dc" => Some((3, '~')),
        "pageup" | "pgup" | "ppage" => Some((5, '~')),
        "pagedown" | "pgdn" | "npage" => Some((6, '~')),
        _ => None,
    }
}

fn encode_base(base: &str, mods: Mods) -> Option<Vec<u8>> {
    let lower = base.to_ascii_lowercase();

    // Navigation/editing set: xterm modifier encoding when modified.
    if let Some((code, suffix)) = xterm_slot(&lower) {
        if mods.any() {
            let m = mods.xterm_param();
            let s = match suffix {
                '~' => format!("\x1b[{code};{m}~"),
                letter => format!("\x1b[1;{m}{letter}"),
            };
            return Some(s.into_bytes());
        }
        let s = match (&lower[..], suffix) {
            (_, '~') => format!("\x1b[{code}~"),
            ("up", _) => "\x1b[A".to_owned(),
            ("down", _) => "\x1b[B".to_owned(),
            ("right", _) => "\x1b[C".to_owned(),
            ("left", _) => "\x1b[D".to_owned(),
            ("home", _) => "\x1b[H".to_owned(),
            _ => "\x1b[F".to_owned(),
        };
        return Some(s.into_bytes());
    }

    let bytes: Vec<u8> = match lower.as_str() {
        "enter" | "return" => b"\r".to_vec(),
        "escape" | "esc" => b"\x1b".to_vec(),
        "tab" if mods.shift => return Some(b"\x1b[Z".to_vec()),
        "tab" => b"\t".to_vec(),
        "btab" => return Some(b"\x1b[Z".to_vec()),
        "space" if mods.ctrl => vec![0x00],
        "space" => b" ".to_vec(),
        "backspace" | "bspace" => vec![0x7f],

        "f1" => b"\x1bOP".to_vec(),
        "f2" => b"\x1bOQ".to_vec(),
        "f3" => b"\x1bOR".to_vec(),
        "f4" => b"\x1bOS".to_vec(),
        "f5" => b"\x1b[15~".to_vec(),
        "f6" => b"\x1b[17~".to_vec(),
        "f7" => b"\x1b[18~".to_vec(),
        "f8" => b"\x1b[19~".to_vec(),
        "f9" => b"\x1b[20~".to_vec(),
        "f10" => b"\x1b[21~".to_vec(),
        "f11" => b"\x1b[23~".to_vec(),
        "f12" => b"\x1b[24~".to_vec(),

        // Application keypad.
        "kp0" => b"\x1bOp".to_vec(),
        "kp1" => b"\x1bOq".to_vec(),
        "kp2" => b"\x1bOr".to_vec(),
        "kp3" => b"\x1bOs".to_vec(),
        "kp4" => b"\x1bOt".to_vec(),
        "kp5" => b"\x1bOu".to_vec(),
        "kp6" => b"\x1bOv".to_vec(),
        "kp7" => b"\x1bOw".to_vec(),
        "kp8" => b"\x1bOx".to_vec(),
        "kp9" => b"\x1bOy".to_vec(),
        "kp/" => b"\x1bOo".to_vec(),
        "kp*" => b"\x1bOj".to_vec(),
        "kp-" => b"\x1bOm".to_vec(),
        "kp+" => b"\x1bOk".to_vec(),
        "kp." => b"\x1bOn".to_vec(),
        "kpenter" => b"\x1bOM".to_vec(),

        _ => {
            // C0 specials reachable only with ctrl.
            if mods.ctrl {
                if let Some(byte) = ctrl_special(&lower) {
                    return Some(apply_alt(vec![byte], mods));
                }
            }
            // Single printable character.
            let mut chars = base.chars();
            let (Some(c), None) = (chars.next(), chars.next()) else {
                return None;
            };
            return Some(encode_char(c, mods));
        }
    };

    Some(apply_alt(bytes, mods))
}

/// `ctrl+[`, `ctrl+\`, `ctrl+]`, `ctrl+^`, `ctrl+_`, `ctrl+?`.
fn ctrl_special(base: &str) -> Option<u8> {
    match base {
        "[" => Some(0x1b),
        "\\" => Some(0x1c),
        "]" => Some(0x1d),
        "^" => Some(0x1e),
        "_" => Some(0x1f),
        "?" => Some(0x7f),
        _ => None,
    }
}

/// Encode a single printable character with modifiers: shift uppercases,
/// ctrl applies the C0 mapping, alt prefixes ESC.
fn encode_char(c: char, mods: Mods) -> Vec<u8> {
    let c = if mods.shift { c.to_ascii_uppercase() } else { c };

    let body: Vec<u8> = if mods.ctrl && c.is_ascii_alphabetic() {
        vec![(c.to_ascii_uppercase() as u8).wrapping_sub(b'@')]
    } else {
        let mut buf = [0u8; 4];
        c.encode_utf8(&mut buf).as_bytes().to_vec()
    };

    apply_alt(body, mods)
}

fn apply_alt(mut bytes: Vec<u8>, mods: Mods) -> Vec<u8> {
    if mods.alt {
        bytes.insert(0, 0x1b);
    }
    bytes
}

/// Decode a hex string ("1b5b41", optionally `0x`-prefixed, separators
/// ignored) into bytes. Entries with stray characters decode up to the
/// first invalid digit pair.
fn decode_hex(entry: &str) -> Vec<u8> {
    let cleaned: String = entry
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !matches!(c, ' ' | ':' | '_'))
        .collect();

    let mut out = Vec::with_capacity(cleaned.len() / 2);
    let bytes = cleaned.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        let hi = (bytes[i] as char).to_digit(16);
        let lo = (bytes[i + 1] as char).to_digit(16);
        match (hi, lo) {
            (Some(h), Some(l)) => out.push(((h << 4) | l) as u8),
            _ => break,
        }
        i += 2;
    }
    out
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
