// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn plain_named_keys() {
    assert_eq!(encode_key("enter"), b"\r");
    assert_eq!(encode_key("return"), b"\r");
    assert_eq!(encode_key("escape"), b"\x1b");
    assert_eq!(encode_key("esc"), b"\x1b");
    assert_eq!(encode_key("tab"), b"\t");
    assert_eq!(encode_key("space"), b" ");
    assert_eq!(encode_key("backspace"), &[0x7f]);
    assert_eq!(encode_key("bspace"), &[0x7f]);
}

#[test]
fn arrows_and_navigation() {
    assert_eq!(encode_key("up"), b"\x1b[A");
    assert_eq!(encode_key("down"), b"\x1b[B");
    assert_eq!(encode_key("right"), b"\x1b[C");
    assert_eq!(encode_key("left"), b"\x1b[D");
    assert_eq!(encode_key("home"), b"\x1b[H");
    assert_eq!(encode_key("end"), b"\x1b[F");
    assert_eq!(encode_key("pageup"), b"\x1b[5~");
    assert_eq!(encode_key("ppage"), b"\x1b[5~");
    assert_eq!(encode_key("pgdn"), b"\x1b[6~");
    assert_eq!(encode_key("npage"), b"\x1b[6~");
    assert_eq!(encode_key("insert"), b"\x1b[2~");
    assert_eq!(encode_key("ic"), b"\x1b[2~");
    assert_eq!(encode_key("delete"), b"\x1b[3~");
    assert_eq!(encode_key("dc"), b"\x1b[3~");
}

#[test]
fn xterm_modifier_encoding() {
    // mod = 1 + shift + 2*alt + 4*ctrl
    assert_eq!(encode_key("shift+up"), b"\x1b[1;2A");
    assert_eq!(encode_key("alt+down"), b"\x1b[1;3B");
    assert_eq!(encode_key("ctrl+right"), b"\x1b[1;5C");
    assert_eq!(encode_key("ctrl+shift+left"), b"\x1b[1;6D");
    assert_eq!(encode_key("ctrl+alt+shift+up"), b"\x1b[1;8A");
    assert_eq!(encode_key("shift+home"), b"\x1b[1;2H");
    assert_eq!(encode_key("ctrl+end"), b"\x1b[1;5F");
    assert_eq!(encode_key("ctrl+delete"), b"\x1b[3;5~");
    assert_eq!(encode_key("shift+pageup"), b"\x1b[5;2~");
    assert_eq!(encode_key("alt+insert"), b"\x1b[2;3~");
}

#[test]
fn modifier_prefixes_in_any_order_and_spelling() {
    assert_eq!(encode_key("c-up"), b"\x1b[1;5A");
    assert_eq!(encode_key("m-left"), b"\x1b[1;3D");
    assert_eq!(encode_key("s-down"), b"\x1b[1;2B");
    assert_eq!(encode_key("shift-ctrl+up"), encode_key("ctrl+shift+up"));
    assert_eq!(encode_key("CTRL+Up"), b"\x1b[1;5A");
}

#[test]
fn shift_tab_and_btab() {
    assert_eq!(encode_key("shift+tab"), b"\x1b[Z");
    assert_eq!(encode_key("btab"), b"\x1b[Z");
}

#[test]
fn function_keys() {
    assert_eq!(encode_key("f1"), b"\x1bOP");
    assert_eq!(encode_key("f4"), b"\x1bOS");
    assert_eq!(encode_key("f5"), b"\x1b[15~");
    assert_eq!(encode_key("f12"), b"\x1b[24~");
}

#[test]
fn keypad_keys() {
    assert_eq!(encode_key("kp0"), b"\x1bOp");
    assert_eq!(encode_key("kp9"), b"\x1bOy");
    assert_eq!(encode_key("kp/"), b"\x1bOo");
    assert_eq!(encode_key("kp*"), b"\x1bOj");
    assert_eq!(encode_key("kp-"), b"\x1bOm");
    assert_eq!(encode_key("kp+"), b"\x1bOk");
    assert_eq!(encode_key("kp."), b"\x1bOn");
    assert_eq!(encode_key("kpenter"), b"\x1bOM");
}

#[test]
fn ctrl_letters() {
    assert_eq!(encode_key("ctrl+a"), &[0x01]);
    assert_eq!(encode_key("ctrl+c"), &[0x03]);
    assert_eq!(encode_key("ctrl+z"), &[0x1a]);
}

#[test]
fn ctrl_specials() {
    assert_eq!(encode_key("ctrl+["), &[0x1b]);
    assert_eq!(encode_key("ctrl+\\"), &[0x1c]);
    assert_eq!(encode_key("ctrl+]"), &[0x1d]);
    assert_eq!(encode_key("ctrl+^"), &[0x1e]);
    assert_eq!(encode_key("ctrl+_"), &[0x1f]);
    assert_eq!(encode_key("ctrl+?"), &[0x7f]);
    assert_eq!(encode_key("ctrl+space"), &[0x00]);
}

#[test]
fn printable_char_modifiers() {
    assert_eq!(encode_key("shift+a"), b"A");
    assert_eq!(encode_key("alt+x"), b"\x1bx");
    assert_eq!(encode_key("alt+ctrl+c"), &[0x1b, 0x03]);
}

#[test]
fn unknown_tokens_forward_literally() {
    assert_eq!(encode_key("hello"), b"hello");
    assert_eq!(encode_key("ctrl+"), b"ctrl+");
    assert_eq!(encode_key("?"), b"?");
}

#[test]
fn raw_text_round_trips() {
    let spec = InputSpec { text: Some("ls -la\n".to_owned()), ..Default::default() };
    assert_eq!(encode_input(&spec), b"ls -la\n");
}

#[test]
fn encode_order_hex_text_keys_paste() {
    let spec = InputSpec {
        text: Some("T".to_owned()),
        keys: vec!["enter".to_owned()],
        hex: vec!["1b".to_owned()],
        paste: Some("P".to_owned()),
    };
    let mut expected = Vec::new();
    expected.extend_from_slice(b"\x1b");
    expected.extend_from_slice(b"T");
    expected.extend_from_slice(b"\r");
    expected.extend_from_slice(b"\x1b[200~P\x1b[201~");
    assert_eq!(encode_input(&spec), expected);
}

#[test]
fn hex_decoding_variants() {
    let spec = InputSpec { hex: vec!["0x1b5b41".to_owned()], ..Default::default() };
    assert_eq!(encode_input(&spec), b"\x1b[A");

    let spec = InputSpec { hex: vec!["0d 0a".to_owned()], ..Default::default() };
    assert_eq!(encode_input(&spec), b"\r\n");

    // Invalid digits stop the entry without poisoning the rest.
    let spec = InputSpec {
        hex: vec!["41zz42".to_owned(), "43".to_owned()],
        ..Default::default()
    };
    assert_eq!(encode_input(&spec), b"AC");
}

#[test]
fn paste_is_bracketed() {
    let spec = InputSpec { paste: Some("multi\nline".to_owned()), ..Default::default() };
    assert_eq!(encode_input(&spec), b"\x1b[200~multi\nline\x1b[201~");
}
