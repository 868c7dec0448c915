// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn plain_lines_pass_through() {
    let mut emitter = Emitter::new(1000, 10_000);
    let (tail, truncated) = emitter.consume(b"hello\nworld\n");
    assert_eq!(tail, vec!["hello", "world"]);
    assert!(!truncated);
    assert_eq!(emitter.total_sent(), 12); // "hello\nworld\n" stripped keeps both \n
}

#[test]
fn ansi_is_stripped_before_counting() {
    let mut emitter = Emitter::new(1000, 10_000);
    let (tail, _) = emitter.consume(b"\x1b[32mok\x1b[0m\r\n");
    assert_eq!(tail, vec!["ok"]);
    assert_eq!(emitter.total_sent(), 3); // "ok\n"
}

#[test]
fn per_update_cap_keeps_the_tail() {
    let mut emitter = Emitter::new(5, 10_000);
    let (tail, truncated) = emitter.consume(b"abcdefghij");
    assert!(truncated);
    assert_eq!(tail, vec!["fghij"]);
    assert_eq!(emitter.total_sent(), 5);
}

#[test]
fn budget_saturates_and_stays_empty() {
    // Scenario: maxTotalChars = 10, child prints 15 chars.
    let mut emitter = Emitter::new(1000, 10);
    let (tail, truncated) = emitter.consume(b"abcdefghijklmno");
    assert!(truncated);
    assert_eq!(tail.iter().map(|l| l.chars().count()).sum::<usize>(), 10);
    assert!(emitter.exhausted());
    assert_eq!(emitter.total_sent(), 10);

    // Every further emission carries an empty tail.
    let (tail, truncated) = emitter.consume(b"more output");
    assert!(tail.is_empty());
    assert!(truncated);
    assert_eq!(emitter.total_sent(), 10);

    let (tail, truncated) = emitter.consume(b"");
    assert!(tail.is_empty());
    assert!(!truncated);
}

#[test]
fn budget_spans_multiple_emissions() {
    let mut emitter = Emitter::new(1000, 10);
    let (tail, truncated) = emitter.consume(b"sixsix");
    assert_eq!(tail, vec!["sixsix"]);
    assert!(!truncated);
    assert!(!emitter.exhausted());

    // Only four characters of budget remain.
    let (tail, truncated) = emitter.consume(b"abcdef");
    assert!(truncated);
    assert_eq!(tail, vec!["cdef"]);
    assert!(emitter.exhausted());
    assert_eq!(emitter.total_sent(), 10);
}

#[test]
fn exact_budget_fit_exhausts_without_truncation() {
    let mut emitter = Emitter::new(1000, 4);
    let (tail, truncated) = emitter.consume(b"abcd");
    assert_eq!(tail, vec!["abcd"]);
    assert!(!truncated);
    assert!(emitter.exhausted());
}

#[test]
fn trailing_newline_does_not_add_an_empty_line() {
    let mut emitter = Emitter::new(1000, 10_000);
    let (tail, _) = emitter.consume(b"hello\n");
    assert_eq!(tail, vec!["hello"]);
}

#[test]
fn interior_blank_lines_survive() {
    let mut emitter = Emitter::new(1000, 10_000);
    let (tail, _) = emitter.consume(b"a\n\nb");
    assert_eq!(tail, vec!["a", "", "b"]);
}

#[test]
fn update_cap_change_applies_to_later_emissions() {
    let mut emitter = Emitter::new(100, 10_000);
    let (tail, _) = emitter.consume(b"0123456789");
    assert_eq!(tail, vec!["0123456789"]);

    emitter.set_update_max_chars(4);
    let (tail, truncated) = emitter.consume(b"0123456789");
    assert!(truncated);
    assert_eq!(tail, vec!["6789"]);
}
