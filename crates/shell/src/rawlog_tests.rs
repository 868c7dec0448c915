// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn collect(log: &RawLog, offset: u64) -> Option<Vec<u8>> {
    log.read_from(offset).map(|(a, b)| {
        let mut v = a.to_vec();
        v.extend_from_slice(b);
        v
    })
}

#[test]
fn empty_read() {
    let log = RawLog::new(4096);
    assert_eq!(collect(&log, 0), Some(vec![]));
    assert_eq!(log.available_from(0), 0);
}

#[test]
fn sequential_appends() {
    let mut log = RawLog::new(4096);
    log.append(b"hello");
    log.append(b" world");

    assert_eq!(collect(&log, 0), Some(b"hello world".to_vec()));
    assert_eq!(collect(&log, 5), Some(b" world".to_vec()));
    assert_eq!(log.total_written(), 11);
    assert_eq!(log.available_from(0), 11);
}

#[test]
fn capacity_floor_applies() {
    // Tiny requested capacities are raised to a working floor.
    let mut log = RawLog::new(8);
    let chunk = vec![b'x'; 4096];
    log.append(&chunk);
    log.append(b"tail");
    assert_eq!(log.oldest_offset(), 4);
    let data = collect(&log, 0).expect("read");
    assert_eq!(data.len(), 4096);
    assert!(data.ends_with(b"tail"));
}

#[test]
fn wrap_clamps_old_offsets() {
    let mut log = RawLog::new(4096);
    let big = vec![b'a'; 5000];
    log.append(&big);
    log.append(b"zz");

    // 5002 total, capacity 4096 -> oldest = 906; offset 0 clamps there.
    assert_eq!(log.oldest_offset(), 906);
    let clamped = collect(&log, 0).expect("read");
    assert_eq!(clamped.len(), 4096);
    assert!(clamped.ends_with(b"zz"));
}

#[test]
fn offset_too_new_is_none() {
    let mut log = RawLog::new(4096);
    log.append(b"abc");
    assert_eq!(collect(&log, 4), None);
    assert_eq!(log.available_from(4), 0);
}

#[test]
fn cursor_reads_are_disjoint_and_contiguous() {
    let mut log = RawLog::new(4096);
    let mut cursor = 0u64;

    log.append(b"first ");
    let a = log.read_since(&mut cursor);
    assert_eq!(&a[..], b"first ");
    assert_eq!(cursor, 6);

    let empty = log.read_since(&mut cursor);
    assert!(empty.is_empty());

    log.append(b"second");
    let b = log.read_since(&mut cursor);
    assert_eq!(&b[..], b"second");
    assert_eq!(cursor, 12);
}

#[test]
fn lagging_cursor_clamps_forward() {
    let mut log = RawLog::new(4096);
    let mut cursor = 0u64;
    log.append(&vec![b'x'; 5000]);

    let data = log.read_since(&mut cursor);
    assert_eq!(data.len(), 4096);
    assert_eq!(cursor, 5000);
}

#[test]
fn ahead_cursor_resynchronizes() {
    let log = RawLog::new(4096);
    let mut cursor = 99;
    assert!(log.read_since(&mut cursor).is_empty());
    assert_eq!(cursor, 0);
}

#[test]
fn span_reads_stop_at_the_fence() {
    let mut log = RawLog::new(4096);
    log.append(b"child output");
    let fence = log.total_written();
    log.append(b"[status line]");

    let mut cursor = 0u64;
    let upto = log.read_span(&mut cursor, fence);
    assert_eq!(&upto[..], b"child output");
    assert_eq!(cursor, fence);

    // Nothing more below the fence.
    assert!(log.read_span(&mut cursor, fence).is_empty());

    // A plain read continues past it.
    let rest = log.read_since(&mut cursor);
    assert_eq!(&rest[..], b"[status line]");
}

#[test]
fn span_read_clamps_end_to_log() {
    let mut log = RawLog::new(4096);
    log.append(b"abc");
    let mut cursor = 0u64;
    let data = log.read_span(&mut cursor, 999);
    assert_eq!(&data[..], b"abc");
    assert_eq!(cursor, 3);
}

#[test]
fn contents_returns_resident_window() {
    let mut log = RawLog::new(4096);
    log.append(b"retained");
    assert_eq!(log.contents(), b"retained".to_vec());
}
