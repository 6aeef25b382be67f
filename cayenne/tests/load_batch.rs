// Copyright (C) 2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of cayenne.
//
// cayenne is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// cayenne is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with cayenne.  If not,
// see <http://www.gnu.org/licenses/>.

//! # Batched loads against the in-memory backend

use std::io::{self, BufReader, Read};

use cayenne::{
    counter::CounterUpdate,
    load::{load_batched, Error},
    source::Records,
};

mod common;

use common::{jsonl, product, records, InMemory};

#[tokio::test]
async fn counter_matches_distinct_records() {
    let products = (0..60)
        .map(|i| product(&format!("Pepper {i}"), "A"))
        .collect::<Vec<_>>();
    let backend = InMemory::new();
    let summary = load_batched(&backend, records(&jsonl(&products)), 25)
        .await
        .unwrap();

    assert_eq!(backend.batch_sizes(), vec![25, 25, 10]);
    assert_eq!(backend.products().len(), 60);
    assert_eq!(backend.counter(), Some(60));
    // One reconciliation, at the end
    assert_eq!(backend.counter_updates(), vec![CounterUpdate::Add(60)]);
    assert_eq!(summary.lines, 60);
    assert_eq!(summary.accepted, 60);
    assert_eq!(summary.written, 60);
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.submitted, 60);
    assert!(summary.counter_updated);
}

#[tokio::test]
async fn duplicates_in_one_window() {
    let ghost = product("Ghost", "A");
    let backend = InMemory::new();
    let summary = load_batched(&backend, records(&jsonl([&ghost, &ghost])), 25)
        .await
        .unwrap();

    assert_eq!(backend.batch_sizes(), vec![1]);
    assert_eq!(backend.counter(), Some(1));
    assert_eq!(summary.duplicates, 1);
    assert_eq!(summary.written, 1);
}

#[tokio::test]
async fn duplicates_across_windows_are_rewritten() {
    // With a window of two, the second "Ghost" lands in a fresh window & is written (& counted)
    // again
    let ghost = product("Ghost", "A");
    let habanero = product("Habanero", "A");
    let backend = InMemory::new();
    let summary = load_batched(&backend, records(&jsonl([&ghost, &habanero, &ghost])), 2)
        .await
        .unwrap();

    assert_eq!(backend.batch_sizes(), vec![2, 1]);
    assert_eq!(backend.products().len(), 2);
    assert_eq!(summary.duplicates, 0);
    assert_eq!(backend.counter(), Some(3));
}

#[tokio::test]
async fn malformed_lines_are_skipped() {
    let text = format!(
        "{}\nnot json at all\n\n{{\"name\":\"\"}}\n{}\n",
        serde_json::to_string(&product("Ghost", "A")).unwrap(),
        serde_json::to_string(&product("Habanero", "B")).unwrap(),
    );
    let backend = InMemory::new();
    let summary = load_batched(&backend, records(&text), 25).await.unwrap();

    assert_eq!(summary.lines, 4);
    assert_eq!(summary.malformed, 2);
    assert_eq!(summary.accepted, 2);
    assert_eq!(backend.counter(), Some(2));
}

#[tokio::test]
async fn failed_batches_still_count() {
    let products = (0..30)
        .map(|i| product(&format!("Pepper {i}"), "A"))
        .collect::<Vec<_>>();
    let backend = InMemory::new();
    backend.failures.lock().unwrap().batches.insert(0);
    let summary = load_batched(&backend, records(&jsonl(&products)), 25)
        .await
        .unwrap();

    assert_eq!(summary.batches, 2);
    assert_eq!(summary.failed_batches, 1);
    assert_eq!(summary.failed, 25);
    assert_eq!(summary.written, 5);
    assert_eq!(backend.products().len(), 5);
    // The running total is never decremented
    assert_eq!(backend.counter(), Some(30));
}

#[tokio::test]
async fn unprocessed_items_are_reported() {
    let products = (0..10)
        .map(|i| product(&format!("Pepper {i}"), "A"))
        .collect::<Vec<_>>();
    let backend = InMemory::new();
    backend.failures.lock().unwrap().unprocessed = 3;
    let summary = load_batched(&backend, records(&jsonl(&products)), 25)
        .await
        .unwrap();

    assert_eq!(summary.unprocessed, 3);
    assert_eq!(summary.written, 7);
    assert_eq!(backend.counter(), Some(10));
}

#[tokio::test]
async fn counter_failure_is_not_fatal() {
    let backend = InMemory::new();
    backend.failures.lock().unwrap().counter_updates = true;
    let summary = load_batched(&backend, records(&jsonl([&product("Ghost", "A")])), 25)
        .await
        .unwrap();

    assert_eq!(backend.products().len(), 1);
    assert_eq!(backend.counter(), None);
    assert!(!summary.counter_updated);
}

#[tokio::test]
async fn empty_input() {
    let backend = InMemory::new();
    let summary = load_batched(&backend, records(""), 25).await.unwrap();

    assert!(backend.batch_sizes().is_empty());
    assert_eq!(summary.submitted, 0);
    assert_eq!(backend.counter(), Some(0));
}

#[tokio::test]
async fn bad_batch_sizes() {
    let backend = InMemory::new();
    assert!(matches!(
        load_batched(&backend, records(""), 26).await,
        Err(Error::BatchSize { .. })
    ));
    assert!(matches!(
        load_batched(&backend, records(""), 0).await,
        Err(Error::BatchSize { .. })
    ));
}

/// Yields one good line, then fails
struct FailsPartway {
    line: Option<&'static [u8]>,
}

impl Read for FailsPartway {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.line.take() {
            Some(line) => {
                buf[..line.len()].copy_from_slice(line);
                Ok(line.len())
            }
            None => Err(io::Error::other("the disk is on fire")),
        }
    }
}

#[tokio::test]
async fn read_errors_are_fatal() {
    let backend = InMemory::new();
    let reader = BufReader::new(FailsPartway {
        line: Some(b"{\"name\":\"Ghost\",\"store\":\"A\"}\n"),
    });
    assert!(matches!(
        load_batched(&backend, Records::new(reader), 25).await,
        Err(Error::Input { .. })
    ));
    // Nothing was written, and the counter was never touched
    assert!(backend.batch_sizes().is_empty());
    assert_eq!(backend.counter(), None);
}

#[tokio::test]
async fn invalid_utf8_is_only_malformed() {
    let mut text = serde_json::to_vec(&product("Ghost", "A")).unwrap();
    text.extend_from_slice(b"\n{\"name\":\"Bad\xff\"}\n");
    text.extend(serde_json::to_vec(&product("Habanero", "B")).unwrap());
    let backend = InMemory::new();
    let summary = load_batched(&backend, Records::new(io::Cursor::new(text)), 25)
        .await
        .unwrap();

    assert_eq!(summary.lines, 3);
    assert_eq!(summary.malformed, 1);
    assert_eq!(summary.accepted, 2);
    assert_eq!(backend.products().len(), 2);
    assert_eq!(backend.counter(), Some(2));
    assert!(summary.counter_updated);
}
