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

//! # Queries against the in-memory backend

use cayenne::query::{query, Error};

mod common;

use common::{product, InMemory};

fn catalogue() -> InMemory {
    let backend = InMemory::with_products([
        product("Ghost Pepper", "A"),
        product("Habanero", "A"),
        product("Ghost Pepper", "B"),
    ]);
    backend.set_counter(3);
    backend
}

#[tokio::test]
async fn everything() {
    let report = query(&catalogue(), None).await.unwrap();
    assert_eq!(report.items.len(), 3);
    assert_eq!(report.total, 3);
    let text = report.to_string();
    assert!(text.starts_with("Query returned 3 items out of 3 total records.\n"));
    assert!(text.contains("Name: Habanero, Price: $4.99, Store: A\n"));
}

#[tokio::test]
async fn case_insensitive_substring() {
    let report = query(&catalogue(), Some("GHOST")).await.unwrap();
    assert_eq!(report.items.len(), 2);
    assert!(report.items.iter().all(|item| item.name() == "Ghost Pepper"));
    assert_eq!(report.total, 3);

    let report = query(&catalogue(), Some("nothing like it")).await.unwrap();
    assert!(report.items.is_empty());
    assert_eq!(
        report.to_string(),
        "Query returned 0 items out of 3 total records.\n"
    );
}

#[tokio::test]
async fn empty_needle_matches_everything() {
    let report = query(&catalogue(), Some("")).await.unwrap();
    assert_eq!(report.items.len(), 3);
}

#[tokio::test]
async fn total_is_independent_of_the_items() {
    // The counter is whatever the store says it is, even when it's wrong
    let backend = catalogue();
    backend.set_counter(17);
    let report = query(&backend, Some("habanero")).await.unwrap();
    assert_eq!(report.items.len(), 1);
    assert_eq!(report.total, 17);
}

#[tokio::test]
async fn missing_counter_degrades_to_zero() {
    let backend = InMemory::with_products([product("Habanero", "A")]);
    let report = query(&backend, None).await.unwrap();
    assert_eq!(report.items.len(), 1);
    assert_eq!(report.total, 0);

    let backend = catalogue();
    backend.failures.lock().unwrap().counter_reads = true;
    let report = query(&backend, None).await.unwrap();
    assert_eq!(report.items.len(), 3);
    assert_eq!(report.total, 0);
}

#[tokio::test]
async fn query_failures_are_fatal() {
    let backend = catalogue();
    backend.failures.lock().unwrap().queries = true;
    assert!(matches!(
        query(&backend, Some("ghost")).await,
        Err(Error::Query { .. })
    ));
}
