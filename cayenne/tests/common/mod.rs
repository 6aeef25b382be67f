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

//! # Shared integration test fixtures
//!
//! [InMemory] is a [Backend] that keeps the table in a [BTreeMap], so that scans come back in a
//! stable order. It records every batch & every counter update it's handed, and can be told to fail
//! particular calls.
#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashSet},
    io::Cursor,
    ops::Bound,
    sync::Mutex,
};

use async_trait::async_trait;

use cayenne::{
    counter::CounterUpdate,
    entities::{ItemKey, Product, StoredItem},
    source::Records,
    storage::{self, Backend, BatchOutcome, ContinuationToken, Page, WriteOp},
};

#[derive(Debug)]
pub struct Injected(pub &'static str);

impl std::fmt::Display for Injected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "injected failure: {}", self.0)
    }
}

impl std::error::Error for Injected {}

#[derive(Clone, Debug, PartialEq)]
pub enum Stored {
    Product(StoredItem),
    Counter(i64),
}

/// Which calls should fail
#[derive(Debug, Default)]
pub struct Failures {
    /// Zero-based indicies of `batch_write` calls to fail
    pub batches: HashSet<usize>,
    /// Names of products whose transactional put should fail
    pub puts: HashSet<String>,
    /// Zero-based indicies of `scan_keys` calls to fail
    pub scans: HashSet<usize>,
    pub counter_updates: bool,
    pub counter_reads: bool,
    pub queries: bool,
    /// Report the last this-many requests in each batch as unprocessed (& don't apply them)
    pub unprocessed: usize,
}

#[derive(Debug, Default)]
pub struct InMemory {
    table: Mutex<BTreeMap<ItemKey, Stored>>,
    pub failures: Mutex<Failures>,
    batch_sizes: Mutex<Vec<usize>>,
    counter_updates: Mutex<Vec<CounterUpdate>>,
    scans: Mutex<usize>,
}

impl InMemory {
    pub fn new() -> InMemory {
        InMemory::default()
    }
    /// Pre-load the table, bypassing the counter
    pub fn with_products<I: IntoIterator<Item = Product>>(products: I) -> InMemory {
        let this = InMemory::new();
        {
            let mut table = this.table.lock().unwrap();
            for product in products {
                let item = StoredItem::from_product(product).unwrap();
                table.insert(item.key(), Stored::Product(item));
            }
        }
        this
    }
    pub fn set_counter(&self, count: i64) {
        self.table
            .lock()
            .unwrap()
            .insert(ItemKey::counter(), Stored::Counter(count));
    }
    pub fn counter(&self) -> Option<i64> {
        match self.table.lock().unwrap().get(&ItemKey::counter()) {
            Some(Stored::Counter(count)) => Some(*count),
            _ => None,
        }
    }
    pub fn products(&self) -> Vec<StoredItem> {
        self.table
            .lock()
            .unwrap()
            .values()
            .filter_map(|stored| match stored {
                Stored::Product(item) => Some(item.clone()),
                Stored::Counter(_) => None,
            })
            .collect()
    }
    pub fn len(&self) -> usize {
        self.table.lock().unwrap().len()
    }
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }
    pub fn counter_updates(&self) -> Vec<CounterUpdate> {
        self.counter_updates.lock().unwrap().clone()
    }
    pub fn scans(&self) -> usize {
        *self.scans.lock().unwrap()
    }
    fn apply_counter(table: &mut BTreeMap<ItemKey, Stored>, update: CounterUpdate) {
        let current = match table.get(&ItemKey::counter()) {
            Some(Stored::Counter(count)) => *count,
            _ => 0,
        };
        let next = match update {
            CounterUpdate::Add(delta) => current + delta,
            CounterUpdate::Set(value) => value,
        };
        table.insert(ItemKey::counter(), Stored::Counter(next));
    }
}

#[async_trait]
impl Backend for InMemory {
    async fn put_with_counter(
        &self,
        item: &StoredItem,
        update: CounterUpdate,
    ) -> Result<(), storage::Error> {
        if self.failures.lock().unwrap().puts.contains(item.name()) {
            return Err(storage::Error::new(Injected("put")));
        }
        let mut table = self.table.lock().unwrap();
        table.insert(item.key(), Stored::Product(item.clone()));
        InMemory::apply_counter(&mut table, update);
        self.counter_updates.lock().unwrap().push(update);
        Ok(())
    }
    async fn batch_write(&self, ops: &[WriteOp]) -> Result<BatchOutcome, storage::Error> {
        // DynamoDB's own limits
        assert!(!ops.is_empty() && ops.len() <= 25, "bad batch size {}", ops.len());
        let keys = ops
            .iter()
            .map(|op| match op {
                WriteOp::Put(item) => item.key(),
                WriteOp::Delete(key) => key.clone(),
            })
            .collect::<HashSet<_>>();
        assert_eq!(keys.len(), ops.len(), "duplicate keys in a batch");

        let index = {
            let mut sizes = self.batch_sizes.lock().unwrap();
            sizes.push(ops.len());
            sizes.len() - 1
        };
        let (fail, unprocessed) = {
            let failures = self.failures.lock().unwrap();
            (
                failures.batches.contains(&index),
                failures.unprocessed.min(ops.len()),
            )
        };
        if fail {
            return Err(storage::Error::new(Injected("batch")));
        }
        let mut table = self.table.lock().unwrap();
        for op in &ops[..ops.len() - unprocessed] {
            match op {
                WriteOp::Put(item) => {
                    table.insert(item.key(), Stored::Product(item.clone()));
                }
                WriteOp::Delete(key) => {
                    table.remove(key);
                }
            }
        }
        Ok(BatchOutcome { unprocessed })
    }
    async fn update_counter(&self, update: CounterUpdate) -> Result<(), storage::Error> {
        if self.failures.lock().unwrap().counter_updates {
            return Err(storage::Error::new(Injected("counter update")));
        }
        InMemory::apply_counter(&mut self.table.lock().unwrap(), update);
        self.counter_updates.lock().unwrap().push(update);
        Ok(())
    }
    async fn get_counter(&self) -> Result<Option<i64>, storage::Error> {
        if self.failures.lock().unwrap().counter_reads {
            return Err(storage::Error::new(Injected("counter read")));
        }
        Ok(self.counter())
    }
    async fn scan_keys(
        &self,
        limit: usize,
        start: Option<&ContinuationToken>,
    ) -> Result<Page, storage::Error> {
        let index = {
            let mut scans = self.scans.lock().unwrap();
            *scans += 1;
            *scans - 1
        };
        if self.failures.lock().unwrap().scans.contains(&index) {
            return Err(storage::Error::new(Injected("scan")));
        }
        let table = self.table.lock().unwrap();
        let lower = match start {
            Some(token) => Bound::Excluded(token.last_evaluated().clone()),
            None => Bound::Unbounded,
        };
        let keys = table
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        // Like DynamoDB, hand back a last-evaluated key whenever the limit was hit, even if there
        // turns out to be nothing after it
        let next = if keys.len() == limit {
            keys.last().cloned().map(ContinuationToken::new)
        } else {
            None
        };
        Ok(Page { keys, next })
    }
    async fn query_category(
        &self,
        name_contains: Option<&str>,
    ) -> Result<Vec<StoredItem>, storage::Error> {
        if self.failures.lock().unwrap().queries {
            return Err(storage::Error::new(Injected("query")));
        }
        Ok(self
            .products()
            .into_iter()
            .filter(|item| item.category() == cayenne::entities::CATEGORY)
            .filter(|item| name_contains.map_or(true, |needle| item.name_lower().contains(needle)))
            .collect())
    }
}

pub fn product(name: &str, store: &str) -> Product {
    Product {
        name: name.to_owned(),
        price: 4.99,
        store: store.to_owned(),
        ..Default::default()
    }
}

/// Render `products` as newline-delimited JSON
pub fn jsonl<'a, I: IntoIterator<Item = &'a Product>>(products: I) -> String {
    products
        .into_iter()
        .map(|p| serde_json::to_string(p).unwrap())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn records(text: &str) -> Records<Cursor<Vec<u8>>> {
    Records::new(Cursor::new(text.as_bytes().to_vec()))
}
