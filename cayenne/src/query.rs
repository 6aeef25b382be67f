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

//! # query
//!
//! Looking up peppers by (part of) their name.

use snafu::{prelude::*, Backtrace};
use tracing::{debug, warn};

use crate::{
    counter::Counter,
    entities::StoredItem,
    storage::{self, Backend},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to query the category index: {source}"))]
    Query {
        source: storage::Error,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

/// The items matching a query, along with the table-wide total
#[derive(Clone, Debug, PartialEq)]
pub struct QueryReport {
    pub items: Vec<StoredItem>,
    /// As recorded in the aggregate counter, *not* the length of `items`
    pub total: i64,
}

impl std::fmt::Display for QueryReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Query returned {} items out of {} total records.",
            self.items.len(),
            self.total
        )?;
        self.items.iter().try_for_each(|item| {
            writeln!(
                f,
                "Name: {}, Price: ${}, Store: {}",
                item.name(),
                item.price(),
                item.store()
            )
        })
    }
}

/// Retrieve every pepper whose name contains `needle` (case-insensitively), or every pepper at all
/// if `needle` is `None` or empty
pub async fn query(backend: &dyn Backend, needle: Option<&str>) -> Result<QueryReport> {
    let needle = needle
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase());
    debug!("Querying for {needle:?}");
    let items = backend
        .query_category(needle.as_deref())
        .await
        .context(QuerySnafu)?;
    let total = match Counter::new(backend).fetch().await {
        Ok(Some(count)) => count,
        Ok(None) => {
            warn!("No aggregate counter found; reporting a total of zero");
            0
        }
        Err(err) => {
            warn!("{err}; reporting a total of zero");
            0
        }
    };
    Ok(QueryReport { items, total })
}
