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

//! # cayenne entities
//!
//! ## Introduction
//!
//! The [Product] is what arrives on the wire (one JSON object per line); the [StoredItem] is its
//! projection into the single-table DynamoDB layout. Everything lives in one table, so the keys are
//! overloaded:
//!
//! | attribute | value                    |
//! |-----------|--------------------------|
//! | `PK`      | `PRODUCT#<name>`         |
//! | `SK`      | `METADATA#<store>`       |
//! | `GSI1PK`  | `CATEGORY#pepper`        |
//! | `GSI1SK`  | `PRODUCT#<name>`         |
//!
//! plus a lower-cased copy of the name (`name_lower`) so that the query path can do a
//! case-insensitive `contains()`. The aggregate counter lives in the same table under
//! `METADATA`/`COUNTER`.
//!
//! Items are decoded into these types exactly once, at the storage boundary, via [serde_dynamo];
//! nothing downstream ever pokes at an untyped attribute map.

use std::{collections::HashMap, fmt::Display};

use aws_sdk_dynamodb::types::AttributeValue;
use serde::{Deserialize, Serialize};
use serde_dynamo::aws_sdk_dynamodb_1::{from_item, to_item};
use snafu::{prelude::*, Backtrace};

/// Partition key of the category index; every product is a pepper
pub const CATEGORY: &str = "CATEGORY#pepper";
/// Prefix for both the primary partition key & the category sort key
pub const PRODUCT_PREFIX: &str = "PRODUCT#";
/// Prefix for the primary sort key
pub const METADATA_PREFIX: &str = "METADATA#";
/// Partition key of the aggregate counter
pub const COUNTER_PK: &str = "METADATA";
/// Sort key of the aggregate counter
pub const COUNTER_SK: &str = "COUNTER";
/// Name of the numeric attribute holding the aggregate count
pub const COUNT_ATTR: &str = "count";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{field} for {name} must be a non-negative number; got {value}"))]
    BadAmount {
        name: String,
        field: &'static str,
        value: f64,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to decode a DynamoDB item: {source}"))]
    Decode {
        source: serde_dynamo::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Products must have a non-empty name"))]
    EmptyName { backtrace: Backtrace },
    #[snafu(display("Failed to encode {what} as a DynamoDB item: {source}"))]
    Encode {
        what: String,
        source: serde_dynamo::Error,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

/// An untyped DynamoDB item, as the SDK hands them to us
pub type Item = HashMap<String, AttributeValue>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            Product                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A chili-pepper product, as read from the input file
///
/// Missing fields take their zero values (the input files in the wild are produced by a scraper
/// that isn't terribly careful); the only thing we insist on is a name.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Product {
    pub name: String,
    pub price: f64,
    pub price_per_lb: f64,
    pub price_per_oz: f64,
    pub store: String,
    pub volume: String,
    pub weight: f64,
    pub on_sale: bool,
    /// Supplied by the caller; not validated
    pub datetime: String,
}

impl Product {
    fn validate(self) -> Result<Product> {
        ensure!(!self.name.is_empty(), EmptyNameSnafu);
        for (field, value) in [
            ("price", self.price),
            ("price_per_lb", self.price_per_lb),
            ("price_per_oz", self.price_per_oz),
            ("weight", self.weight),
        ] {
            if value.is_nan() || value < 0.0 {
                return BadAmountSnafu {
                    name: self.name.clone(),
                    field,
                    value,
                }
                .fail();
            }
        }
        Ok(self)
    }
}

/// (name, store): the identity of a [Product]
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ProductKey {
    pub name: String,
    pub store: String,
}

impl Display for ProductKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.name, self.store)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            ItemKey                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The primary key of any item in the table
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ItemKey {
    #[serde(rename = "PK")]
    pk: String,
    #[serde(rename = "SK")]
    sk: String,
}

impl ItemKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> ItemKey {
        ItemKey {
            pk: pk.into(),
            sk: sk.into(),
        }
    }
    /// The key of the aggregate counter
    pub fn counter() -> ItemKey {
        ItemKey::new(COUNTER_PK, COUNTER_SK)
    }
    /// True if this key names a product (as opposed to the counter)
    pub fn is_product(&self) -> bool {
        self.pk.starts_with(PRODUCT_PREFIX)
    }
    pub fn to_item(&self) -> Result<Item> {
        to_item(self).context(EncodeSnafu {
            what: format!("{}/{}", self.pk, self.sk),
        })
    }
    /// Pull the key out of an item; any other attributes are ignored
    pub fn from_item(item: Item) -> Result<ItemKey> {
        from_item(item).context(DecodeSnafu)
    }
}

impl Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.pk, self.sk)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           StoredItem                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A [Product] as laid-out in DynamoDB
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct StoredItem {
    #[serde(rename = "PK")]
    pk: String,
    #[serde(rename = "SK")]
    sk: String,
    #[serde(rename = "GSI1PK")]
    gsi1pk: String,
    #[serde(rename = "GSI1SK")]
    gsi1sk: String,
    name: String,
    name_lower: String,
    price: f64,
    price_per_lb: f64,
    price_per_oz: f64,
    store: String,
    volume: String,
    weight: f64,
    on_sale: bool,
    datetime: String,
}

impl StoredItem {
    /// Validate `product` & project it into the table layout
    pub fn from_product(product: Product) -> Result<StoredItem> {
        let product = product.validate()?;
        Ok(StoredItem {
            pk: format!("{PRODUCT_PREFIX}{}", product.name),
            sk: format!("{METADATA_PREFIX}{}", product.store),
            gsi1pk: CATEGORY.to_owned(),
            gsi1sk: format!("{PRODUCT_PREFIX}{}", product.name),
            name_lower: product.name.to_lowercase(),
            name: product.name,
            price: product.price,
            price_per_lb: product.price_per_lb,
            price_per_oz: product.price_per_oz,
            store: product.store,
            volume: product.volume,
            weight: product.weight,
            on_sale: product.on_sale,
            datetime: product.datetime,
        })
    }
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.pk.clone(), self.sk.clone())
    }
    pub fn product_key(&self) -> ProductKey {
        ProductKey {
            name: self.name.clone(),
            store: self.store.clone(),
        }
    }
    pub fn category(&self) -> &str {
        &self.gsi1pk
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn name_lower(&self) -> &str {
        &self.name_lower
    }
    pub fn price(&self) -> f64 {
        self.price
    }
    pub fn store(&self) -> &str {
        &self.store
    }
    pub fn into_product(self) -> Product {
        Product {
            name: self.name,
            price: self.price,
            price_per_lb: self.price_per_lb,
            price_per_oz: self.price_per_oz,
            store: self.store,
            volume: self.volume,
            weight: self.weight,
            on_sale: self.on_sale,
            datetime: self.datetime,
        }
    }
    pub fn to_item(&self) -> Result<Item> {
        to_item(self).context(EncodeSnafu {
            what: self.product_key().to_string(),
        })
    }
    pub fn from_item(item: Item) -> Result<StoredItem> {
        from_item(item).context(DecodeSnafu)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          CounterItem                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The aggregate counter, as laid-out in DynamoDB
///
/// Only the `count` attribute matters when reading it back.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
pub struct CounterItem {
    pub count: i64,
}

impl CounterItem {
    pub fn from_item(item: Item) -> Result<CounterItem> {
        from_item(item).context(DecodeSnafu)
    }
}
