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

//! # dynamodb
//!
//! [Backend] implementation for DynamoDB.
//!
//! [Backend]: crate::storage::Backend

use async_trait::async_trait;
use aws_config::{meta::region::RegionProviderChain, BehaviorVersion, Region};
use aws_sdk_dynamodb::{
    config::{http::HttpResponse, Credentials},
    error::SdkError,
    operation::{
        batch_write_item::BatchWriteItemError, create_table::CreateTableError,
        get_item::GetItemError, query::QueryError, scan::ScanError,
        transact_write_items::TransactWriteItemsError, update_item::UpdateItemError,
    },
    types::{
        AttributeDefinition, AttributeValue, BillingMode, DeleteRequest, GlobalSecondaryIndex,
        KeySchemaElement, KeyType, Projection, ProjectionType, Put, PutRequest,
        ScalarAttributeType, TransactWriteItem, Update, WriteRequest,
    },
};
use either::Either;
use secrecy::SecretString;
use snafu::{prelude::*, Backtrace};
use tap::Pipe;
use tracing::{debug, info};
use url::Url;

use crate::{
    counter::CounterUpdate,
    entities::{self, CounterItem, Item, ItemKey, StoredItem, CATEGORY, COUNT_ATTR},
    storage::{self, BatchOutcome, ContinuationToken, Page, WriteOp},
};

/// Used when neither the configuration nor the environment names a region
pub const DEFAULT_REGION: &str = "ca-central-1";

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       module Error type                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("BatchWriteItem failed: {source}"))]
    BatchWrite {
        #[snafu(source(from(SdkError<BatchWriteItemError, HttpResponse>, Box::new)))]
        source: Box<SdkError<BatchWriteItemError, HttpResponse>>,
        backtrace: Backtrace,
    },
    #[snafu(display("{source}"))]
    Codec {
        #[snafu(backtrace)]
        source: entities::Error,
    },
    #[snafu(display("Failed to create table {table}: {source}"))]
    CreateTable {
        table: String,
        #[snafu(source(from(SdkError<CreateTableError, HttpResponse>, Box::new)))]
        source: Box<SdkError<CreateTableError, HttpResponse>>,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to build {name}: {source}"))]
    GenericBuildFailure {
        name: String,
        source: aws_sdk_dynamodb::error::BuildError,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to read the aggregate counter: {source}"))]
    GetCounter {
        #[snafu(source(from(SdkError<GetItemError, HttpResponse>, Box::new)))]
        source: Box<SdkError<GetItemError, HttpResponse>>,
        backtrace: Backtrace,
    },
    #[snafu(display("No endpoint URLs specified"))]
    NoEndpoints { backtrace: Backtrace },
    #[snafu(display("Query against index {index} failed: {source}"))]
    Query {
        index: String,
        #[snafu(source(from(SdkError<QueryError, HttpResponse>, Box::new)))]
        source: Box<SdkError<QueryError, HttpResponse>>,
        backtrace: Backtrace,
    },
    #[snafu(display("Scan of {table} failed: {source}"))]
    Scan {
        table: String,
        #[snafu(source(from(SdkError<ScanError, HttpResponse>, Box::new)))]
        source: Box<SdkError<ScanError, HttpResponse>>,
        backtrace: Backtrace,
    },
    #[snafu(display("TransactWriteItems failed: {source}"))]
    TransactWrite {
        #[snafu(source(from(SdkError<TransactWriteItemsError, HttpResponse>, Box::new)))]
        source: Box<SdkError<TransactWriteItemsError, HttpResponse>>,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to update the aggregate counter: {source}"))]
    UpdateCounter {
        #[snafu(source(from(SdkError<UpdateItemError, HttpResponse>, Box::new)))]
        source: Box<SdkError<UpdateItemError, HttpResponse>>,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

macro_rules! table_attr {
    ($col_name:expr, $ty:ident) => {
        AttributeDefinition::builder()
            .attribute_name($col_name)
            .attribute_type(ScalarAttributeType::$ty)
            .build()
            .context(GenericBuildFailureSnafu {
                name: $col_name.to_string(),
            })?
    };
}

macro_rules! key_elem {
    ($col_name:expr, $ty:ident) => {
        KeySchemaElement::builder()
            .attribute_name($col_name)
            .key_type(KeyType::$ty)
            .build()
            .context(GenericBuildFailureSnafu {
                name: $col_name.to_string(),
            })?
    };
}

/// The `UpdateExpression` & `:v` operand that effect `update` on the `count` attribute
fn counter_expression(update: CounterUpdate) -> (&'static str, AttributeValue) {
    match update {
        CounterUpdate::Add(delta) => ("ADD #count :v", AttributeValue::N(delta.to_string())),
        CounterUpdate::Set(value) => ("SET #count = :v", AttributeValue::N(value.to_string())),
    }
}

pub struct Client {
    client: ::aws_sdk_dynamodb::Client,
    table: String,
    index: String,
}

impl Client {
    /// Connect to DynamoDB, either in an AWS region or at one or more explicit endpoints (the
    /// first of which will be used)
    pub async fn new(
        location: &Either<String, Vec<Url>>,
        credentials: &Option<(SecretString, SecretString)>,
        table: &str,
        index: &str,
    ) -> Result<Client> {
        use secrecy::ExposeSecret;
        let creds = credentials.as_ref().map(|(id, secret)| {
            Credentials::new(
                id.expose_secret(),
                secret.expose_secret(),
                None,
                None,
                "cayenne",
            )
        });

        let config = match location {
            Either::Left(region) => {
                let region_provider =
                    RegionProviderChain::first_try(Some(Region::new(region.clone())))
                        .or_default_provider()
                        .or_else(Region::new(DEFAULT_REGION));
                let mut loader =
                    aws_config::defaults(BehaviorVersion::latest()).region(region_provider);
                if let Some(creds) = creds {
                    loader = loader.credentials_provider(creds);
                }
                loader.load().await
            }
            Either::Right(endpoints) => {
                let ep_url = endpoints.first().context(NoEndpointsSnafu)?;
                // Requests still get signed, so we need *some* region, even against a local
                // endpoint
                let region_provider =
                    RegionProviderChain::default_provider().or_else(Region::new(DEFAULT_REGION));
                let mut loader = aws_config::defaults(BehaviorVersion::latest())
                    .region(region_provider)
                    .endpoint_url(ep_url.as_str());
                if let Some(creds) = creds {
                    loader = loader.credentials_provider(creds);
                }
                loader.load().await
            }
        };
        debug!("Connecting to table {table} (index {index}) at {location:?}");
        Ok(Client {
            client: ::aws_sdk_dynamodb::Client::new(&config),
            table: table.to_owned(),
            index: index.to_owned(),
        })
    }

    /// Create the product table & its category index (pay-per-request)
    pub async fn create_table(&self) -> Result<()> {
        self.client
            .create_table()
            .table_name(&self.table)
            .billing_mode(BillingMode::PayPerRequest)
            .set_attribute_definitions(Some(vec![
                table_attr!("PK", S),
                table_attr!("SK", S),
                table_attr!("GSI1PK", S),
                table_attr!("GSI1SK", S),
            ]))
            .set_key_schema(Some(vec![key_elem!("PK", Hash), key_elem!("SK", Range)]))
            .global_secondary_indexes(
                GlobalSecondaryIndex::builder()
                    .index_name(&self.index)
                    .set_key_schema(Some(vec![
                        key_elem!("GSI1PK", Hash),
                        key_elem!("GSI1SK", Range),
                    ]))
                    .projection(
                        Projection::builder()
                            .projection_type(ProjectionType::All)
                            .build(),
                    )
                    .build()
                    .context(GenericBuildFailureSnafu {
                        name: self.index.clone(),
                    })?,
            )
            .send()
            .await
            .context(CreateTableSnafu {
                table: self.table.clone(),
            })?;
        info!("Created table {} with index {}", self.table, self.index);
        Ok(())
    }

    fn counter_update(&self, update: CounterUpdate) -> Result<Update> {
        let (expr, value) = counter_expression(update);
        Update::builder()
            .table_name(&self.table)
            .set_key(Some(ItemKey::counter().to_item().context(CodecSnafu)?))
            .update_expression(expr)
            .expression_attribute_names("#count", COUNT_ATTR)
            .expression_attribute_values(":v", value)
            .build()
            .context(GenericBuildFailureSnafu {
                name: "counter update".to_string(),
            })
    }

    async fn put_with_counter(&self, item: &StoredItem, update: CounterUpdate) -> Result<()> {
        let put = Put::builder()
            .table_name(&self.table)
            .set_item(Some(item.to_item().context(CodecSnafu)?))
            .build()
            .context(GenericBuildFailureSnafu {
                name: item.product_key().to_string(),
            })?;
        self.client
            .transact_write_items()
            .transact_items(TransactWriteItem::builder().put(put).build())
            .transact_items(
                TransactWriteItem::builder()
                    .update(self.counter_update(update)?)
                    .build(),
            )
            .send()
            .await
            .context(TransactWriteSnafu)
            .map(|_| ())
    }

    async fn batch_write(&self, ops: &[WriteOp]) -> Result<BatchOutcome> {
        let requests = ops
            .iter()
            .map(|op| -> Result<WriteRequest> {
                match op {
                    WriteOp::Put(item) => PutRequest::builder()
                        .set_item(Some(item.to_item().context(CodecSnafu)?))
                        .build()
                        .context(GenericBuildFailureSnafu {
                            name: item.product_key().to_string(),
                        })
                        .map(|req| WriteRequest::builder().put_request(req).build()),
                    WriteOp::Delete(key) => DeleteRequest::builder()
                        .set_key(Some(key.to_item().context(CodecSnafu)?))
                        .build()
                        .context(GenericBuildFailureSnafu {
                            name: key.to_string(),
                        })
                        .map(|req| WriteRequest::builder().delete_request(req).build()),
                }
            })
            .collect::<Result<Vec<WriteRequest>>>()?;
        let output = self
            .client
            .batch_write_item()
            .request_items(&self.table, requests)
            .send()
            .await
            .context(BatchWriteSnafu)?;
        output
            .unprocessed_items
            .and_then(|mut unprocessed| unprocessed.remove(&self.table))
            .map(|reqs| reqs.len())
            .unwrap_or(0)
            .pipe(|unprocessed| Ok(BatchOutcome { unprocessed }))
    }

    async fn update_counter(&self, update: CounterUpdate) -> Result<()> {
        let (expr, value) = counter_expression(update);
        self.client
            .update_item()
            .table_name(&self.table)
            .set_key(Some(ItemKey::counter().to_item().context(CodecSnafu)?))
            .update_expression(expr)
            .expression_attribute_names("#count", COUNT_ATTR)
            .expression_attribute_values(":v", value)
            .send()
            .await
            .context(UpdateCounterSnafu)
            .map(|_| ())
    }

    async fn get_counter(&self) -> Result<Option<i64>> {
        self.client
            .get_item()
            .table_name(&self.table)
            .set_key(Some(ItemKey::counter().to_item().context(CodecSnafu)?))
            .send()
            .await
            .context(GetCounterSnafu)?
            .item
            .map(|item| CounterItem::from_item(item).map(|c| c.count))
            .transpose()
            .context(CodecSnafu)
    }

    async fn scan_keys(&self, limit: usize, start: Option<&ContinuationToken>) -> Result<Page> {
        let start = start
            .map(|token| token.last_evaluated().to_item())
            .transpose()
            .context(CodecSnafu)?;
        let output = self
            .client
            .scan()
            .table_name(&self.table)
            .limit(i32::try_from(limit).unwrap_or(i32::MAX))
            .projection_expression("#pk, #sk")
            .expression_attribute_names("#pk", "PK")
            .expression_attribute_names("#sk", "SK")
            .set_exclusive_start_key(start)
            .send()
            .await
            .context(ScanSnafu {
                table: self.table.clone(),
            })?;
        let keys = output
            .items
            .unwrap_or_default()
            .into_iter()
            .map(ItemKey::from_item)
            .collect::<std::result::Result<Vec<_>, _>>()
            .context(CodecSnafu)?;
        let next = output
            .last_evaluated_key
            .filter(|lek| !lek.is_empty())
            .map(|lek| ItemKey::from_item(lek).map(ContinuationToken::new))
            .transpose()
            .context(CodecSnafu)?;
        Ok(Page { keys, next })
    }

    async fn query_category(&self, name_contains: Option<&str>) -> Result<Vec<StoredItem>> {
        let mut items = Vec::new();
        let mut start: Option<Item> = None;
        loop {
            let mut builder = self
                .client
                .query()
                .table_name(&self.table)
                .index_name(&self.index)
                .key_condition_expression("#gsi1pk = :category")
                .expression_attribute_names("#gsi1pk", "GSI1PK")
                .expression_attribute_values(":category", AttributeValue::S(CATEGORY.to_owned()))
                .set_exclusive_start_key(start.take());
            if let Some(needle) = name_contains {
                builder = builder
                    .filter_expression("contains(#name_lower, :needle)")
                    .expression_attribute_names("#name_lower", "name_lower")
                    .expression_attribute_values(":needle", AttributeValue::S(needle.to_owned()));
            }
            let output = builder.send().await.context(QuerySnafu {
                index: self.index.clone(),
            })?;
            for item in output.items.unwrap_or_default() {
                items.push(StoredItem::from_item(item).context(CodecSnafu)?);
            }
            match output.last_evaluated_key.filter(|lek| !lek.is_empty()) {
                Some(lek) => start = Some(lek),
                None => break,
            }
        }
        debug!("query_category({name_contains:?}) :=> {} items", items.len());
        Ok(items)
    }
}

#[async_trait]
impl storage::Backend for Client {
    async fn put_with_counter(
        &self,
        item: &StoredItem,
        update: CounterUpdate,
    ) -> std::result::Result<(), storage::Error> {
        Client::put_with_counter(self, item, update)
            .await
            .map_err(storage::Error::new)
    }
    async fn batch_write(
        &self,
        ops: &[WriteOp],
    ) -> std::result::Result<BatchOutcome, storage::Error> {
        Client::batch_write(self, ops)
            .await
            .map_err(storage::Error::new)
    }
    async fn update_counter(
        &self,
        update: CounterUpdate,
    ) -> std::result::Result<(), storage::Error> {
        Client::update_counter(self, update)
            .await
            .map_err(storage::Error::new)
    }
    async fn get_counter(&self) -> std::result::Result<Option<i64>, storage::Error> {
        Client::get_counter(self).await.map_err(storage::Error::new)
    }
    async fn scan_keys(
        &self,
        limit: usize,
        start: Option<&ContinuationToken>,
    ) -> std::result::Result<Page, storage::Error> {
        Client::scan_keys(self, limit, start)
            .await
            .map_err(storage::Error::new)
    }
    async fn query_category(
        &self,
        name_contains: Option<&str>,
    ) -> std::result::Result<Vec<StoredItem>, storage::Error> {
        Client::query_category(self, name_contains)
            .await
            .map_err(storage::Error::new)
    }
}
