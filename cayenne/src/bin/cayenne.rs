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

//! # cayenne
//!
//! Load, unload & query a DynamoDB catalogue of chili-pepper products.
//!
//! ## Introduction
//!
//! `cayenne` does one of six things, per invocation:
//!
//! - `--load`: read products from a newline-delimited JSON file & write each in its own
//!   transaction, bumping the aggregate count as it goes
//! - `--load-batch`: the same, but twenty-five (or fewer) at a time, reconciling the count at the end
//! - `--unload`: delete everything in the table & reset the count to zero
//! - `--query <text>`: list the peppers whose names contain `text`, case-insensitively
//! - `--create-table`: create the table & its category index
//! - with none of the above: list every pepper
//!
//! Configuration is read from `$HOME/.cayenne.toml` (if it's there), and may be overridden on the
//! command line. Results go to stdout; logging goes to stderr.

use std::{
    fmt::Display,
    io,
    path::{Path, PathBuf},
};

use clap::{crate_authors, crate_version, value_parser, Arg, ArgAction, ArgGroup, Command};
use serde::Deserialize;
use snafu::{prelude::*, Backtrace, IntoError};
use tracing::{info, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

use cayenne::{
    batch::{check_batch_size, MAX_BATCH_SIZE},
    dynamodb::Client,
    load::{load_batched, load_transactional},
    query::query,
    source,
    unload::{check_page_size, unload, MAX_PAGE_SIZE},
    util::{Credentials, DynamoLocation},
};

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        crate error type                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Snafu)]
pub enum Error {
    #[snafu(display("Bad batch size: {source}"))]
    BatchSize { source: cayenne::batch::Error },
    #[snafu(display("When creating the DynamoDB client, {source}"))]
    Client { source: cayenne::dynamodb::Error },
    #[snafu(display("Configuration file {pth:?} not found: {source}"))]
    ConfigNotFound {
        pth: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to parse configuration file {pth:?}: {source}"))]
    ConfigParse {
        pth: PathBuf,
        source: toml::de::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("{source}"))]
    CreateTable { source: cayenne::dynamodb::Error },
    #[snafu(display("Failed to parse RUST_LOG: {source}"))]
    EnvFilter {
        source: tracing_subscriber::filter::FromEnvError,
    },
    #[snafu(display("{source}"))]
    Input { source: cayenne::source::Error },
    #[snafu(display("{source}"))]
    Load { source: cayenne::load::Error },
    #[snafu(display("Bad page size: {source}"))]
    PageSize { source: cayenne::unload::Error },
    #[snafu(display("{source}"))]
    Query { source: cayenne::query::Error },
    #[snafu(display("Failed to set the tracing subscriber: {source}"))]
    Subscriber {
        source: tracing::subscriber::SetGlobalDefaultError,
    },
    #[snafu(display("{source}"))]
    Unload { source: cayenne::unload::Error },
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self::Display::fmt(&self, f)
    }
}

type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         configuration                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// cayenne configuration, version one
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
struct ConfigV1 {
    /// An AWS region, or one or more endpoint URLs
    location: DynamoLocation,
    /// "key-id,secret"; if not given, the SDK's usual credential chain applies
    credentials: Option<Credentials>,
    table: String,
    index: String,
    /// The newline-delimited JSON file from which to load products
    input: PathBuf,
    #[serde(rename = "batch-size")]
    batch_size: usize,
    #[serde(rename = "page-size")]
    page_size: usize,
}

impl Default for ConfigV1 {
    fn default() -> Self {
        ConfigV1 {
            location: DynamoLocation::default(),
            credentials: None,
            table: "ProductTable".to_owned(),
            index: "GSI1".to_owned(),
            input: PathBuf::from("data.jsonl"),
            batch_size: MAX_BATCH_SIZE,
            page_size: MAX_PAGE_SIZE,
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "version")] // tag "internally"
enum Configuration {
    #[serde(rename = "1")]
    V1(ConfigV1),
}

fn default_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| Path::new(&home).join(".cayenne.toml"))
}

/// Parse the cayenne configuration file
///
/// If `cfg` is `None`, fall back to `$HOME/.cayenne.toml`, and to the defaults if *that's* not
/// there.
fn parse_config(cfg: Option<&Path>) -> Result<ConfigV1> {
    let (pth, defaulted) = match cfg {
        Some(p) => (p.to_path_buf(), false),
        None => match default_config_path() {
            Some(p) => (p, true),
            None => return Ok(ConfigV1::default()),
        },
    };
    match std::fs::read_to_string(&pth) {
        Ok(text) => {
            parse_config_text(&text).map_err(|err| ConfigParseSnafu { pth }.into_error(err))
        }
        Err(err) => {
            if defaulted && err.kind() == io::ErrorKind::NotFound {
                Ok(ConfigV1::default())
            } else {
                Err(ConfigNotFoundSnafu { pth }.into_error(err))
            }
        }
    }
}

fn parse_config_text(text: &str) -> std::result::Result<ConfigV1, toml::de::Error> {
    match toml::from_str::<Configuration>(text)? {
        Configuration::V1(cfg) => Ok(cfg),
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            logging                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

fn configure_logging(debug: bool, verbose: bool, quiet: bool, json: bool) -> Result<()> {
    let level = match (debug, verbose, quiet) {
        (true, _, _) => Level::TRACE,
        (false, true, _) => Level::DEBUG,
        (false, false, true) => Level::ERROR,
        _ => Level::INFO,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env()
        .context(EnvFilterSnafu)?;
    let formatter: Box<dyn Layer<Registry> + Send + Sync> = if json {
        Box::new(fmt::Layer::default().json().with_writer(io::stderr))
    } else {
        Box::new(fmt::Layer::default().compact().with_writer(io::stderr))
    };
    tracing::subscriber::set_global_default(Registry::default().with(formatter).with(filter))
        .context(SubscriberSnafu)
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                              main                                              //
////////////////////////////////////////////////////////////////////////////////////////////////////

fn cli() -> Command {
    Command::new("cayenne")
        .version(crate_version!())
        .author(crate_authors!())
        .about("Load, unload & query a DynamoDB catalogue of chili-pepper products")
        .long_about(
            "Load, unload & query a DynamoDB catalogue of chili-pepper products.

With none of --load, --load-batch, --unload, --query or --create-table, list every product in the
catalogue.",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .num_args(1)
                .value_parser(value_parser!(PathBuf))
                .env("CAYENNE_CONFIG")
                .help("path to the configuration file (defaults to $HOME/.cayenne.toml)"),
        )
        .arg(
            Arg::new("debug")
                .short('D')
                .long("debug")
                .num_args(0)
                .action(ArgAction::SetTrue)
                .env("CAYENNE_DEBUG")
                .help("produce debug output"),
        )
        .arg(
            Arg::new("json")
                .short('j')
                .long("json")
                .num_args(0)
                .action(ArgAction::SetTrue)
                .env("CAYENNE_JSON")
                .help("log in JSON/structured format, not human-readable"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .num_args(0)
                .action(ArgAction::SetTrue)
                .env("CAYENNE_QUIET")
                .help("produce only error output"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .num_args(0)
                .action(ArgAction::SetTrue)
                .env("CAYENNE_VERBOSE")
                .help("log each item inserted & each batch written"),
        )
        .arg(
            Arg::new("location")
                .short('l')
                .long("location")
                .num_args(1)
                .value_parser(value_parser!(DynamoLocation))
                .env("CAYENNE_LOCATION")
                .help("Network location of DynamoDB")
                .long_help(
                    "Network location of DynamoDB.

Specify as either an AWS region ('ca-central-1', e.g.) or as one or more comma-separated URLs
('http://localhost:8000', e.g.)",
                ),
        )
        .arg(
            Arg::new("credentials")
                .long("credentials")
                .num_args(1)
                .value_parser(value_parser!(Credentials))
                .env("CAYENNE_CREDENTIALS")
                .help("AWS credentials, as \"key-id,secret\""),
        )
        .arg(
            Arg::new("table")
                .short('t')
                .long("table")
                .num_args(1)
                .env("CAYENNE_TABLE")
                .help("DynamoDB table name (defaults to ProductTable)"),
        )
        .arg(
            Arg::new("index")
                .long("index")
                .num_args(1)
                .env("CAYENNE_INDEX")
                .help("name of the category index (defaults to GSI1)"),
        )
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .num_args(1)
                .value_parser(value_parser!(PathBuf))
                .env("CAYENNE_INPUT")
                .help("newline-delimited JSON file to load (defaults to data.jsonl)"),
        )
        .arg(
            Arg::new("batch-size")
                .long("batch-size")
                .num_args(1)
                .value_parser(value_parser!(usize))
                .env("CAYENNE_BATCH_SIZE")
                .help("items per BatchWriteItem call when loading in batches (at most 25)"),
        )
        .arg(
            Arg::new("page-size")
                .long("page-size")
                .num_args(1)
                .value_parser(value_parser!(usize))
                .env("CAYENNE_PAGE_SIZE")
                .help("items per scan page when unloading (at most 25)"),
        )
        .arg(
            Arg::new("load")
                .long("load")
                .num_args(0)
                .action(ArgAction::SetTrue)
                .help("load products, one transaction per product"),
        )
        .arg(
            Arg::new("load-batch")
                .long("load-batch")
                .alias("loadbatch")
                .num_args(0)
                .action(ArgAction::SetTrue)
                .help("load products in batches"),
        )
        .arg(
            Arg::new("unload")
                .long("unload")
                .num_args(0)
                .action(ArgAction::SetTrue)
                .help("remove everything from the table"),
        )
        .arg(
            Arg::new("query")
                .long("query")
                .num_args(1)
                .help("list the products whose names contain this text (case-insensitively)"),
        )
        .arg(
            Arg::new("create-table")
                .long("create-table")
                .num_args(0)
                .action(ArgAction::SetTrue)
                .help("create the table & its category index"),
        )
        .group(
            ArgGroup::new("action")
                .args(["load", "load-batch", "unload", "query", "create-table"])
                .multiple(false),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut matches = cli().get_matches();

    configure_logging(
        matches.get_flag("debug"),
        matches.get_flag("verbose"),
        matches.get_flag("quiet"),
        matches.get_flag("json"),
    )?;

    info!("cayenne {}", crate_version!());

    let cfg = parse_config(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;
    let location = matches
        .remove_one::<DynamoLocation>("location")
        .unwrap_or(cfg.location);
    let credentials = matches
        .remove_one::<Credentials>("credentials")
        .or(cfg.credentials)
        .map(|Credentials(pair)| pair);
    let table = matches.remove_one::<String>("table").unwrap_or(cfg.table);
    let index = matches.remove_one::<String>("index").unwrap_or(cfg.index);
    let input = matches.remove_one::<PathBuf>("input").unwrap_or(cfg.input);
    let batch_size = check_batch_size(
        matches
            .remove_one::<usize>("batch-size")
            .unwrap_or(cfg.batch_size),
    )
    .context(BatchSizeSnafu)?;
    let page_size = check_page_size(
        matches
            .remove_one::<usize>("page-size")
            .unwrap_or(cfg.page_size),
    )
    .context(PageSizeSnafu)?;

    let client = Client::new(&location.0, &credentials, &table, &index)
        .await
        .context(ClientSnafu)?;

    if matches.get_flag("create-table") {
        client.create_table().await.context(CreateTableSnafu)?;
        println!("Created table {table} with index {index}");
    } else if matches.get_flag("load") {
        let records = source::open(&input).context(InputSnafu)?;
        let summary = load_transactional(&client, records)
            .await
            .context(LoadSnafu)?;
        info!("{summary}");
        println!("Data loaded successfully");
    } else if matches.get_flag("load-batch") {
        let records = source::open(&input).context(InputSnafu)?;
        let summary = load_batched(&client, records, batch_size)
            .await
            .context(LoadSnafu)?;
        info!("{summary}");
        println!("Data loaded successfully. Total items: {}", summary.submitted);
    } else if matches.get_flag("unload") {
        let summary = unload(&client, page_size).await.context(UnloadSnafu)?;
        info!(
            "{} pages, {} failed, {} unprocessed; counter reset: {}",
            summary.pages, summary.failed_pages, summary.unprocessed, summary.counter_reset
        );
        println!(
            "All data removed from the table. Total items deleted: {}",
            summary.deleted
        );
    } else {
        let needle = matches.remove_one::<String>("query");
        let report = query(&client, needle.as_deref())
            .await
            .context(QuerySnafu)?;
        print!("{report}");
    }

    Ok(())
}
