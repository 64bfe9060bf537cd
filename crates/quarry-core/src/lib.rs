//! # quarry-core
//!
//! Rule-aware, cross-dialect command building and result materialization.
//!
//! This crate provides:
//! - A metadata cache resolving tables, views, stored procedures and
//!   table-valued functions through a pluggable [`Catalog`](metadata::Catalog)
//! - An audit rule engine that stamps values, restricts columns, validates
//!   arguments and turns deletes into soft deletes
//! - A SQL builder that classifies every column once and lets each dialect
//!   assemble parameterized statements
//! - Reflective and compiled materializers turning row cursors into records
//! - An execution chain with caching, tracing and cancellation
//!
//! ## Building commands
//!
//! Commands take records, string-keyed maps, filter objects or raw where
//! text, and never inline values into the SQL:
//!
//! ```rust
//! use quarry_core::builder::{ArgumentMap, ArgumentSource, CommandContext, FilterOptions, SelectCommand};
//! use quarry_core::dialect::SqlServerDialect;
//! use quarry_core::metadata::{ColumnMetadata, ObjectName, TableOrViewMetadata};
//! use quarry_core::rules::RuleContext;
//! use quarry_core::value::SqlType;
//!
//! let table = TableOrViewMetadata::new(
//!     ObjectName::new("users"),
//!     true,
//!     vec![
//!         ColumnMetadata::new("id", SqlType::BigInt).primary_key(),
//!         ColumnMetadata::new("name", SqlType::Text),
//!     ],
//! )
//! .unwrap();
//!
//! let dialect = SqlServerDialect::new();
//! let rules = RuleContext::default();
//! let context = CommandContext::new(&dialect, &rules);
//! let user_input = "'; DROP TABLE users; --";
//! let token = SelectCommand::new()
//!     .with_criteria(ArgumentSource::filter(
//!         ArgumentMap::new().with("name", user_input),
//!         FilterOptions::default(),
//!     ))
//!     .build(&context, &table)
//!     .unwrap();
//!
//! assert_eq!(
//!     token.command_text(),
//!     "SELECT [id], [name] FROM [users] WHERE ([name] = @name)"
//! );
//! ```

extern crate self as quarry_core;

pub mod builder;
pub mod command;
pub mod config;
pub mod data_source;
pub mod descriptor;
pub mod dialect;
pub mod error;
pub mod execution;
pub mod materializer;
pub mod metadata;
pub mod rules;
pub mod value;

pub use command::{CommandExecutionToken, CommandKind, Parameter};
pub use config::Settings;
pub use data_source::{Command, DataSource, Operation, Pending};
pub use descriptor::{PropertyDescriptor, PropertyType, Record, RecordAccess, TypeDescriptor};
pub use error::{Error, Result};
pub use value::{FieldType, FromSqlValue, SqlType, SqlValue, ToSqlValue};
