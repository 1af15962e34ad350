//! Comparable-property fair-price engine.
//!
//! Source records are reconciled into a [`store::PropertyStore`]; the
//! [`service::ValuationService`] selects comparables, aggregates a weighted
//! median fair price, scores its confidence and labels listings as under-,
//! fairly or over-priced.

pub mod comparables;
pub mod config;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod market;
pub mod policy;
pub mod pricing;
pub mod repository;
pub mod service;
pub mod store;
pub mod telemetry;
