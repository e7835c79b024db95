//! Retry policies
//!
//! A [`RetryPolicy`] is a static, serializable description of how hard a
//! connector should try before giving up. It is compiled lazily, at call time,
//! into a [`Retrying`] executor using the connector's retryable failure kinds
//! and log scope.
//!
//! # Features
//!
//! - **Attempt bound**: stop after `max_attempts` calls
//! - **Time bound**: stop once `max_delay` seconds have elapsed
//! - **Fixed backoff**: sleep `wait_time` seconds between attempts
//! - **Kind filtering**: only retry failures whose kind is declared retryable

mod policy;

pub use policy::{RetryPolicy, Retrying, StopCondition};
