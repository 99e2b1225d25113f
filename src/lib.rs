//! Signal Fusion Engine Library
//!
//! Picks a bounded set of entities per cycle, fuses fundamental, technical,
//! event, momentum, earnings and order-announcement evidence into one
//! composite decision per entity, and gates it against portfolio heat.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod rate_limit;
