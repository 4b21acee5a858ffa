//! Test fixtures: catalogs and a seeded in-memory database used by
//! the integration suites.

pub mod catalog;
pub mod fixture;

pub use catalog::{cyclic_catalog, publishing_catalog};
pub use fixture::{Seeded, TestDb};
