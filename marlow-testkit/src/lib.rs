//! Marlow Test Kit
//!
//! Shared fixtures for the scenario and integration tests: reference-data
//! seeding, fill builders and common value shortcuts.

#![warn(clippy::all)]

pub mod helpers;

pub use helpers::{
    date, equity, equity_in, fill, order, price, qty, seed_reference_data,
};
