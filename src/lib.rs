//! Storefront - payment and order reconciliation backend for a digital
//! downloads shop.
//!
//! This library provides the core functionality: cart and checkout flows,
//! order lifecycle with gateway reconciliation (PayPal, MercadoPago),
//! license granting, donations, and the webhook handlers that tie payment
//! notifications back to local state.

pub mod cart;
pub mod checkout;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod licenses;
pub mod models;
pub mod orders;
pub mod payments;
pub mod util;
