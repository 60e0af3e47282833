//! This crate is split in 2 main modules:
//!
//! - [gateway] (Safaricom Daraja client and callback receiver)
//! - [payment] (payment session, status polling and the headless payment view)
#![doc = include_str!("../README.md")]

pub mod config;
/// M-Pesa gateway integration
///
/// This module defines the types and methods to communicate with the Daraja STK push API.
pub mod gateway;
/// Payment flow on top of the gateway
pub mod payment;
pub mod state;

#[cfg(test)]
mod testing;
