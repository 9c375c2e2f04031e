//! Shared-store backends for the `camara-auth` primitives.
//!
//! A gateway running more than one instance can not keep client records or
//! revocation marks in process memory: every instance has to see a client
//! deactivation or a token revocation immediately. This crate implements the
//! `Registrar` and `Revocation` seams of the core crate on top of redis,
//! with client rows stored as json strings and revocation marks as plain
//! keys whose expiry redis manages itself.
#[macro_use]
extern crate serde_derive;

pub mod db_service;
pub mod primitives;

#[cfg(test)]
fn redis_url_for_tests() -> Option<String> {
    // Pointing this at an instance, e.g. redis://localhost/3, runs the
    // store-backed tests. They create and overwrite keys in that database.
    std::env::var("CAMARA_AUTH_TEST_REDIS").ok()
}
