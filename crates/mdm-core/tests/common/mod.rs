//! Shared helpers for integration tests: scripted fetchers and a minimal
//! HTTP server for the remote protocol.

#![allow(dead_code)]

pub mod fetchers;
pub mod tiny_server;
