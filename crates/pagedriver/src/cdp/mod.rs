// Copyright 2026 Paul Adamson
// Licensed under the Apache License, Version 2.0
//
// Transport/protocol client for the browser's remote-debugging endpoint.
//
// This layer has no knowledge of pages. It owns one persistent WebSocket
// connection and translates outbound calls into correlated request/response
// pairs and inbound notifications into a pub/sub event interface.

pub mod connection;
pub mod transport;

pub use connection::{CdpConnection, EventSubscription};
pub use transport::WebSocketTransport;
