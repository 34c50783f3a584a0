//! # Connections Module
//!
//! This module handles the persistent connection to the real-time service:
//! the background task that owns the WebSocket, its reconnect timer and its
//! keepalive.

/// Connection task: socket lifecycle, reconnects, keepalive and frame routing.
pub mod realtime_ws;
