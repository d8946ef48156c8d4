//! Wire types for the upstream realtime protocol.
//!
//! Known events and items are strongly typed; anything the bridge does not
//! model survives as raw JSON so it can still be mirrored to the frontend.

pub mod client_events;
pub mod models;
pub mod server_events;
