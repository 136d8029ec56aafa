//! Wire transports: stdio for local agents, HTTP (SSE and streamable) for
//! containers.

pub mod forwarded;
pub mod http;
pub mod stdio;
