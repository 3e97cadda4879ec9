//! Adapters behind the domain ports: the REST gateway, an in-process gateway
//! and clocks.

pub mod clock;
pub mod http;
pub mod in_memory;
