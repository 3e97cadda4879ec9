//! Wire formats: the gateway's JSON envelope and the scannable payload.

pub mod json;
