pub mod envelope;
pub mod payload;
