//! Domain layer: value objects for tokens and transfers, plus the ports the
//! application layer drives (`PaymentGateway`, `Clock`).

pub mod money;
pub mod ports;
pub mod token;
pub mod transfer;
