//! Application layer: the stateful controllers behind the receive and send screens.
//!
//! `TokenLifecycleManager` owns the current payment token and its regeneration,
//! `ExpiryWatch` drives it from a timer, `ChannelDispatcher` runs the send-money
//! form and `TokenVerifier` checks codes on the scanning side. Each talks to the
//! outside world only through the ports in `crate::domain::ports`.

pub mod dispatcher;
pub mod draft;
pub mod expiry_watch;
pub mod token_lifecycle;
pub mod verification;
