pub mod pairing;
pub mod registration;

pub use pairing::{Paired, PairingEngine, PairingError};
pub use registration::{Registered, Registration, RegistrationError};
