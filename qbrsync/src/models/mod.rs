//! Domain records produced by the source clients.
//!
//! Raw service payloads are parsed into these types once, at the client boundary. Everything
//! downstream (row mapping, sheet writing) only sees these.

pub mod alerts;
pub mod sensors;
pub mod tickets;

pub use alerts::Alert;
pub use sensors::Sensor;
pub use tickets::Ticket;
