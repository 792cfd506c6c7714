//! GCS2 call layer: the part of the server that talks to PI controllers.

pub mod device;
pub mod errors;
pub mod protocol;
pub mod transport;

pub use device::GcsDevice;
pub use errors::{GcsError, GcsResult, PiErrorCode};
pub use transport::{Connection, GcsTransport, StreamTransport, DEFAULT_BAUD, DEFAULT_PORT};
