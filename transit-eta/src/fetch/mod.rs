//! ETA fetching: transport abstraction, mock payloads, and settle-all
//! batches.

mod error;
mod fetcher;
mod transport;

pub use error::FetchError;
pub use fetcher::{EtaFetcher, Settled};
pub use transport::{HttpTransport, Method, Request, Transport};
