//! Minimal client for the Financial Modeling Prep REST API.
//!
//! [`Endpoint`] renders the query string for each resource, [`Client`]
//! turns it into a URL with the API key and returns the parsed JSON body.

mod client;
mod endpoint;
mod errors;
pub mod types;

pub use self::client::{Client, DEFAULT_BASE_URL};
pub use self::endpoint::{Endpoint, StockIndex, DEFAULT_MARKET_CAP_LIMIT};
pub use self::errors::Error;
