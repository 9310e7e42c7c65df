//! # VC-API Adapter
//!
//! The [VC-API exchange protocol](https://w3c-ccg.github.io/vc-api/): a
//! single exchange URL that returns a Verifiable Presentation Request on an
//! empty `POST`, accepts a Verifiable Presentation, and returns a
//! presentation wrapping any issued credentials. The module also carries
//! the exchange lifecycle endpoints: creation, the authorized exchange
//! view, and the protocols map.

mod create;
mod get;
mod participate;
mod protocols;

pub use create::{CreateExchangeRequest, CreateExchangeResponse};
pub use get::{ExchangeView, GetExchangeRequest};
pub use participate::{ExchangeResponse, ExchangeSubmission};
pub use protocols::{ProtocolsRequest, ProtocolsResponse};
