//! A multi-protocol exchange workflow engine for the delivery and
//! collection of W3C Verifiable Credentials and Presentations.
//!
//! A tenant configures a [workflow](crate::workflow::WorkflowConfig) — an
//! ordered graph of steps plus credential templates — and creates
//! [exchanges](crate::exchange::Exchange) from it. Heterogeneous wallets
//! then drive the *same* exchange to completion over whichever protocol
//! they speak:
//!
//! * [VC-API](crate::vcapi) — `POST` the exchange URL: receive a
//!   Verifiable Presentation Request, submit a presentation, receive
//!   issued credentials.
//! * [OpenID4VCI](crate::oid4vci) — credential offers, the token, nonce,
//!   credential and batch endpoints, rooted at the exchange.
//! * [OpenID4VP](crate::oid4vp) — authorization requests (plain or signed
//!   JAR) and `direct_post`(`.jwt`) responses.
//! * [invite-request](crate::invite) — a minimal callback recording an
//!   invited party's URL.
//!
//! All state lives in the exchange record; every mutation flows through
//! the [engine](crate::exchange::engine), which enforces step ordering,
//! at-most-once completion, TTL expiry and optimistic concurrency.
//! External collaborators — stores, the issuer, verifier and
//! challenge-creation services (invoked via delegated authorization
//! capabilities), JOSE operations and the clock — are supplied through
//! the [`provider`] traits.
//!
//! Handlers follow the `endpoint::handle` pattern and are designed to sit
//! behind a thin HTTP wrapper such as axum:
//!
//! ```rust,ignore
//! async fn post_exchange(
//!     State(provider): State<ProviderImpl>, OriginalUri(uri): OriginalUri,
//!     Json(body): Json<ExchangeSubmission>,
//! ) -> impl IntoResponse {
//!     endpoint::handle(&uri.to_string(), body, &provider).await.into()
//! }
//! ```
//!
//! # Feature Flags
//!
//! * `oid4vci` (default) — the OpenID4VCI adapter.
//! * `oid4vp` (default) — the OpenID4VP adapter.

pub mod core;
pub mod endpoint;
pub mod error;
pub mod exchange;
pub mod invite;
pub mod issuer;
pub mod provider;
pub mod step;
pub mod template;
pub mod vcapi;
pub mod verifier;
pub mod w3c_vc;
pub mod workflow;

#[cfg(feature = "oid4vci")]
pub mod oid4vci;

#[cfg(feature = "oid4vp")]
pub mod oid4vp;

pub use crate::core::{Kind, OneMany};
pub use crate::error::{Error, LastError, Result};
