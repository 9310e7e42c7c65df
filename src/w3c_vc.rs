//! # W3C Verifiable Credentials Data Model
//!
//! Data types for Verifiable Credentials, Verifiable Presentations and
//! Verifiable Presentation Requests as exchanged on the wire. The types are
//! deliberately loose: credentials are produced by tenant-authored templates
//! and verified by an external verifier, so unknown properties must survive a
//! round trip intact.

pub mod jwt;
pub mod vc;
pub mod vp;
pub mod vpr;

/// JSON-LD context for the v1.1 credentials data model.
pub const CONTEXT_V1: &str = "https://www.w3.org/2018/credentials/v1";

/// JSON-LD context for the v2 credentials data model.
pub const CONTEXT_V2: &str = "https://www.w3.org/ns/credentials/v2";

pub use jwt::{VcJwtClaims, enveloped_credential, enveloped_presentation};
pub use vc::{CredentialSubject, VerifiableCredential};
pub use vp::VerifiablePresentation;
pub use vpr::{PresentationRequest, Query};
