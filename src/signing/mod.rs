//! Cosign-style signature verification and policy evaluation.
//!
//! [`verifier::SignatureVerifier`] retrieves the signature artifact for an
//! image from the destination registry's sibling-tag convention, verifies
//! each signature against its certificate chain (or a configured public
//! key), and optionally verifies the accompanying Rekor transparency-log
//! entry. [`policy::PolicyEngine`] then evaluates the verified set against
//! a [`policy::Policy`].

pub mod cert;
pub mod intoto;
pub mod policy;
pub mod rekor;
pub mod verifier;

pub use policy::{EnforcementMode, Policy, PolicyEngine, PolicyEvaluation, SignerRule};
pub use rekor::RekorClient;
pub use verifier::{SignatureVerifier, VerifiedSignature};
