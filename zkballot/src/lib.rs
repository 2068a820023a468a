//! Anonymous voting with Merkle eligibility proofs and nullifiers.
//!
//! Voters prove they belong to an election's eligibility tree without saying
//! which leaf they are, and publish a nullifier that makes a second vote with
//! the same credential detectable. The [`Registry`] is the authoritative
//! election state machine; everything a voter does happens client-side through
//! [`issue_credentials`], [`EligibilityTree::prove_membership`] and
//! [`prepare_ballot`].

#[macro_use]
extern crate serde;

#[macro_use]
extern crate log;

#[macro_use]
extern crate lazy_static;

mod auth;
mod ballot;
mod config;
mod credential;
mod ecies;
mod election;
mod error;
mod events;
mod field;
mod merkle;
mod proof;
mod registry;
mod serde_hex;
mod store;
mod tally;
mod util;

pub use auth::*;
pub use ballot::*;
pub use config::*;
pub use credential::*;
pub use ecies::*;
pub use election::*;
pub use error::*;
pub use events::*;
pub use field::*;
pub use merkle::*;
pub use proof::*;
pub use registry::*;
pub use serde_hex::*;
pub use store::*;
pub use tally::*;
pub use util::*;

#[cfg(test)]
mod tests;
