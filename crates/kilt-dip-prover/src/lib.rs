// KILT Blockchain – https://botlabs.org
// Copyright (C) 2019-2024 BOTLabs GmbH

// The KILT Blockchain is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// The KILT Blockchain is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

// If you feel like getting in touch with us, you can do so at info@botlabs.org

//! Off-chain prover for the KILT Decentralized Identity Provider (DIP).
//!
//! Given a call to dispatch on a consumer chain on behalf of a KILT DID, the
//! prover:
//! 1. Picks the DID key the call must be authorized with ([`call`]).
//! 2. Builds and signs the payload the consumer chain verifies the DID
//!    signature against ([`payload`], [`signature`]).
//! 3. Selects a consistent set of finalized blocks on the relay and provider
//!    chains ([`anchor`]) and collects the state proofs anchored to them
//!    ([`state_proofs`], [`merkle`]).
//! 4. Assembles everything into the versioned proof expected by the
//!    consumer's `DipConsumer::dispatch_as` extrinsic ([`envelope`]).
//!
//! [`prover::DipProver`] orchestrates the steps against three
//! [`chain::ChainClient`]s and a [`signature::DidSigner`].

pub mod anchor;
pub mod call;
pub mod chain;
pub mod did;
pub mod envelope;
pub mod error;
pub mod merkle;
pub mod payload;
pub mod prover;
pub mod retry;
pub mod signature;
pub mod state_proofs;
pub mod storage;

#[cfg(test)]
mod mock;

pub use error::{Error, ErrorKind, UNCLASSIFIED_EXIT_CODE};
pub use prover::{DipProver, DipRequest, ProverConfig};

/// The concrete types of the three chains a proof is generated for.
///
/// Block numbers are compact-encoded inside headers but fixed-width inside
/// the signature payload and the proof, so they must match what the
/// respective runtimes use.
pub trait DipRuntimeTypes: Send + Sync + 'static {
	type RelayBlockNumber: chain::BlockNumber;
	type ProviderBlockNumber: chain::BlockNumber;
	type ConsumerBlockNumber: chain::BlockNumber;
	/// The consumer's `LocalIdentityInfo` stored for each DID.
	type IdentityDetails: parity_scale_codec::FullCodec + core::fmt::Debug + Clone + Send + Sync + 'static;
	/// Error of the provider's `DipProvider_generate_proof` runtime API.
	type ProofError: parity_scale_codec::Decode + Into<merkle::ProviderProofError> + Send + Sync + 'static;
}

/// The DIP template chains, which use `u32` block numbers everywhere.
pub struct TemplateRuntimeTypes;

impl DipRuntimeTypes for TemplateRuntimeTypes {
	type RelayBlockNumber = u32;
	type ProviderBlockNumber = u32;
	type ConsumerBlockNumber = u32;
	type IdentityDetails = u128;
	type ProofError = merkle::TemplateDipProofError;
}

/// Peregrine/Spiritnet as provider, with a consumer using `u64` block numbers.
pub struct KiltRuntimeTypes;

impl DipRuntimeTypes for KiltRuntimeTypes {
	type RelayBlockNumber = u32;
	type ProviderBlockNumber = u64;
	type ConsumerBlockNumber = u64;
	type IdentityDetails = u128;
	type ProofError = merkle::DipProofError;
}
