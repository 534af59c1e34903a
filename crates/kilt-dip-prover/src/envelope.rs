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

//! The proof submitted to the consumer's `DipConsumer::dispatch_as`, and the
//! call wrapping it.

use std::{fmt, str::FromStr};

use parity_scale_codec::{Decode, Encode, Input, Output};
use scale_info::TypeInfo;
use sp_runtime::traits::Header as _;
use thiserror::Error;

use crate::{
	chain::{BlockNumber, ChainHeader, ChainRole},
	did::{DidIdentifier, DidSignature},
	merkle::{CommitmentProof, DidMerkleProofOf, ProofGenerationError},
	payload::EncodedCall,
	state_proofs::{CommitmentRootProof, RelayHeadProof},
	Error,
};

/// The only proof version this prover assembles.
pub const SUPPORTED_VERSION: u16 = 0;

/// Index of `dispatch_as` within the `DipConsumer` pallet.
pub const DISPATCH_AS_CALL_INDEX: u8 = 0;

/// How the consumer chain relates to the relay chain the provider is
/// anchored on.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RelayTopology {
	/// The consumer is the relay chain itself and knows its own headers.
	#[default]
	Parent,
	/// The consumer is a sibling parachain and needs the relay header
	/// included in the proof.
	Sibling,
}

impl RelayTopology {
	pub fn embeds_relay_header(self) -> bool {
		matches!(self, Self::Sibling)
	}
}

impl fmt::Display for RelayTopology {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Parent => f.write_str("parent"),
			Self::Sibling => f.write_str("sibling"),
		}
	}
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown relay topology `{0}`, expected `parent` or `sibling`")]
pub struct InvalidRelayTopology(String);

impl FromStr for RelayTopology {
	type Err = InvalidRelayTopology;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"parent" => Ok(Self::Parent),
			"sibling" => Ok(Self::Sibling),
			other => Err(InvalidRelayTopology(other.to_owned())),
		}
	}
}

/// The state proof for the provider head, together with the relay block it
/// verifies against.
#[derive(Clone, Debug, Decode, Encode, Eq, PartialEq, TypeInfo)]
pub struct ProviderHeadStateProof<RelayBlockNumber> {
	pub relay_block_number: RelayBlockNumber,
	pub proof: Vec<Vec<u8>>,
}

/// The state proof for the identity commitment of the subject.
#[derive(Clone, Debug, Decode, Encode, Eq, PartialEq, TypeInfo)]
pub struct DipCommitmentStateProof(pub Vec<Vec<u8>>);

/// The DID signature over the consumer payload, with the consumer block it
/// was produced for.
#[derive(Clone, Debug, Decode, Encode, Eq, PartialEq, TypeInfo)]
pub struct TimeBoundDidSignature<BlockNumber> {
	pub signature: DidSignature,
	pub block_number: BlockNumber,
}

/// Version 0 of the DIP proof.
///
/// The relay header is only present for [`RelayTopology::Sibling`]. It is
/// encoded without an option tag, so decoding needs to know the topology.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DipDidProof<RelayBlockNumber: BlockNumber, ProviderBlockNumber, ConsumerBlockNumber> {
	pub relay_header: Option<ChainHeader<RelayBlockNumber>>,
	pub provider_head_proof: ProviderHeadStateProof<RelayBlockNumber>,
	pub dip_commitment_proof: DipCommitmentStateProof,
	pub dip_proof: DidMerkleProofOf<ProviderBlockNumber>,
	pub signature: TimeBoundDidSignature<ConsumerBlockNumber>,
}

impl<RelayBlockNumber, ProviderBlockNumber, ConsumerBlockNumber> Encode
	for DipDidProof<RelayBlockNumber, ProviderBlockNumber, ConsumerBlockNumber>
where
	RelayBlockNumber: BlockNumber,
	ProviderBlockNumber: Encode,
	ConsumerBlockNumber: Encode,
{
	fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
		if let Some(relay_header) = &self.relay_header {
			relay_header.encode_to(dest);
		}
		self.provider_head_proof.encode_to(dest);
		self.dip_commitment_proof.encode_to(dest);
		self.dip_proof.encode_to(dest);
		self.signature.encode_to(dest);
	}
}

impl<RelayBlockNumber, ProviderBlockNumber, ConsumerBlockNumber>
	DipDidProof<RelayBlockNumber, ProviderBlockNumber, ConsumerBlockNumber>
where
	RelayBlockNumber: BlockNumber,
	ProviderBlockNumber: Decode,
	ConsumerBlockNumber: Decode,
{
	pub fn decode_for<I: Input>(topology: RelayTopology, input: &mut I) -> Result<Self, parity_scale_codec::Error> {
		let relay_header = if topology.embeds_relay_header() {
			Some(ChainHeader::<RelayBlockNumber>::decode(input)?)
		} else {
			None
		};
		Ok(Self {
			relay_header,
			provider_head_proof: Decode::decode(input)?,
			dip_commitment_proof: Decode::decode(input)?,
			dip_proof: Decode::decode(input)?,
			signature: Decode::decode(input)?,
		})
	}
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VersionedDipDidProof<RelayBlockNumber: BlockNumber, ProviderBlockNumber, ConsumerBlockNumber> {
	V0(DipDidProof<RelayBlockNumber, ProviderBlockNumber, ConsumerBlockNumber>),
}

impl<RelayBlockNumber, ProviderBlockNumber, ConsumerBlockNumber> Encode
	for VersionedDipDidProof<RelayBlockNumber, ProviderBlockNumber, ConsumerBlockNumber>
where
	RelayBlockNumber: BlockNumber,
	ProviderBlockNumber: Encode,
	ConsumerBlockNumber: Encode,
{
	fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
		match self {
			Self::V0(proof) => {
				dest.push_byte(0);
				proof.encode_to(dest);
			}
		}
	}
}

impl<RelayBlockNumber, ProviderBlockNumber, ConsumerBlockNumber>
	VersionedDipDidProof<RelayBlockNumber, ProviderBlockNumber, ConsumerBlockNumber>
where
	RelayBlockNumber: BlockNumber,
	ProviderBlockNumber: Decode,
	ConsumerBlockNumber: Decode,
{
	pub fn decode_for<I: Input>(topology: RelayTopology, input: &mut I) -> Result<Self, parity_scale_codec::Error> {
		match input.read_byte()? {
			0 => Ok(Self::V0(DipDidProof::decode_for(topology, input)?)),
			_ => Err("unknown DIP proof version".into()),
		}
	}

	pub fn version(&self) -> u16 {
		match self {
			Self::V0(_) => 0,
		}
	}
}

/// Fails unless `requested` is a version this prover assembles and the
/// consumer verifies.
pub fn check_version(requested: u16, expected: u16) -> Result<(), Error> {
	if requested != expected {
		return Err(Error::VersionMismatch { requested, expected });
	}
	if requested != SUPPORTED_VERSION {
		return Err(Error::VersionMismatch {
			requested,
			expected: SUPPORTED_VERSION,
		});
	}
	Ok(())
}

/// A part of the proof subject to a size limit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProofComponent {
	ProviderHeadProof,
	CommitmentProof,
	DidMerkleProof,
	RevealedLeaves,
}

impl fmt::Display for ProofComponent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::ProviderHeadProof => "provider head proof",
			Self::CommitmentProof => "commitment proof",
			Self::DidMerkleProof => "DID Merkle proof",
			Self::RevealedLeaves => "revealed leaves",
		};
		f.write_str(name)
	}
}

/// The bounds the consumer verifier puts on a proof.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ProofLimits {
	pub max_proof_nodes: usize,
	pub max_proof_node_size: usize,
	pub max_revealed_leaves: usize,
}

impl Default for ProofLimits {
	fn default() -> Self {
		Self {
			max_proof_nodes: 128,
			max_proof_node_size: 1024,
			max_revealed_leaves: 128,
		}
	}
}

impl ProofLimits {
	fn check_nodes(&self, component: ProofComponent, nodes: &[Vec<u8>]) -> Result<(), Error> {
		let too_large = |size, limit| Error::ProofTooLarge { component, size, limit };
		if nodes.len() > self.max_proof_nodes {
			return Err(too_large(nodes.len(), self.max_proof_nodes));
		}
		match nodes.iter().map(Vec::len).max() {
			Some(largest) if largest > self.max_proof_node_size => Err(too_large(largest, self.max_proof_node_size)),
			_ => Ok(()),
		}
	}

	pub fn check<RelayBlockNumber: BlockNumber, ProviderBlockNumber, ConsumerBlockNumber>(
		&self,
		proof: &DipDidProof<RelayBlockNumber, ProviderBlockNumber, ConsumerBlockNumber>,
	) -> Result<(), Error> {
		self.check_nodes(ProofComponent::ProviderHeadProof, &proof.provider_head_proof.proof)?;
		self.check_nodes(ProofComponent::CommitmentProof, &proof.dip_commitment_proof.0)?;
		self.check_nodes(ProofComponent::DidMerkleProof, &proof.dip_proof.blinded)?;
		let revealed = proof.dip_proof.revealed.len();
		if revealed > self.max_revealed_leaves {
			return Err(Error::ProofTooLarge {
				component: ProofComponent::RevealedLeaves,
				size: revealed,
				limit: self.max_revealed_leaves,
			});
		}
		Ok(())
	}
}

/// Everything needed to call `DipConsumer::dispatch_as` on the consumer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DipEnvelope<RelayBlockNumber: BlockNumber, ProviderBlockNumber, ConsumerBlockNumber> {
	pub topology: RelayTopology,
	pub identifier: DidIdentifier,
	pub proof: VersionedDipDidProof<RelayBlockNumber, ProviderBlockNumber, ConsumerBlockNumber>,
	pub call: EncodedCall,
}

impl<RelayBlockNumber, ProviderBlockNumber, ConsumerBlockNumber>
	DipEnvelope<RelayBlockNumber, ProviderBlockNumber, ConsumerBlockNumber>
where
	RelayBlockNumber: BlockNumber,
	ProviderBlockNumber: BlockNumber,
	ConsumerBlockNumber: BlockNumber,
{
	/// Puts the collected proofs together. Fails if the parts were not
	/// generated for the same version and provider block, or if the result
	/// exceeds `limits`.
	#[allow(clippy::too_many_arguments)]
	pub fn assemble(
		topology: RelayTopology,
		identifier: DidIdentifier,
		relay_head: RelayHeadProof<RelayBlockNumber, ProviderBlockNumber>,
		commitment: CommitmentRootProof<ProviderBlockNumber>,
		merkle: CommitmentProof<ProviderBlockNumber>,
		signature: TimeBoundDidSignature<ConsumerBlockNumber>,
		call: EncodedCall,
		limits: &ProofLimits,
	) -> Result<Self, Error> {
		check_version(merkle.version, SUPPORTED_VERSION)?;
		if commitment.proof.at != merkle.at {
			return Err(Error::ProofGenerationFailed {
				version: merkle.version,
				at: merkle.at.hash,
				reason: ProofGenerationError::AnchorMismatch {
					commitment: commitment.proof.at.hash,
					proof: merkle.at.hash,
				},
			});
		}
		if !relay_head.proves(&merkle.at) {
			return Err(Error::AnchorUnavailable {
				chain: ChainRole::Relay,
				reason: format!(
					"relay block #{} records provider head #{} ({:?}), not the proven block #{} ({:?})",
					relay_head.proof.at.number,
					relay_head.provider_header.number,
					relay_head.provider_header.hash(),
					merkle.at.number,
					merkle.at.hash
				),
			});
		}
		merkle.ensure_root(commitment.root)?;

		let relay_block_number = relay_head.proof.at.number;
		let proof = DipDidProof {
			relay_header: topology.embeds_relay_header().then_some(relay_head.relay_header),
			provider_head_proof: ProviderHeadStateProof {
				relay_block_number,
				proof: relay_head.proof.nodes,
			},
			dip_commitment_proof: DipCommitmentStateProof(commitment.proof.nodes),
			dip_proof: merkle.proof,
			signature,
		};
		limits.check(&proof)?;

		Ok(Self {
			topology,
			identifier,
			proof: VersionedDipDidProof::V0(proof),
			call,
		})
	}

	/// The SCALE encoding of `dispatch_as(identifier, proof, call)` on the
	/// consumer pallet at `pallet_index`.
	pub fn dispatch_as_call(&self, pallet_index: u8) -> Vec<u8> {
		let mut encoded = vec![pallet_index, DISPATCH_AS_CALL_INDEX];
		self.identifier.encode_to(&mut encoded);
		self.proof.encode_to(&mut encoded);
		self.call.encode_to(&mut encoded);
		encoded
	}
}
