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

//! Storage proofs of the parachain head on the relay chain and of the
//! identity commitment on the provider chain.
//!
//! Both proofs are checked locally before they are handed out, the same way
//! the consumer runtime will check them.

use parity_scale_codec::Decode;
use sp_core::{storage::StorageKey, H256};
use sp_runtime::traits::{BlakeTwo256, Header as _};

use crate::{
	anchor::{header_at, ChainAnchor},
	chain::{BlockNumber, ChainClient, ChainHeader, ChainRole},
	did::DidIdentifier,
	merkle::ProofGenerationError,
	retry::RetryPolicy,
	storage, Error,
};

const LOG_TARGET: &str = "dip::prover::proofs";

/// Raw trie nodes proving `keys` at the anchored block.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StorageProof<BlockNumber> {
	pub keys: Vec<StorageKey>,
	pub nodes: Vec<Vec<u8>>,
	pub at: ChainAnchor<BlockNumber>,
}

/// Proof of the provider head stored on the relay chain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RelayHeadProof<RelayBlockNumber, ProviderBlockNumber> {
	pub proof: StorageProof<RelayBlockNumber>,
	/// The relay header the proof verifies against.
	pub relay_header: ChainHeader<RelayBlockNumber>,
	/// The provider head the proof reveals.
	pub provider_header: ChainHeader<ProviderBlockNumber>,
}

impl<RelayBlockNumber, ProviderBlockNumber> RelayHeadProof<RelayBlockNumber, ProviderBlockNumber>
where
	ProviderBlockNumber: BlockNumber,
{
	/// Whether the proven provider head is the given block. If not, the relay
	/// and provider anchors do not belong together.
	pub fn proves(&self, provider_block: &ChainAnchor<ProviderBlockNumber>) -> bool {
		self.provider_header.number == provider_block.number && self.provider_header.hash() == provider_block.hash
	}
}

/// Proof of the identity commitment stored on the provider chain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommitmentRootProof<BlockNumber> {
	pub proof: StorageProof<BlockNumber>,
	/// The DID Merkle root the proof reveals.
	pub root: H256,
}

/// Proves `Paras::Heads(para_id)` at the relay anchor.
pub async fn relay_head_proof<R, ProviderBlockNumber>(
	relay: &R,
	at: &ChainAnchor<R::BlockNumber>,
	para_id: u32,
	retry: &RetryPolicy,
) -> Result<RelayHeadProof<R::BlockNumber, ProviderBlockNumber>, Error>
where
	R: ChainClient,
	ProviderBlockNumber: BlockNumber,
{
	let key = storage::parachain_head(para_id);
	let (relay_header, proof) = futures::try_join!(
		header_at(relay, ChainRole::Relay, at.hash, retry),
		fetch_proof(relay, ChainRole::Relay, at, key, retry),
	)?;

	let head_data = verify_read_proof(ChainRole::Relay, at.hash, relay_header.state_root, &proof)?.ok_or_else(
		|| Error::AnchorUnavailable {
			chain: ChainRole::Relay,
			reason: format!("no head of parachain {para_id} at relay block {}", at.number),
		},
	)?;
	let provider_header = decode_head_data::<ProviderBlockNumber>(&head_data).map_err(|e| Error::InvalidStateProof {
		chain: ChainRole::Relay,
		at: at.hash,
		reason: format!("undecodable head of parachain {para_id}: {e}"),
	})?;
	log::debug!(
		target: LOG_TARGET,
		"Relay block #{} records provider head #{} ({:?})",
		at.number,
		provider_header.number,
		provider_header.hash()
	);

	Ok(RelayHeadProof {
		proof,
		relay_header,
		provider_header,
	})
}

/// Proves `DipProvider::IdentityCommitments(identifier, version)` at the
/// commitment anchor.
pub async fn commitment_root_proof<P: ChainClient>(
	provider: &P,
	at: &ChainAnchor<P::BlockNumber>,
	identifier: &DidIdentifier,
	version: u16,
	retry: &RetryPolicy,
) -> Result<CommitmentRootProof<P::BlockNumber>, Error> {
	let key = storage::identity_commitment(identifier, version);
	let (provider_header, proof) = futures::try_join!(
		header_at(provider, ChainRole::Provider, at.hash, retry),
		fetch_proof(provider, ChainRole::Provider, at, key, retry),
	)?;

	let commitment = verify_read_proof(ChainRole::Provider, at.hash, provider_header.state_root, &proof)?.ok_or(
		Error::ProofGenerationFailed {
			version,
			at: at.hash,
			reason: ProofGenerationError::CommitmentNotFound,
		},
	)?;
	let root = H256::decode(&mut commitment.as_slice()).map_err(|e| Error::InvalidStateProof {
		chain: ChainRole::Provider,
		at: at.hash,
		reason: format!("undecodable identity commitment: {e}"),
	})?;
	log::debug!(
		target: LOG_TARGET,
		"Identity commitment v{version} at provider block #{} is {root:?}",
		at.number
	);

	Ok(CommitmentRootProof { proof, root })
}

async fn fetch_proof<C: ChainClient>(
	client: &C,
	chain: ChainRole,
	at: &ChainAnchor<C::BlockNumber>,
	key: StorageKey,
	retry: &RetryPolicy,
) -> Result<StorageProof<C::BlockNumber>, Error> {
	let keys = vec![key];
	let read_proof = retry
		.run(chain, "read proof", || client.read_proof(&keys, at.hash))
		.await?;
	log::trace!(
		target: LOG_TARGET,
		"{} trie nodes for {chain} key 0x{} at {:?}",
		read_proof.proof.len(),
		hex::encode(&keys[0].0),
		at.hash
	);
	Ok(StorageProof {
		keys,
		nodes: read_proof.proof,
		at: *at,
	})
}

/// Reads the single proven key from `proof`, failing if the proof does not
/// verify against `state_root`.
pub(crate) fn verify_read_proof<N>(
	chain: ChainRole,
	at: H256,
	state_root: H256,
	proof: &StorageProof<N>,
) -> Result<Option<Vec<u8>>, Error> {
	let invalid = |reason: String| Error::InvalidStateProof { chain, at, reason };
	let key = proof
		.keys
		.first()
		.ok_or_else(|| invalid("proof for no key".into()))?;
	let mut values = sp_state_machine::read_proof_check::<BlakeTwo256, _>(
		state_root,
		sp_trie::StorageProof::new(proof.nodes.iter().cloned()),
		[&key.0],
	)
	.map_err(|e| invalid(e.to_string()))?;
	Ok(values.remove(&key.0).flatten())
}

// Heads are stored as `HeadData`, a byte vector wrapping the encoded header.
fn decode_head_data<N: BlockNumber>(head_data: &[u8]) -> Result<ChainHeader<N>, parity_scale_codec::Error> {
	let encoded_header = Vec::<u8>::decode(&mut &head_data[..])?;
	ChainHeader::<N>::decode(&mut encoded_header.as_slice())
}
