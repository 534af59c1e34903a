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

//! DID Merkle proofs, generated by the provider's `DipProvider` runtime API.

use std::{fmt, str::FromStr};

use parity_scale_codec::{Decode, Encode, MaxEncodedLen};
use scale_info::TypeInfo;
use sp_core::{
	crypto::{AccountId32, Ss58Codec},
	H256,
};
use thiserror::Error;

use crate::{
	anchor::ChainAnchor,
	chain::{decode, ChainClient, ChainRole},
	did::{DidIdentifier, DidKeyMaterial, DidKeyRelationship, DidPublicKeyDetails, KeyIdentifier},
	retry::RetryPolicy,
	Error,
};

const LOG_TARGET: &str = "dip::prover::merkle";

pub const GENERATE_PROOF_METHOD: &str = "DipProvider_generate_proof";

pub type Web3Name = Vec<u8>;

#[derive(Clone, Copy, Debug, Decode, Encode, Eq, Hash, MaxEncodedLen, Ord, PartialEq, PartialOrd, TypeInfo)]
pub struct AccountId20(pub [u8; 20]);

/// An account that can be linked to a DID.
#[derive(Clone, Debug, Decode, Encode, Eq, Hash, MaxEncodedLen, Ord, PartialEq, PartialOrd, TypeInfo)]
pub enum LinkableAccountId {
	AccountId20(AccountId20),
	AccountId32(AccountId32),
}

impl fmt::Display for LinkableAccountId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::AccountId20(account_id) => write!(f, "0x{}", hex::encode(account_id.0)),
			Self::AccountId32(account_id) => write!(f, "{}", account_id.to_ss58check()),
		}
	}
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("`{0}` is neither a 20-byte hex account nor an SS58 address")]
pub struct InvalidLinkableAccountId(String);

impl FromStr for LinkableAccountId {
	type Err = InvalidLinkableAccountId;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let invalid = || InvalidLinkableAccountId(s.to_owned());
		if let Some(hex_account) = s.strip_prefix("0x") {
			let bytes = hex::decode(hex_account).map_err(|_| invalid())?;
			let account = <[u8; 20]>::try_from(bytes.as_slice()).map_err(|_| invalid())?;
			return Ok(Self::AccountId20(AccountId20(account)));
		}
		AccountId32::from_ss58check_with_version(s)
			.map(|(account, _)| Self::AccountId32(account))
			.map_err(|_| invalid())
	}
}

/// Argument of the `DipProvider_generate_proof` runtime API.
#[derive(Clone, Debug, Decode, Encode, Eq, PartialEq, TypeInfo)]
pub struct DipProofRequest {
	pub identifier: DidIdentifier,
	pub version: u16,
	pub keys: Vec<KeyIdentifier>,
	pub accounts: Vec<LinkableAccountId>,
	pub should_include_web3_name: bool,
}

#[derive(Clone, Debug, Decode, Encode, Eq, PartialEq, TypeInfo)]
pub struct RevealedDidKey<KeyId, BlockNumber, AccountId> {
	pub id: KeyId,
	pub relationship: DidKeyRelationship,
	pub details: DidPublicKeyDetails<BlockNumber, AccountId>,
}

#[derive(Clone, Debug, Decode, Encode, Eq, PartialEq, TypeInfo)]
pub struct RevealedWeb3Name<Web3Name, BlockNumber> {
	pub web3_name: Web3Name,
	pub claimed_at: BlockNumber,
}

#[derive(Clone, Debug, Decode, Encode, Eq, PartialEq, TypeInfo)]
pub struct RevealedAccountId<AccountId>(pub AccountId);

#[derive(Clone, Debug, Decode, Encode, Eq, PartialEq, TypeInfo)]
pub enum RevealedDidMerkleProofLeaf<KeyId, AccountId, BlockNumber, Web3Name, LinkedAccountId> {
	DidKey(RevealedDidKey<KeyId, BlockNumber, AccountId>),
	Web3Name(RevealedWeb3Name<Web3Name, BlockNumber>),
	LinkedAccount(RevealedAccountId<LinkedAccountId>),
}

impl<KeyId, AccountId, BlockNumber, Web3Name, LinkedAccountId> From<RevealedDidKey<KeyId, BlockNumber, AccountId>>
	for RevealedDidMerkleProofLeaf<KeyId, AccountId, BlockNumber, Web3Name, LinkedAccountId>
{
	fn from(value: RevealedDidKey<KeyId, BlockNumber, AccountId>) -> Self {
		Self::DidKey(value)
	}
}

impl<KeyId, AccountId, BlockNumber, Web3Name, LinkedAccountId> From<RevealedWeb3Name<Web3Name, BlockNumber>>
	for RevealedDidMerkleProofLeaf<KeyId, AccountId, BlockNumber, Web3Name, LinkedAccountId>
{
	fn from(value: RevealedWeb3Name<Web3Name, BlockNumber>) -> Self {
		Self::Web3Name(value)
	}
}

impl<KeyId, AccountId, BlockNumber, Web3Name, LinkedAccountId> From<RevealedAccountId<LinkedAccountId>>
	for RevealedDidMerkleProofLeaf<KeyId, AccountId, BlockNumber, Web3Name, LinkedAccountId>
{
	fn from(value: RevealedAccountId<LinkedAccountId>) -> Self {
		Self::LinkedAccount(value)
	}
}

/// A DID Merkle proof, revealing some of the leaves of the identity
/// commitment.
#[derive(Clone, Debug, Decode, Encode, Eq, PartialEq, TypeInfo)]
pub struct DidMerkleProof<KeyId, AccountId, BlockNumber, Web3Name, LinkedAccountId> {
	pub blinded: Vec<Vec<u8>>,
	pub revealed: Vec<RevealedDidMerkleProofLeaf<KeyId, AccountId, BlockNumber, Web3Name, LinkedAccountId>>,
}

pub type DidMerkleProofOf<BlockNumber> =
	DidMerkleProof<KeyIdentifier, AccountId32, BlockNumber, Web3Name, LinkableAccountId>;
pub type RevealedLeafOf<BlockNumber> =
	RevealedDidMerkleProofLeaf<KeyIdentifier, AccountId32, BlockNumber, Web3Name, LinkableAccountId>;

#[derive(Clone, Debug, Decode, Encode, Eq, PartialEq, TypeInfo)]
pub struct CompleteMerkleProof<Root, Proof> {
	pub root: Root,
	pub proof: Proof,
}

#[derive(Clone, Copy, Debug, Decode, Encode, Eq, PartialEq, TypeInfo)]
pub enum LinkedDidInfoProviderError {
	DidNotFound,
	DidDeleted,
	TooManyLinkedAccounts,
	Internal,
}

#[derive(Clone, Copy, Debug, Decode, Encode, Eq, PartialEq, TypeInfo)]
pub enum DidMerkleProofError {
	UnsupportedVersion,
	KeyNotFound,
	LinkedAccountNotFound,
	Web3NameNotFound,
	TooManyLeaves,
	Internal,
}

/// Error returned by the Peregrine and Spiritnet runtimes.
#[derive(Clone, Copy, Debug, Decode, Encode, Eq, PartialEq, TypeInfo)]
pub enum DipProofError {
	IdentityProvider(LinkedDidInfoProviderError),
	MerkleProof(DidMerkleProofError),
}

#[derive(Clone, Copy, Debug, Decode, Encode, Eq, PartialEq, TypeInfo)]
pub enum DidIdentityProviderError {
	DidNotFound,
	Internal,
}

/// Error returned by the DIP provider template runtime.
#[derive(Clone, Copy, Debug, Decode, Encode, Eq, PartialEq, TypeInfo)]
pub enum TemplateDipProofError {
	IdentityNotFound,
	IdentityProviderError(DidIdentityProviderError),
	MerkleProofError(DidMerkleProofError),
}

/// The runtime API error of whichever provider runtime answered.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProviderProofError {
	Kilt(DipProofError),
	Template(TemplateDipProofError),
}

impl From<DipProofError> for ProviderProofError {
	fn from(value: DipProofError) -> Self {
		Self::Kilt(value)
	}
}

impl From<TemplateDipProofError> for ProviderProofError {
	fn from(value: TemplateDipProofError) -> Self {
		Self::Template(value)
	}
}

pub type GenerateProofResult<BlockNumber, ProofError = DipProofError> =
	Result<CompleteMerkleProof<H256, DidMerkleProofOf<BlockNumber>>, ProofError>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProofGenerationError {
	#[error("provider runtime refused: {0:?}")]
	Runtime(ProviderProofError),
	#[error("no identity commitment stored")]
	CommitmentNotFound,
	#[error("key {0:?} not revealed")]
	KeyNotRevealed(KeyIdentifier),
	#[error("key {id:?} revealed as {actual:?}, expected {expected:?}")]
	RelationshipMismatch {
		id: KeyIdentifier,
		expected: DidKeyRelationship,
		actual: DidKeyRelationship,
	},
	#[error("linked account {0} not revealed")]
	AccountNotRevealed(LinkableAccountId),
	#[error("web3name not revealed")]
	Web3NameNotRevealed,
	#[error("web3name revealed although not requested")]
	UnexpectedWeb3Name,
	#[error("proof root {proof:?} differs from the committed root {committed:?}")]
	RootMismatch { proof: H256, committed: H256 },
	#[error("commitment read at block {commitment:?} but DID proof generated at block {proof:?}")]
	AnchorMismatch { commitment: H256, proof: H256 },
}

/// What the DID Merkle proof must reveal.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommitmentProofRequest {
	pub identifier: DidIdentifier,
	pub version: u16,
	/// The key signing the call.
	pub signing_key: DidKeyMaterial,
	pub accounts: Vec<LinkableAccountId>,
	pub include_web3_name: bool,
}

impl CommitmentProofRequest {
	fn runtime_request(&self) -> DipProofRequest {
		DipProofRequest {
			identifier: self.identifier.clone(),
			version: self.version,
			keys: vec![self.signing_key.key_id()],
			accounts: self.accounts.clone(),
			should_include_web3_name: self.include_web3_name,
		}
	}
}

/// A DID Merkle proof, tied to the provider block it was generated at.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommitmentProof<BlockNumber> {
	pub version: u16,
	pub root: H256,
	pub proof: DidMerkleProofOf<BlockNumber>,
	pub at: ChainAnchor<BlockNumber>,
}

impl<BlockNumber> CommitmentProof<BlockNumber> {
	/// Fails unless the proof verifies against `committed`, the root stored
	/// on chain at the same block.
	pub fn ensure_root(&self, committed: H256) -> Result<(), Error> {
		if self.root != committed {
			return Err(Error::ProofGenerationFailed {
				version: self.version,
				at: self.at.hash,
				reason: ProofGenerationError::RootMismatch {
					proof: self.root,
					committed,
				},
			});
		}
		Ok(())
	}
}

/// Asks the provider for a DID Merkle proof at `at` and checks it reveals
/// everything `request` needs.
///
/// `ProofError` is the error type of the provider runtime's API, which
/// differs between runtimes.
pub async fn generate_commitment_proof<P, ProofError>(
	provider: &P,
	at: &ChainAnchor<P::BlockNumber>,
	request: &CommitmentProofRequest,
	retry: &RetryPolicy,
) -> Result<CommitmentProof<P::BlockNumber>, Error>
where
	P: ChainClient,
	ProofError: Decode + Into<ProviderProofError>,
{
	let failed = |reason| Error::ProofGenerationFailed {
		version: request.version,
		at: at.hash,
		reason,
	};

	let encoded_request = request.runtime_request().encode();
	log::debug!(
		target: LOG_TARGET,
		"Requesting DID proof v{} at provider block #{} with 0x{}",
		request.version,
		at.number,
		hex::encode(&encoded_request)
	);
	let response = retry
		.run(ChainRole::Provider, GENERATE_PROOF_METHOD, || {
			provider.runtime_call(GENERATE_PROOF_METHOD, &encoded_request, Some(at.hash))
		})
		.await?;
	let complete_proof = decode::<GenerateProofResult<P::BlockNumber, ProofError>>(ChainRole::Provider, &response)?
		.map_err(|e| failed(ProofGenerationError::Runtime(e.into())))?;

	check_revealed(&complete_proof.proof, request).map_err(failed)?;
	log::info!(
		target: LOG_TARGET,
		"Generated DID proof with root {:?}, {} revealed and {} blinded nodes",
		complete_proof.root,
		complete_proof.proof.revealed.len(),
		complete_proof.proof.blinded.len()
	);

	Ok(CommitmentProof {
		version: request.version,
		root: complete_proof.root,
		proof: complete_proof.proof,
		at: *at,
	})
}

fn check_revealed<BlockNumber>(
	proof: &DidMerkleProofOf<BlockNumber>,
	request: &CommitmentProofRequest,
) -> Result<(), ProofGenerationError> {
	let signing_key_id = request.signing_key.key_id();
	let expected = DidKeyRelationship::from(request.signing_key.relationship());
	let revealed_key = proof
		.revealed
		.iter()
		.find_map(|leaf| match leaf {
			RevealedDidMerkleProofLeaf::DidKey(key) if key.id == signing_key_id => Some(key),
			_ => None,
		})
		.ok_or(ProofGenerationError::KeyNotRevealed(signing_key_id))?;
	if revealed_key.relationship != expected {
		return Err(ProofGenerationError::RelationshipMismatch {
			id: signing_key_id,
			expected,
			actual: revealed_key.relationship,
		});
	}

	for account in &request.accounts {
		let is_revealed = proof.revealed.iter().any(
			|leaf| matches!(leaf, RevealedDidMerkleProofLeaf::LinkedAccount(RevealedAccountId(revealed)) if revealed == account),
		);
		if !is_revealed {
			return Err(ProofGenerationError::AccountNotRevealed(account.clone()));
		}
	}

	let web3_name_revealed = proof
		.revealed
		.iter()
		.any(|leaf| matches!(leaf, RevealedDidMerkleProofLeaf::Web3Name(_)));
	match (request.include_web3_name, web3_name_revealed) {
		(true, false) => Err(ProofGenerationError::Web3NameNotRevealed),
		(false, true) => Err(ProofGenerationError::UnexpectedWeb3Name),
		_ => Ok(()),
	}
}

#[cfg(test)]
mod tests;
