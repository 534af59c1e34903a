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

//! DID types as they are encoded by the KILT DID pallet, plus the key
//! material the prover signs with.

use std::{fmt, str::FromStr};

use parity_scale_codec::{Decode, Encode, MaxEncodedLen};
use scale_info::TypeInfo;
use sp_core::{
	crypto::{AccountId32, Ss58AddressFormat, Ss58Codec},
	ecdsa, ed25519, sr25519, ByteArray, H256,
};
use sp_runtime::traits::Verify;
use thiserror::Error;

/// KILT DIDs are identified by an account ID.
pub type DidIdentifier = AccountId32;
/// Hash of the SCALE-encoded [`DidPublicKey`].
pub type KeyIdentifier = H256;

pub const KILT_DID_PREFIX: &str = "did:kilt:";
pub const KILT_SS58_PREFIX: u16 = 38;

/// All the methods a verification key can fulfil.
#[derive(Clone, Copy, Debug, Decode, Encode, Eq, Hash, MaxEncodedLen, Ord, PartialEq, PartialOrd, TypeInfo)]
pub enum DidVerificationKeyRelationship {
	/// Key used to authenticate all the DID operations.
	Authentication,
	/// Key used to write and revoke delegations on chain.
	CapabilityDelegation,
	/// Not used for now.
	CapabilityInvocation,
	/// Key used to write and revoke attestations on chain.
	AssertionMethod,
}

#[derive(Clone, Copy, Debug, Decode, Encode, Eq, MaxEncodedLen, PartialEq, TypeInfo)]
pub enum DidKeyRelationship {
	Encryption,
	Verification(DidVerificationKeyRelationship),
}

impl From<DidVerificationKeyRelationship> for DidKeyRelationship {
	fn from(value: DidVerificationKeyRelationship) -> Self {
		Self::Verification(value)
	}
}

/// Types of verification keys a DID can control.
#[derive(Clone, Debug, Decode, Encode, Eq, Ord, PartialEq, PartialOrd, TypeInfo)]
pub enum DidVerificationKey<AccountId> {
	/// An Ed25519 public key.
	Ed25519(ed25519::Public),
	/// A Sr25519 public key.
	Sr25519(sr25519::Public),
	/// An ECDSA public key.
	Ecdsa(ecdsa::Public),
	/// An account on the same chain as the DID.
	Account(AccountId),
}

impl<AccountId> DidVerificationKey<AccountId> {
	pub fn algorithm(&self) -> Option<KeyAlgorithm> {
		match self {
			Self::Ed25519(_) => Some(KeyAlgorithm::Ed25519),
			Self::Sr25519(_) => Some(KeyAlgorithm::Sr25519),
			Self::Ecdsa(_) => Some(KeyAlgorithm::Ecdsa),
			Self::Account(_) => None,
		}
	}

	/// Verify a DID signature using one of the DID keys.
	pub fn verify_signature(&self, payload: &[u8], signature: &DidSignature) -> bool {
		match (self, signature) {
			(Self::Ed25519(public_key), DidSignature::Ed25519(sig)) => sig.verify(payload, public_key),
			(Self::Sr25519(public_key), DidSignature::Sr25519(sig)) => sig.verify(payload, public_key),
			(Self::Ecdsa(public_key), DidSignature::Ecdsa(sig)) => sig.verify(payload, public_key),
			_ => false,
		}
	}
}

impl<AccountId> From<ed25519::Public> for DidVerificationKey<AccountId> {
	fn from(key: ed25519::Public) -> Self {
		Self::Ed25519(key)
	}
}

impl<AccountId> From<sr25519::Public> for DidVerificationKey<AccountId> {
	fn from(key: sr25519::Public) -> Self {
		Self::Sr25519(key)
	}
}

impl<AccountId> From<ecdsa::Public> for DidVerificationKey<AccountId> {
	fn from(key: ecdsa::Public) -> Self {
		Self::Ecdsa(key)
	}
}

/// Types of encryption keys a DID can control.
#[derive(Clone, Copy, Debug, Decode, Encode, Eq, Ord, PartialEq, PartialOrd, TypeInfo)]
pub enum DidEncryptionKey {
	/// An X25519 public key.
	X25519([u8; 32]),
}

#[derive(Clone, Debug, Decode, Encode, Eq, Ord, PartialEq, PartialOrd, TypeInfo)]
pub enum DidPublicKey<AccountId> {
	PublicVerificationKey(DidVerificationKey<AccountId>),
	PublicEncryptionKey(DidEncryptionKey),
}

impl<AccountId> From<DidVerificationKey<AccountId>> for DidPublicKey<AccountId> {
	fn from(value: DidVerificationKey<AccountId>) -> Self {
		Self::PublicVerificationKey(value)
	}
}

/// A DID key as stored on the provider chain, together with the block it was
/// added at.
#[derive(Clone, Debug, Decode, Encode, Eq, PartialEq, TypeInfo)]
pub struct DidPublicKeyDetails<BlockNumber, AccountId> {
	pub key: DidPublicKey<AccountId>,
	pub block_number: BlockNumber,
}

/// Types of signatures supported by the DID pallet.
#[derive(Clone, Debug, Decode, Encode, Eq, PartialEq, TypeInfo)]
pub enum DidSignature {
	/// A Ed25519 signature.
	Ed25519(ed25519::Signature),
	/// A Sr25519 signature.
	Sr25519(sr25519::Signature),
	/// An ECDSA signature.
	Ecdsa(ecdsa::Signature),
}

impl DidSignature {
	pub fn algorithm(&self) -> KeyAlgorithm {
		match self {
			Self::Ed25519(_) => KeyAlgorithm::Ed25519,
			Self::Sr25519(_) => KeyAlgorithm::Sr25519,
			Self::Ecdsa(_) => KeyAlgorithm::Ecdsa,
		}
	}
}

/// Signature schemes usable for DID verification keys.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum KeyAlgorithm {
	Ed25519,
	Sr25519,
	Ecdsa,
}

impl KeyAlgorithm {
	pub fn signature_length(&self) -> usize {
		match self {
			Self::Ed25519 | Self::Sr25519 => 64,
			Self::Ecdsa => 65,
		}
	}
}

impl fmt::Display for KeyAlgorithm {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Ed25519 => "ed25519",
			Self::Sr25519 => "sr25519",
			Self::Ecdsa => "ecdsa",
		};
		f.write_str(name)
	}
}

impl FromStr for KeyAlgorithm {
	type Err = DidError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"ed25519" => Ok(Self::Ed25519),
			"sr25519" => Ok(Self::Sr25519),
			"ecdsa" => Ok(Self::Ecdsa),
			other => Err(DidError::UnknownAlgorithm(other.to_owned())),
		}
	}
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DidError {
	#[error("`{0}` is not a KILT DID URI")]
	InvalidUri(String),
	#[error("unknown key algorithm `{0}`")]
	UnknownAlgorithm(String),
	#[error("{algorithm} public key must be {expected} bytes, got {actual}")]
	InvalidPublicKey {
		algorithm: KeyAlgorithm,
		expected: usize,
		actual: usize,
	},
}

/// A public DID key the prover may sign with, bound to the relationship it
/// fulfils in the DID document.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DidKeyMaterial {
	key: DidVerificationKey<AccountId32>,
	algorithm: KeyAlgorithm,
	relationship: DidVerificationKeyRelationship,
}

impl DidKeyMaterial {
	/// Builds the key from its raw public bytes.
	pub fn from_raw(
		algorithm: KeyAlgorithm,
		public_key: &[u8],
		relationship: DidVerificationKeyRelationship,
	) -> Result<Self, DidError> {
		let invalid = |expected| DidError::InvalidPublicKey {
			algorithm,
			expected,
			actual: public_key.len(),
		};
		let key = match algorithm {
			KeyAlgorithm::Ed25519 => ed25519::Public::from_slice(public_key)
				.map_err(|_| invalid(ed25519::Public::LEN))?
				.into(),
			KeyAlgorithm::Sr25519 => sr25519::Public::from_slice(public_key)
				.map_err(|_| invalid(sr25519::Public::LEN))?
				.into(),
			KeyAlgorithm::Ecdsa => ecdsa::Public::from_slice(public_key)
				.map_err(|_| invalid(ecdsa::Public::LEN))?
				.into(),
		};
		Ok(Self {
			key,
			algorithm,
			relationship,
		})
	}

	pub(crate) fn new(
		key: DidVerificationKey<AccountId32>,
		algorithm: KeyAlgorithm,
		relationship: DidVerificationKeyRelationship,
	) -> Self {
		Self {
			key,
			algorithm,
			relationship,
		}
	}

	pub fn key(&self) -> &DidVerificationKey<AccountId32> {
		&self.key
	}

	pub fn relationship(&self) -> DidVerificationKeyRelationship {
		self.relationship
	}

	pub fn algorithm(&self) -> KeyAlgorithm {
		self.algorithm
	}

	/// The identifier the provider chain stores the key under.
	pub fn key_id(&self) -> KeyIdentifier {
		calculate_key_id(&DidPublicKey::from(self.key.clone()))
	}
}

pub fn calculate_key_id(key: &DidPublicKey<AccountId32>) -> KeyIdentifier {
	sp_core::blake2_256(&key.encode()).into()
}

/// The verification keys of a DID the prover has access to.
///
/// Every DID has an authentication key, the other relationships are optional.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DidKeySet {
	authentication: DidKeyMaterial,
	assertion_method: Option<DidKeyMaterial>,
	capability_delegation: Option<DidKeyMaterial>,
}

impl DidKeySet {
	pub fn new(authentication: DidKeyMaterial) -> Self {
		Self {
			authentication: Self::bound(authentication, DidVerificationKeyRelationship::Authentication),
			assertion_method: None,
			capability_delegation: None,
		}
	}

	pub fn with_assertion_method(mut self, key: DidKeyMaterial) -> Self {
		self.assertion_method = Some(Self::bound(key, DidVerificationKeyRelationship::AssertionMethod));
		self
	}

	pub fn with_capability_delegation(mut self, key: DidKeyMaterial) -> Self {
		self.capability_delegation = Some(Self::bound(key, DidVerificationKeyRelationship::CapabilityDelegation));
		self
	}

	pub fn get(&self, relationship: DidVerificationKeyRelationship) -> Option<&DidKeyMaterial> {
		match relationship {
			DidVerificationKeyRelationship::Authentication => Some(&self.authentication),
			DidVerificationKeyRelationship::AssertionMethod => self.assertion_method.as_ref(),
			DidVerificationKeyRelationship::CapabilityDelegation => self.capability_delegation.as_ref(),
			DidVerificationKeyRelationship::CapabilityInvocation => None,
		}
	}

	pub fn iter(&self) -> impl Iterator<Item = &DidKeyMaterial> {
		std::iter::once(&self.authentication)
			.chain(self.assertion_method.as_ref())
			.chain(self.capability_delegation.as_ref())
	}

	// A key stored in a slot always carries that slot's relationship.
	fn bound(key: DidKeyMaterial, relationship: DidVerificationKeyRelationship) -> DidKeyMaterial {
		DidKeyMaterial { relationship, ..key }
	}
}

/// Parses a `did:kilt:<ss58>` URI into the DID identifier.
pub fn parse_did_uri(uri: &str) -> Result<DidIdentifier, DidError> {
	let address = uri
		.strip_prefix(KILT_DID_PREFIX)
		.ok_or_else(|| DidError::InvalidUri(uri.to_owned()))?;
	AccountId32::from_ss58check_with_version(address)
		.map(|(identifier, _)| identifier)
		.map_err(|_| DidError::InvalidUri(uri.to_owned()))
}

pub fn did_uri(identifier: &DidIdentifier) -> String {
	format!(
		"{KILT_DID_PREFIX}{}",
		identifier.to_ss58check_with_version(Ss58AddressFormat::custom(KILT_SS58_PREFIX))
	)
}

#[cfg(test)]
mod tests {
	use super::*;

	use sp_core::Pair;

	const DID_ADDRESS: &str = "4s3jpR7pzrUdhVUqHHdWoBN6oNQHBC7WRo7zsXdjAzQPT7Cf";

	#[test]
	fn parse_did_uri_round_trips() {
		let uri = format!("did:kilt:{DID_ADDRESS}");
		let identifier = parse_did_uri(&uri).unwrap();
		assert_eq!(did_uri(&identifier), uri);
	}

	#[test]
	fn parse_did_uri_rejects_foreign_methods() {
		assert_eq!(
			parse_did_uri(&format!("did:web:{DID_ADDRESS}")),
			Err(DidError::InvalidUri(format!("did:web:{DID_ADDRESS}")))
		);
		assert!(parse_did_uri("did:kilt:not-an-address").is_err());
	}

	#[test]
	fn key_id_hashes_encoded_public_key() {
		let public = sr25519::Pair::from_string("//Alice", None).unwrap().public();
		let key = DidKeyMaterial::from_raw(
			KeyAlgorithm::Sr25519,
			public.as_slice(),
			DidVerificationKeyRelationship::Authentication,
		)
		.unwrap();

		// Variant tag of the public key, then of the verification key, then the raw key.
		let mut encoded = vec![0u8, 1u8];
		encoded.extend_from_slice(public.as_slice());
		assert_eq!(key.key_id(), H256(sp_core::blake2_256(&encoded)));
	}

	#[test]
	fn key_id_does_not_depend_on_relationship() {
		let public = ed25519::Pair::from_string("//Bob", None).unwrap().public();
		let auth = DidKeyMaterial::from_raw(
			KeyAlgorithm::Ed25519,
			public.as_slice(),
			DidVerificationKeyRelationship::Authentication,
		)
		.unwrap();
		let att = DidKeyMaterial::from_raw(
			KeyAlgorithm::Ed25519,
			public.as_slice(),
			DidVerificationKeyRelationship::AssertionMethod,
		)
		.unwrap();
		assert_eq!(auth.key_id(), att.key_id());
	}

	#[test]
	fn from_raw_checks_length() {
		assert_eq!(
			DidKeyMaterial::from_raw(
				KeyAlgorithm::Ecdsa,
				&[0u8; 32],
				DidVerificationKeyRelationship::Authentication
			),
			Err(DidError::InvalidPublicKey {
				algorithm: KeyAlgorithm::Ecdsa,
				expected: 33,
				actual: 32
			})
		);
	}

	#[test]
	fn key_set_binds_relationships() {
		let public = sr25519::Pair::from_string("//Alice", None).unwrap().public();
		let key = DidKeyMaterial::from_raw(
			KeyAlgorithm::Sr25519,
			public.as_slice(),
			DidVerificationKeyRelationship::Authentication,
		)
		.unwrap();
		let set = DidKeySet::new(key.clone()).with_assertion_method(key);

		assert_eq!(
			set.get(DidVerificationKeyRelationship::AssertionMethod)
				.map(DidKeyMaterial::relationship),
			Some(DidVerificationKeyRelationship::AssertionMethod)
		);
		assert!(set.get(DidVerificationKeyRelationship::CapabilityDelegation).is_none());
		assert_eq!(set.iter().count(), 2);
	}

	#[test]
	fn verify_signature_requires_matching_scheme() {
		let pair = ed25519::Pair::from_string("//Alice", None).unwrap();
		let key: DidVerificationKey<AccountId32> = pair.public().into();
		let signature = DidSignature::Ed25519(pair.sign(b"payload"));

		assert!(key.verify_signature(b"payload", &signature));
		assert!(!key.verify_signature(b"other payload", &signature));

		let sr_pair = sr25519::Pair::from_string("//Alice", None).unwrap();
		assert!(!key.verify_signature(b"payload", &DidSignature::Sr25519(sr_pair.sign(b"payload"))));
	}
}
