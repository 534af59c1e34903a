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

use std::collections::BTreeMap;

use async_trait::async_trait;
use sp_core::{crypto::SecretStringError, ecdsa, ed25519, sr25519, ByteArray, Pair};
use thiserror::Error;

use crate::{
	did::{DidKeyMaterial, DidKeySet, DidSignature, DidVerificationKeyRelationship, KeyAlgorithm},
	Error,
};

const LOG_TARGET: &str = "dip::prover::signature";

/// A signature as returned by a wallet or keystore.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawSignature {
	pub algorithm: KeyAlgorithm,
	pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SignerError {
	#[error("no key available for relationship {0:?}")]
	KeyNotAvailable(DidVerificationKeyRelationship),
	#[error("signing rejected: {0}")]
	Rejected(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SigningFailure {
	#[error(transparent)]
	Signer(#[from] SignerError),
	#[error("signer used {actual} instead of {expected}")]
	AlgorithmMismatch { expected: KeyAlgorithm, actual: KeyAlgorithm },
	#[error("{algorithm} signature must be {expected} bytes, got {actual}")]
	InvalidLength {
		algorithm: KeyAlgorithm,
		expected: usize,
		actual: usize,
	},
	#[error("signature does not verify against the DID key")]
	InvalidSignature,
}

/// Something holding the private DID keys, e.g. a wallet.
///
/// The payload must be signed as-is, without hashing or wrapping it.
#[async_trait]
pub trait DidSigner: Send + Sync {
	async fn sign(
		&self,
		payload: &[u8],
		relationship: DidVerificationKeyRelationship,
	) -> Result<RawSignature, SignerError>;
}

/// Signs `payload` with the DID key `key` and checks the result, so that a
/// misbehaving signer is caught before anything is submitted.
pub async fn sign_payload<S>(signer: &S, payload: &[u8], key: &DidKeyMaterial) -> Result<DidSignature, Error>
where
	S: DidSigner + ?Sized,
{
	let relationship = key.relationship();
	let failed = |reason: SigningFailure| Error::SigningFailed { relationship, reason };

	log::debug!(
		target: LOG_TARGET,
		"Signing payload 0x{} with the {relationship:?} key",
		hex::encode(payload)
	);
	let raw = signer
		.sign(payload, relationship)
		.await
		.map_err(|e| failed(e.into()))?;

	let signature = into_did_signature(key.algorithm(), raw).map_err(failed)?;
	if !key.key().verify_signature(payload, &signature) {
		return Err(failed(SigningFailure::InvalidSignature));
	}
	Ok(signature)
}

fn into_did_signature(expected: KeyAlgorithm, raw: RawSignature) -> Result<DidSignature, SigningFailure> {
	if raw.algorithm != expected {
		return Err(SigningFailure::AlgorithmMismatch {
			expected,
			actual: raw.algorithm,
		});
	}
	let invalid_length = || SigningFailure::InvalidLength {
		algorithm: expected,
		expected: expected.signature_length(),
		actual: raw.bytes.len(),
	};
	let signature = match expected {
		KeyAlgorithm::Ed25519 => {
			DidSignature::Ed25519(ed25519::Signature::from_raw(
				raw.bytes.as_slice().try_into().map_err(|_| invalid_length())?,
			))
		}
		KeyAlgorithm::Sr25519 => {
			DidSignature::Sr25519(sr25519::Signature::from_raw(
				raw.bytes.as_slice().try_into().map_err(|_| invalid_length())?,
			))
		}
		KeyAlgorithm::Ecdsa => DidSignature::Ecdsa(ecdsa::Signature::from_raw(
			raw.bytes.as_slice().try_into().map_err(|_| invalid_length())?,
		)),
	};
	Ok(signature)
}

/// A DID private key held in memory.
#[derive(Clone)]
pub enum DidKeyPair {
	Ed25519(ed25519::Pair),
	Sr25519(sr25519::Pair),
	Ecdsa(ecdsa::Pair),
}

impl DidKeyPair {
	/// Derives the key from a secret URI, e.g. a mnemonic followed by a
	/// derivation path.
	pub fn from_suri(algorithm: KeyAlgorithm, suri: &str) -> Result<Self, SecretStringError> {
		Ok(match algorithm {
			KeyAlgorithm::Ed25519 => Self::Ed25519(ed25519::Pair::from_string(suri, None)?),
			KeyAlgorithm::Sr25519 => Self::Sr25519(sr25519::Pair::from_string(suri, None)?),
			KeyAlgorithm::Ecdsa => Self::Ecdsa(ecdsa::Pair::from_string(suri, None)?),
		})
	}

	pub fn algorithm(&self) -> KeyAlgorithm {
		match self {
			Self::Ed25519(_) => KeyAlgorithm::Ed25519,
			Self::Sr25519(_) => KeyAlgorithm::Sr25519,
			Self::Ecdsa(_) => KeyAlgorithm::Ecdsa,
		}
	}

	pub fn public(&self) -> Vec<u8> {
		match self {
			Self::Ed25519(pair) => pair.public().to_raw_vec(),
			Self::Sr25519(pair) => pair.public().to_raw_vec(),
			Self::Ecdsa(pair) => pair.public().to_raw_vec(),
		}
	}

	pub fn sign(&self, payload: &[u8]) -> RawSignature {
		let bytes = match self {
			Self::Ed25519(pair) => <[u8]>::to_vec(pair.sign(payload).as_ref()),
			Self::Sr25519(pair) => <[u8]>::to_vec(pair.sign(payload).as_ref()),
			Self::Ecdsa(pair) => <[u8]>::to_vec(pair.sign(payload).as_ref()),
		};
		RawSignature {
			algorithm: self.algorithm(),
			bytes,
		}
	}

	pub fn key_material(&self, relationship: DidVerificationKeyRelationship) -> DidKeyMaterial {
		let key = match self {
			Self::Ed25519(pair) => pair.public().into(),
			Self::Sr25519(pair) => pair.public().into(),
			Self::Ecdsa(pair) => pair.public().into(),
		};
		DidKeyMaterial::new(key, self.algorithm(), relationship)
	}
}

/// A [`DidSigner`] over in-memory key pairs, one per relationship.
#[derive(Clone, Default)]
pub struct PairSigner {
	keys: BTreeMap<DidVerificationKeyRelationship, DidKeyPair>,
}

impl PairSigner {
	pub fn with_key(mut self, relationship: DidVerificationKeyRelationship, pair: DidKeyPair) -> Self {
		self.keys.insert(relationship, pair);
		self
	}

	/// The public keys of the signer, or `None` without an authentication key.
	pub fn key_set(&self) -> Option<DidKeySet> {
		let material = |relationship| {
			self.keys
				.get(&relationship)
				.map(|pair: &DidKeyPair| pair.key_material(relationship))
		};
		let mut key_set = DidKeySet::new(material(DidVerificationKeyRelationship::Authentication)?);
		if let Some(key) = material(DidVerificationKeyRelationship::AssertionMethod) {
			key_set = key_set.with_assertion_method(key);
		}
		if let Some(key) = material(DidVerificationKeyRelationship::CapabilityDelegation) {
			key_set = key_set.with_capability_delegation(key);
		}
		Some(key_set)
	}
}

#[async_trait]
impl DidSigner for PairSigner {
	async fn sign(
		&self,
		payload: &[u8],
		relationship: DidVerificationKeyRelationship,
	) -> Result<RawSignature, SignerError> {
		self.keys
			.get(&relationship)
			.map(|pair| pair.sign(payload))
			.ok_or(SignerError::KeyNotAvailable(relationship))
	}
}
