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

use sp_core::H256;
use thiserror::Error;

use crate::{
	call::UnsupportedCallReason,
	chain::{ChainError, ChainRole},
	did::DidVerificationKeyRelationship,
	envelope::ProofComponent,
	merkle::ProofGenerationError,
	signature::SigningFailure,
};

/// Everything that can prevent a complete envelope from being produced.
///
/// The prover never returns a partially assembled envelope: any of these
/// aborts the whole request.
#[derive(Debug, Error)]
pub enum Error {
	#[error("the DID has no {relationship:?} key, which the call requires")]
	MissingRequiredKey { relationship: DidVerificationKeyRelationship },
	#[error("call `{call}` cannot be authorized by a DID: {reason}")]
	UnsupportedCall { call: String, reason: UnsupportedCallReason },
	#[error("signing with the {relationship:?} key failed: {reason}")]
	SigningFailed {
		relationship: DidVerificationKeyRelationship,
		reason: SigningFailure,
	},
	#[error("no {chain} anchor available: {reason}")]
	AnchorUnavailable { chain: ChainRole, reason: String },
	#[error("anchor became stale on each of {attempts} attempts")]
	AnchorExpired { attempts: u32 },
	#[error("DID proof v{version} at provider block {at:?} could not be generated: {reason}")]
	ProofGenerationFailed {
		version: u16,
		at: H256,
		reason: ProofGenerationError,
	},
	#[error("requested proof version {requested} but the consumer expects version {expected}")]
	VersionMismatch { requested: u16, expected: u16 },
	#[error("{chain} chain unreachable after {attempts} attempts: {source}")]
	ChainUnreachable {
		chain: ChainRole,
		attempts: u32,
		#[source]
		source: ChainError,
	},
	#[error("{chain} chain request failed: {source}")]
	ChainRequestFailed {
		chain: ChainRole,
		#[source]
		source: ChainError,
	},
	#[error("{chain} chain does not support DIP: pallet `{pallet}` not found")]
	ProtocolUnsupported { chain: ChainRole, pallet: String },
	#[error("{chain} state proof at {at:?} is invalid: {reason}")]
	InvalidStateProof { chain: ChainRole, at: H256, reason: String },
	#[error("{component} too large: {size} exceeds the limit of {limit}")]
	ProofTooLarge {
		component: ProofComponent,
		size: usize,
		limit: usize,
	},
}

impl Error {
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::MissingRequiredKey { .. } => ErrorKind::MissingRequiredKey,
			Self::UnsupportedCall { .. } => ErrorKind::UnsupportedCall,
			Self::SigningFailed { .. } => ErrorKind::SigningFailed,
			Self::AnchorUnavailable { .. } => ErrorKind::AnchorUnavailable,
			Self::AnchorExpired { .. } => ErrorKind::AnchorExpired,
			Self::ProofGenerationFailed { .. } => ErrorKind::ProofGenerationFailed,
			Self::VersionMismatch { .. } => ErrorKind::VersionMismatch,
			Self::ChainUnreachable { .. } => ErrorKind::ChainUnreachable,
			Self::ChainRequestFailed { .. } => ErrorKind::ChainRequestFailed,
			Self::ProtocolUnsupported { .. } => ErrorKind::ProtocolUnsupported,
			Self::InvalidStateProof { .. } => ErrorKind::InvalidStateProof,
			Self::ProofTooLarge { .. } => ErrorKind::ProofTooLarge,
		}
	}

	/// Wraps a failed remote call, classifying it by whether retrying could
	/// have helped.
	pub(crate) fn chain(chain: ChainRole, attempts: u32, source: ChainError) -> Self {
		if source.is_transient() {
			Self::ChainUnreachable { chain, attempts, source }
		} else {
			Self::ChainRequestFailed { chain, source }
		}
	}
}

/// Field-less mirror of [`Error`], used as the process exit status by the
/// CLI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(test, derive(enum_iterator::Sequence))]
pub enum ErrorKind {
	MissingRequiredKey,
	UnsupportedCall,
	SigningFailed,
	AnchorUnavailable,
	AnchorExpired,
	ProofGenerationFailed,
	VersionMismatch,
	ChainUnreachable,
	ChainRequestFailed,
	ProtocolUnsupported,
	InvalidStateProof,
	ProofTooLarge,
}

/// Exit status for failures that are not an [`Error`]. No [`ErrorKind`]
/// maps to it.
pub const UNCLASSIFIED_EXIT_CODE: u8 = 1;

impl From<ErrorKind> for u8 {
	fn from(value: ErrorKind) -> Self {
		match value {
			// DO NOT USE 0 or 1
			// Errors of different sub-kinds should have non-overlapping error codes
			// so the exit status alone tells them apart.
			ErrorKind::MissingRequiredKey => 2,
			ErrorKind::UnsupportedCall => 3,
			ErrorKind::SigningFailed => 4,
			ErrorKind::AnchorUnavailable => 11,
			ErrorKind::AnchorExpired => 12,
			ErrorKind::ProofGenerationFailed => 21,
			ErrorKind::VersionMismatch => 22,
			ErrorKind::InvalidStateProof => 23,
			ErrorKind::ProofTooLarge => 24,
			ErrorKind::ChainUnreachable => 31,
			ErrorKind::ChainRequestFailed => 32,
			ErrorKind::ProtocolUnsupported => 33,
		}
	}
}
