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

//! Maps a call to the DID key relationship that must authorize it.

use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::{
	did::{DidKeyMaterial, DidKeySet, DidVerificationKeyRelationship},
	payload::EncodedCall,
	Error,
};

const LOG_TARGET: &str = "dip::prover::call";

/// Position of a call in the consumer runtime: the pallet index followed by
/// the call index within the pallet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CallIndices {
	pub pallet: u8,
	pub call: u8,
}

impl CallIndices {
	pub fn of(call: &EncodedCall) -> Self {
		Self {
			pallet: call.pallet_index(),
			call: call.call_index(),
		}
	}
}

impl fmt::Display for CallIndices {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.pallet, self.call)
	}
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("`{0}` is not of the form `PALLET_INDEX:CALL_INDEX`")]
pub struct InvalidCallIndices(String);

impl FromStr for CallIndices {
	type Err = InvalidCallIndices;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let invalid = || InvalidCallIndices(s.to_owned());
		let (pallet, call) = s.split_once(':').ok_or_else(invalid)?;
		Ok(Self {
			pallet: pallet.trim().parse().map_err(|_| invalid())?,
			call: call.trim().parse().map_err(|_| invalid())?,
		})
	}
}

/// The pallet and function of a decoded call, with the calls it wraps in
/// case of a batch.
///
/// Nothing here is derived from the encoded call: the names are taken on
/// trust and decide which key signs. When `indices` is set,
/// [`check_indices`] at least ensures the description names the pallet and
/// call the encoded call dispatches.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CallInfo {
	pub pallet: String,
	pub function: String,
	/// Expected indices of the outer call.
	pub indices: Option<CallIndices>,
	pub nested: Vec<CallInfo>,
}

impl CallInfo {
	pub fn new(pallet: impl Into<String>, function: impl Into<String>) -> Self {
		Self {
			pallet: pallet.into(),
			function: function.into(),
			indices: None,
			nested: Vec::new(),
		}
	}

	pub fn with_indices(mut self, indices: impl Into<Option<CallIndices>>) -> Self {
		self.indices = indices.into();
		self
	}

	pub fn with_nested(mut self, nested: impl IntoIterator<Item = CallInfo>) -> Self {
		self.nested.extend(nested);
		self
	}
}

impl fmt::Display for CallInfo {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}::{}", self.pallet, self.function)
	}
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("`{0}` is not of the form `Pallet::function`")]
pub struct InvalidCallInfo(String);

impl FromStr for CallInfo {
	type Err = InvalidCallInfo;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.split_once("::") {
			Some((pallet, function)) if !pallet.is_empty() && !function.is_empty() && !function.contains("::") => {
				Ok(Self::new(pallet, function))
			}
			_ => Err(InvalidCallInfo(s.to_owned())),
		}
	}
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum UnsupportedCallReason {
	#[error("unknown call")]
	Unknown,
	#[error("not callable by a DID")]
	NotCallableByDid,
	#[error("empty batch")]
	EmptyBatch,
	#[error("batched calls require different keys")]
	MixedBatch,
	#[error("encoded call is {encoded}, expected {expected}")]
	IndexMismatch { expected: CallIndices, encoded: CallIndices },
}

/// The calls a DID can authorize, grouped by the pallet they belong to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CallCategory {
	Attestation,
	Ctype,
	Delegation,
	/// Any DID management call but `create`.
	Did,
	DidCreate,
	DipProvider,
	Web3Names,
	DotNames,
	PublicCredentials,
	DidLookup,
	UniqueLinking,
	PostIt,
	Batch(Vec<CallCategory>),
}

impl CallCategory {
	pub fn from_call(call: &CallInfo) -> Result<Self, Error> {
		let category = match (call.pallet.as_str(), call.function.as_str()) {
			("Attestation", _) => Self::Attestation,
			("Ctype", _) => Self::Ctype,
			("Delegation", _) => Self::Delegation,
			("Did", "create") => Self::DidCreate,
			("Did", _) => Self::Did,
			("DipProvider", _) => Self::DipProvider,
			("Web3Names", _) => Self::Web3Names,
			("DotNames", _) => Self::DotNames,
			("PublicCredentials", _) => Self::PublicCredentials,
			("DidLookup", _) => Self::DidLookup,
			("UniqueLinking", _) => Self::UniqueLinking,
			("PostIt", _) => Self::PostIt,
			("Utility", "batch" | "batch_all" | "force_batch") => Self::Batch(
				call.nested
					.iter()
					.map(Self::from_call)
					.collect::<Result<Vec<_>, _>>()?,
			),
			_ => return Err(unsupported(call, UnsupportedCallReason::Unknown)),
		};
		Ok(category)
	}

	pub fn required_relationship(&self) -> Result<DidVerificationKeyRelationship, UnsupportedCallReason> {
		match self {
			Self::Attestation | Self::Ctype | Self::PublicCredentials => {
				Ok(DidVerificationKeyRelationship::AssertionMethod)
			}
			Self::Delegation => Ok(DidVerificationKeyRelationship::CapabilityDelegation),
			Self::Did
			| Self::DipProvider
			| Self::Web3Names
			| Self::DotNames
			| Self::DidLookup
			| Self::UniqueLinking
			| Self::PostIt => Ok(DidVerificationKeyRelationship::Authentication),
			Self::DidCreate => Err(UnsupportedCallReason::NotCallableByDid),
			Self::Batch(calls) => single_key_relationship(calls),
		}
	}
}

/// All calls in a batch must require the same key.
fn single_key_relationship(calls: &[CallCategory]) -> Result<DidVerificationKeyRelationship, UnsupportedCallReason> {
	let init = calls
		.first()
		.ok_or(UnsupportedCallReason::EmptyBatch)?
		.required_relationship()?;
	calls
		.iter()
		.skip(1)
		.map(CallCategory::required_relationship)
		.try_fold(init, |acc, next| match next {
			Ok(relationship) if relationship == acc => Ok(acc),
			Ok(_) => Err(UnsupportedCallReason::MixedBatch),
			Err(e) => Err(e),
		})
}

fn unsupported(call: &CallInfo, reason: UnsupportedCallReason) -> Error {
	Error::UnsupportedCall {
		call: call.to_string(),
		reason,
	}
}

/// The relationship the DID key authorizing `call` must fulfil.
pub fn required_relationship(call: &CallInfo) -> Result<DidVerificationKeyRelationship, Error> {
	CallCategory::from_call(call)?
		.required_relationship()
		.map_err(|reason| unsupported(call, reason))
}

/// Fails if `call` declares indices that differ from those of `encoded`.
pub fn check_indices(call: &CallInfo, encoded: &EncodedCall) -> Result<(), Error> {
	let encoded_indices = CallIndices::of(encoded);
	match call.indices {
		Some(expected) if expected != encoded_indices => Err(unsupported(
			call,
			UnsupportedCallReason::IndexMismatch {
				expected,
				encoded: encoded_indices,
			},
		)),
		Some(_) => Ok(()),
		None => {
			log::debug!(
				target: LOG_TARGET,
				"No indices given for {call}, encoded call {encoded_indices} not cross-checked"
			);
			Ok(())
		}
	}
}

/// Picks the key from `keys` that must sign `call`.
///
/// There is no fallback to another relationship: if the DID does not control
/// the required key, the call cannot be authorized.
pub fn resolve_key<'a>(call: &CallInfo, keys: &'a DidKeySet) -> Result<&'a DidKeyMaterial, Error> {
	let relationship = required_relationship(call)?;
	let key = keys
		.get(relationship)
		.ok_or(Error::MissingRequiredKey { relationship })?;
	log::debug!(
		target: LOG_TARGET,
		"Call {call} requires the {relationship:?} key {:?}",
		key.key_id()
	);
	Ok(key)
}
