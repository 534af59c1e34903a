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

use parity_scale_codec::{Encode, Output};
use sp_core::{crypto::AccountId32, H256};
use thiserror::Error;

/// A consumer `RuntimeCall`, already SCALE-encoded.
///
/// A runtime call encoding is self-delimiting, so it is written as-is
/// wherever it is embedded, without a length prefix.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EncodedCall(Vec<u8>);

#[derive(Debug, Error, PartialEq)]
pub enum EncodedCallError {
	#[error("call is empty")]
	Empty,
	#[error("call is not valid hex: {0}")]
	InvalidHex(#[from] hex::FromHexError),
}

impl EncodedCall {
	pub fn new(bytes: Vec<u8>) -> Result<Self, EncodedCallError> {
		// At least the pallet and call indices.
		if bytes.len() < 2 {
			return Err(EncodedCallError::Empty);
		}
		Ok(Self(bytes))
	}

	/// Parses a hex string, with or without `0x` prefix.
	pub fn from_hex(value: &str) -> Result<Self, EncodedCallError> {
		let trimmed = value.trim();
		let bytes = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))?;
		Self::new(bytes)
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	pub fn pallet_index(&self) -> u8 {
		self.0[0]
	}

	pub fn call_index(&self) -> u8 {
		self.0[1]
	}
}

impl Encode for EncodedCall {
	fn size_hint(&self) -> usize {
		self.0.len()
	}

	fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
		dest.write(&self.0)
	}
}

/// The payload a DID signs to authorize a call on the consumer chain.
///
/// Encodes as the tuple
/// `(call, identity_details, submitter, block_number, genesis_hash)`
/// followed by the encoded signed extra. Absent identity details are encoded
/// as `None`, the same way the consumer reads them from its storage.
///
/// Neither the call nor the signed extra carry a length prefix, matching the
/// bytes the consumer verifies the signature against. The boundaries are
/// still unambiguous: a well-formed `RuntimeCall` decodes self-delimiting,
/// and the signed extra is the last field, so it ends with the payload. The
/// call must therefore be a complete `RuntimeCall` of the consumer, with no
/// trailing bytes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignaturePayload<BlockNumber, IdentityDetails> {
	pub call: EncodedCall,
	pub identity_details: Option<IdentityDetails>,
	pub submitter: AccountId32,
	pub block_number: BlockNumber,
	pub genesis_hash: H256,
	pub signed_extra: Vec<u8>,
}

impl<BlockNumber, IdentityDetails> Encode for SignaturePayload<BlockNumber, IdentityDetails>
where
	BlockNumber: Encode,
	IdentityDetails: Encode,
{
	fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
		(
			&self.call,
			&self.identity_details,
			&self.submitter,
			&self.block_number,
			&self.genesis_hash,
		)
			.encode_to(dest);
		dest.write(&self.signed_extra);
	}
}
