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

//! Storage keys of the runtime items the prover reads or proves.

use parity_scale_codec::Encode;
use sp_core::{blake2_128, storage::StorageKey, twox_128, twox_64};

use crate::did::DidIdentifier;

pub const PROVIDER_PALLET: &str = "DipProvider";
pub const DEFAULT_CONSUMER_PALLET: &str = "DipConsumer";

const STORAGE_VERSION_KEY: &[u8] = b":__STORAGE_VERSION__:";

pub fn storage_prefix(pallet: &str, item: &str) -> [u8; 32] {
	let mut prefix = [0u8; 32];
	prefix[..16].copy_from_slice(&twox_128(pallet.as_bytes()));
	prefix[16..].copy_from_slice(&twox_128(item.as_bytes()));
	prefix
}

fn twox_64_concat(value: &impl Encode) -> Vec<u8> {
	let encoded = value.encode();
	[twox_64(&encoded).as_slice(), encoded.as_slice()].concat()
}

fn blake2_128_concat(value: &impl Encode) -> Vec<u8> {
	let encoded = value.encode();
	[blake2_128(&encoded).as_slice(), encoded.as_slice()].concat()
}

/// `Paras::Heads(para_id)` on the relay chain.
pub fn parachain_head(para_id: u32) -> StorageKey {
	StorageKey([storage_prefix("Paras", "Heads").as_slice(), &twox_64_concat(&para_id)].concat())
}

/// `DipProvider::IdentityCommitments(identifier, version)` on the provider
/// chain.
pub fn identity_commitment(identifier: &DidIdentifier, version: u16) -> StorageKey {
	StorageKey(
		[
			storage_prefix(PROVIDER_PALLET, "IdentityCommitments").as_slice(),
			&blake2_128_concat(identifier),
			&twox_64_concat(&version),
		]
		.concat(),
	)
}

/// The relay parent number the latest parachain block was built on.
pub fn last_relay_chain_block_number() -> StorageKey {
	StorageKey(storage_prefix("ParachainSystem", "LastRelayChainBlockNumber").to_vec())
}

pub fn parachain_id() -> StorageKey {
	StorageKey(storage_prefix("ParachainInfo", "ParachainId").to_vec())
}

/// The consumer's local details for a DID, e.g. its replay-protection nonce.
pub fn identity_entry(consumer_pallet: &str, identifier: &DidIdentifier) -> StorageKey {
	StorageKey(
		[
			storage_prefix(consumer_pallet, "IdentityEntries").as_slice(),
			&twox_64_concat(identifier),
		]
		.concat(),
	)
}

pub fn block_number() -> StorageKey {
	StorageKey(storage_prefix("System", "Number").to_vec())
}

/// Every FRAME pallet stores its version under this key once deployed.
pub fn pallet_storage_version(pallet: &str) -> StorageKey {
	StorageKey([twox_128(pallet.as_bytes()), twox_128(STORAGE_VERSION_KEY)].concat())
}

#[cfg(test)]
mod tests {
	use super::*;

	use hex_literal::hex;
	use sp_core::crypto::{AccountId32, Ss58Codec};

	#[test]
	fn parachain_head_spiritnet() {
		assert_eq!(
			parachain_head(2_086).0,
			hex!("cd710b30bd2eab0352ddcc26417aa1941b3c252fcb29d88eff4f3de5de4476c32c0cfd6c23b92a7826080000").to_vec()
		);
	}

	#[test]
	fn parachain_head_peregrine() {
		assert_eq!(
			parachain_head(2_000).0,
			hex!("cd710b30bd2eab0352ddcc26417aa1941b3c252fcb29d88eff4f3de5de4476c363f5a4efb16ffa83d0070000").to_vec()
		);
	}

	#[test]
	fn identity_commitment_peregrine() {
		let (did, _) =
			AccountId32::from_ss58check_with_version("4s3jpR7pzrUdhVUqHHdWoBN6oNQHBC7WRo7zsXdjAzQPT7Cf").unwrap();
		assert_eq!(
			identity_commitment(&did, 0).0,
			hex!("b375edf06348b4330d1e88564111cb3d5bf19e4ed2927982e234d989e812f3f314c9211b34c8b43b2a18d67d5c96de9cb6caebbe9e3adeaaf693a2d198f2881d0b504fc72ed4ac0a7ed24a025fc228ce01a12dfa1fa4ab9a0000").to_vec()
		);
	}

	#[test]
	fn identity_entry_is_twox_64_concat() {
		let did = AccountId32::new([1u8; 32]);
		let key = identity_entry(DEFAULT_CONSUMER_PALLET, &did).0;

		assert_eq!(key[..32], storage_prefix("DipConsumer", "IdentityEntries"));
		assert_eq!(key[32..40], twox_64(&[1u8; 32]));
		assert_eq!(key[40..], [1u8; 32]);
	}

	#[test]
	fn system_number() {
		// Well-known key of `System::Number`.
		assert_eq!(
			block_number().0,
			hex!("26aa394eea5630e07c48ae0c9558cef702a5c1b19ab7a04f536c519aca4983ac").to_vec()
		);
	}
}
