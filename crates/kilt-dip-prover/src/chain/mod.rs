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

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use parity_scale_codec::HasCompact;
use sp_core::{storage::StorageKey, H256};
use sp_runtime::{generic::Header, traits::BlakeTwo256};
use thiserror::Error;

mod rpc;

pub use rpc::RpcChainClient;

/// Block number of any of the involved chains.
pub trait BlockNumber: sp_runtime::traits::BlockNumber + HasCompact + Send + Sync + 'static {}

impl<T> BlockNumber for T where T: sp_runtime::traits::BlockNumber + HasCompact + Send + Sync + 'static {}

/// All involved chains use the default Substrate header.
pub type ChainHeader<N> = Header<N, BlakeTwo256>;

/// The part a chain plays in generating a proof.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ChainRole {
	Relay,
	Provider,
	Consumer,
}

impl fmt::Display for ChainRole {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Relay => "relay",
			Self::Provider => "provider",
			Self::Consumer => "consumer",
		};
		f.write_str(name)
	}
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChainError {
	/// The connection failed or timed out. Retrying may succeed.
	#[error("transport error: {0}")]
	Transport(String),
	/// The node answered with an error.
	#[error("rpc error: {0}")]
	Rpc(String),
	#[error("failed to decode response: {0}")]
	Decode(String),
	#[error("client already disconnected")]
	Disconnected,
}

impl ChainError {
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Transport(_))
	}
}

impl From<parity_scale_codec::Error> for ChainError {
	fn from(value: parity_scale_codec::Error) -> Self {
		Self::Decode(value.to_string())
	}
}

/// Raw trie nodes proving a set of storage entries at a given block.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReadProof {
	pub at: H256,
	pub proof: Vec<Vec<u8>>,
}

/// Read-only access to a chain node.
///
/// Every call is idempotent, so callers may retry freely.
#[async_trait]
pub trait ChainClient: Send + Sync {
	type BlockNumber: BlockNumber;

	async fn finalized_head(&self) -> Result<H256, ChainError>;

	async fn best_head(&self) -> Result<H256, ChainError>;

	async fn header(&self, at: H256) -> Result<Option<ChainHeader<Self::BlockNumber>>, ChainError>;

	async fn block_hash(&self, number: Self::BlockNumber) -> Result<Option<H256>, ChainError>;

	/// Reads a storage entry at the given block, or at the best block if none
	/// is given.
	async fn storage(&self, key: &StorageKey, at: Option<H256>) -> Result<Option<Vec<u8>>, ChainError>;

	async fn read_proof(&self, keys: &[StorageKey], at: H256) -> Result<ReadProof, ChainError>;

	/// Calls a runtime API function with SCALE-encoded arguments.
	async fn runtime_call(&self, method: &str, data: &[u8], at: Option<H256>) -> Result<Vec<u8>, ChainError>;

	/// Closes the connection. Later calls fail with
	/// [`ChainError::Disconnected`].
	async fn disconnect(&self);
}

#[async_trait]
impl<C: ChainClient + ?Sized> ChainClient for Arc<C> {
	type BlockNumber = C::BlockNumber;

	async fn finalized_head(&self) -> Result<H256, ChainError> {
		(**self).finalized_head().await
	}

	async fn best_head(&self) -> Result<H256, ChainError> {
		(**self).best_head().await
	}

	async fn header(&self, at: H256) -> Result<Option<ChainHeader<Self::BlockNumber>>, ChainError> {
		(**self).header(at).await
	}

	async fn block_hash(&self, number: Self::BlockNumber) -> Result<Option<H256>, ChainError> {
		(**self).block_hash(number).await
	}

	async fn storage(&self, key: &StorageKey, at: Option<H256>) -> Result<Option<Vec<u8>>, ChainError> {
		(**self).storage(key, at).await
	}

	async fn read_proof(&self, keys: &[StorageKey], at: H256) -> Result<ReadProof, ChainError> {
		(**self).read_proof(keys, at).await
	}

	async fn runtime_call(&self, method: &str, data: &[u8], at: Option<H256>) -> Result<Vec<u8>, ChainError> {
		(**self).runtime_call(method, data, at).await
	}

	async fn disconnect(&self) {
		(**self).disconnect().await
	}
}

/// Decodes a SCALE value read from `chain`.
pub(crate) fn decode<T: parity_scale_codec::Decode>(chain: ChainRole, mut bytes: &[u8]) -> Result<T, crate::Error> {
	T::decode(&mut bytes).map_err(|e| crate::Error::ChainRequestFailed {
		chain,
		source: e.into(),
	})
}
