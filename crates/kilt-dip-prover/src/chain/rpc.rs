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

use std::marker::PhantomData;

use async_trait::async_trait;
use jsonrpsee::{
	core::{client::ClientT, params::ArrayParams, ClientError},
	rpc_params,
	ws_client::{WsClient, WsClientBuilder},
};
use serde::{de::DeserializeOwned, Deserialize};
use sp_core::{storage::StorageKey, Bytes, H256};
use sp_runtime::traits::UniqueSaturatedInto;
use tokio::sync::RwLock;

use crate::chain::{BlockNumber, ChainClient, ChainError, ChainHeader, ReadProof};

const LOG_TARGET: &str = "dip::prover::rpc";

impl From<ClientError> for ChainError {
	fn from(value: ClientError) -> Self {
		match value {
			ClientError::Call(err) => Self::Rpc(err.message().to_owned()),
			ClientError::ParseError(err) => Self::Decode(err.to_string()),
			other => Self::Transport(other.to_string()),
		}
	}
}

/// Response of `state_getReadProof`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReadProof {
	at: H256,
	proof: Vec<Bytes>,
}

/// A [`ChainClient`] talking to a node over its WebSocket JSON-RPC endpoint.
pub struct RpcChainClient<N> {
	endpoint: String,
	client: RwLock<Option<WsClient>>,
	_block_number: PhantomData<N>,
}

impl<N> RpcChainClient<N> {
	pub async fn connect(endpoint: &str) -> Result<Self, ChainError> {
		log::debug!(target: LOG_TARGET, "Connecting to {endpoint}");
		let client = WsClientBuilder::default().build(endpoint).await?;
		log::info!(target: LOG_TARGET, "Connected to {endpoint}");
		Ok(Self {
			endpoint: endpoint.to_owned(),
			client: RwLock::new(Some(client)),
			_block_number: PhantomData,
		})
	}

	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	async fn request<R: DeserializeOwned>(&self, method: &str, params: ArrayParams) -> Result<R, ChainError> {
		let guard = self.client.read().await;
		let client = guard.as_ref().ok_or(ChainError::Disconnected)?;
		log::trace!(target: LOG_TARGET, "{} <- {method}", self.endpoint);
		let response = client.request(method, params).await;
		if let Err(ref err) = response {
			log::debug!(target: LOG_TARGET, "{} -> {method} failed: {err}", self.endpoint);
		}
		Ok(response?)
	}
}

#[async_trait]
impl<N: BlockNumber> ChainClient for RpcChainClient<N> {
	type BlockNumber = N;

	async fn finalized_head(&self) -> Result<H256, ChainError> {
		self.request("chain_getFinalizedHead", rpc_params![]).await
	}

	async fn best_head(&self) -> Result<H256, ChainError> {
		let hash: Option<H256> = self.request("chain_getBlockHash", rpc_params![]).await?;
		hash.ok_or_else(|| ChainError::Rpc("no best block".into()))
	}

	async fn header(&self, at: H256) -> Result<Option<ChainHeader<N>>, ChainError> {
		self.request("chain_getHeader", rpc_params![at]).await
	}

	async fn block_hash(&self, number: N) -> Result<Option<H256>, ChainError> {
		let number: u64 = number.unique_saturated_into();
		self.request("chain_getBlockHash", rpc_params![number]).await
	}

	async fn storage(&self, key: &StorageKey, at: Option<H256>) -> Result<Option<Vec<u8>>, ChainError> {
		let value: Option<Bytes> = self.request("state_getStorage", rpc_params![key, at]).await?;
		Ok(value.map(|bytes| bytes.0))
	}

	async fn read_proof(&self, keys: &[StorageKey], at: H256) -> Result<ReadProof, ChainError> {
		let response: RpcReadProof = self.request("state_getReadProof", rpc_params![keys, at]).await?;
		Ok(ReadProof {
			at: response.at,
			proof: response.proof.into_iter().map(|node| node.0).collect(),
		})
	}

	async fn runtime_call(&self, method: &str, data: &[u8], at: Option<H256>) -> Result<Vec<u8>, ChainError> {
		let response: Bytes = self
			.request("state_call", rpc_params![method, Bytes(data.to_vec()), at])
			.await?;
		Ok(response.0)
	}

	async fn disconnect(&self) {
		if self.client.write().await.take().is_some() {
			log::info!(target: LOG_TARGET, "Disconnected from {}", self.endpoint);
		}
	}
}
