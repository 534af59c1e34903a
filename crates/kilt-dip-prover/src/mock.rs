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

use std::{
	collections::{BTreeMap, VecDeque},
	sync::{
		atomic::{AtomicBool, AtomicU32, Ordering},
		Arc, Mutex,
	},
};

use async_trait::async_trait;
use sp_core::{
	storage::{StateVersion, StorageKey},
	H256,
};
use sp_runtime::traits::{BlakeTwo256, Hash, Header as _};
use sp_state_machine::{prove_read, InMemoryBackend};

use crate::chain::{BlockNumber, ChainClient, ChainError, ChainHeader, ReadProof};

pub(crate) const PARA_ID: u32 = 2_000;

type Storage = BTreeMap<Vec<u8>, Vec<u8>>;
type RuntimeApi = Arc<dyn Fn(&str, &[u8], H256) -> Result<Vec<u8>, ChainError> + Send + Sync>;

fn backend(storage: &Storage) -> InMemoryBackend<BlakeTwo256> {
	InMemoryBackend::<BlakeTwo256>::from((storage.clone(), StateVersion::V1))
}

struct MockBlock<N> {
	header: ChainHeader<N>,
	hash: H256,
	storage: Storage,
}

pub(crate) struct MockChainBuilder<N> {
	blocks: BTreeMap<N, (Option<H256>, Storage)>,
	finalized: Vec<N>,
	best: Option<N>,
	failures: Vec<ChainError>,
	runtime_api: Option<RuntimeApi>,
}

impl<N> Default for MockChainBuilder<N> {
	fn default() -> Self {
		Self {
			blocks: BTreeMap::new(),
			finalized: Vec::new(),
			best: None,
			failures: Vec::new(),
			runtime_api: None,
		}
	}
}

impl<N: BlockNumber> MockChainBuilder<N> {
	pub(crate) fn with_block(self, number: N, storage: impl IntoIterator<Item = (StorageKey, Vec<u8>)>) -> Self {
		self.insert_block(number, None, storage)
	}

	/// Like [`Self::with_block`], but the block is reported under `hash`
	/// instead of its header hash.
	pub(crate) fn with_block_hash(
		self,
		number: N,
		hash: H256,
		storage: impl IntoIterator<Item = (StorageKey, Vec<u8>)>,
	) -> Self {
		self.insert_block(number, Some(hash), storage)
	}

	/// Every call to `finalized_head` reports the next of these blocks. The
	/// last one stays finalized.
	pub(crate) fn with_finalized(mut self, numbers: impl IntoIterator<Item = N>) -> Self {
		self.finalized = numbers.into_iter().collect();
		self
	}

	/// `best_head` reports this block instead of the highest one. Reads
	/// without a block still go to the highest block, as if the chain moved
	/// on after the best head was queried.
	pub(crate) fn with_best(mut self, number: N) -> Self {
		self.best = Some(number);
		self
	}

	/// The next calls fail with these errors, in order.
	pub(crate) fn with_failures(mut self, failures: impl IntoIterator<Item = ChainError>) -> Self {
		self.failures = failures.into_iter().collect();
		self
	}

	pub(crate) fn with_runtime_api(
		mut self,
		handler: impl Fn(&str, &[u8], H256) -> Result<Vec<u8>, ChainError> + Send + Sync + 'static,
	) -> Self {
		self.runtime_api = Some(Arc::new(handler));
		self
	}

	fn insert_block(
		mut self,
		number: N,
		hash: Option<H256>,
		storage: impl IntoIterator<Item = (StorageKey, Vec<u8>)>,
	) -> Self {
		let storage = storage.into_iter().map(|(key, value)| (key.0, value)).collect();
		self.blocks.insert(number, (hash, storage));
		self
	}

	pub(crate) fn build(self) -> MockChain<N> {
		let _ = env_logger::try_init();

		let mut blocks = BTreeMap::new();
		let mut parent_hash = H256::zero();
		for (number, (hash, storage)) in self.blocks {
			let header = ChainHeader::<N> {
				parent_hash,
				number,
				state_root: *backend(&storage).root(),
				extrinsics_root: BlakeTwo256::hash(&[]),
				digest: Default::default(),
			};
			let hash = hash.unwrap_or_else(|| header.hash());
			parent_hash = hash;
			blocks.insert(number, MockBlock { header, hash, storage });
		}

		MockChain {
			blocks,
			finalized: Mutex::new(self.finalized.into()),
			best: self.best,
			failures: Mutex::new(self.failures.into()),
			runtime_api: self.runtime_api,
			calls: AtomicU32::new(0),
			disconnected: AtomicBool::new(false),
		}
	}
}

/// An in-memory chain backed by real storage tries, so that read proofs
/// verify against the header state roots.
pub(crate) struct MockChain<N> {
	blocks: BTreeMap<N, MockBlock<N>>,
	finalized: Mutex<VecDeque<N>>,
	best: Option<N>,
	failures: Mutex<VecDeque<ChainError>>,
	runtime_api: Option<RuntimeApi>,
	calls: AtomicU32,
	disconnected: AtomicBool,
}

impl<N: BlockNumber> MockChain<N> {
	pub(crate) fn hash_of(&self, number: N) -> H256 {
		self.blocks.get(&number).expect("block not in mock chain").hash
	}

	pub(crate) fn header_of(&self, number: N) -> ChainHeader<N> {
		self.blocks.get(&number).expect("block not in mock chain").header.clone()
	}

	/// Number of requests received, including failed ones.
	pub(crate) fn calls(&self) -> u32 {
		self.calls.load(Ordering::SeqCst)
	}

	pub(crate) fn is_disconnected(&self) -> bool {
		self.disconnected.load(Ordering::SeqCst)
	}

	fn request(&self) -> Result<(), ChainError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		if self.is_disconnected() {
			return Err(ChainError::Disconnected);
		}
		match self.failures.lock().unwrap().pop_front() {
			Some(failure) => Err(failure),
			None => Ok(()),
		}
	}

	fn block(&self, at: Option<H256>) -> Result<&MockBlock<N>, ChainError> {
		let block = match at {
			Some(hash) => self.blocks.values().find(|block| block.hash == hash),
			None => self.blocks.values().next_back(),
		};
		block.ok_or_else(|| ChainError::Rpc(format!("unknown block {at:?}")))
	}
}

#[async_trait]
impl<N: BlockNumber> ChainClient for MockChain<N> {
	type BlockNumber = N;

	async fn finalized_head(&self) -> Result<H256, ChainError> {
		self.request()?;
		let number = {
			let mut finalized = self.finalized.lock().unwrap();
			if finalized.len() > 1 {
				finalized.pop_front()
			} else {
				finalized.front().copied()
			}
		};
		let number = number.ok_or_else(|| ChainError::Rpc("nothing finalized".into()))?;
		Ok(self.hash_of(number))
	}

	async fn best_head(&self) -> Result<H256, ChainError> {
		self.request()?;
		let block = match self.best {
			Some(number) => self.blocks.get(&number),
			None => self.blocks.values().next_back(),
		};
		block
			.map(|block| block.hash)
			.ok_or_else(|| ChainError::Rpc("no best block".into()))
	}

	async fn header(&self, at: H256) -> Result<Option<ChainHeader<N>>, ChainError> {
		self.request()?;
		Ok(self.block(Some(at)).ok().map(|block| block.header.clone()))
	}

	async fn block_hash(&self, number: N) -> Result<Option<H256>, ChainError> {
		self.request()?;
		Ok(self.blocks.get(&number).map(|block| block.hash))
	}

	async fn storage(&self, key: &StorageKey, at: Option<H256>) -> Result<Option<Vec<u8>>, ChainError> {
		self.request()?;
		Ok(self.block(at)?.storage.get(&key.0).cloned())
	}

	async fn read_proof(&self, keys: &[StorageKey], at: H256) -> Result<ReadProof, ChainError> {
		self.request()?;
		let block = self.block(Some(at))?;
		let proof = prove_read(backend(&block.storage), keys.iter().map(|key| &key.0))
			.map_err(|e| ChainError::Rpc(e.to_string()))?;
		Ok(ReadProof {
			at,
			proof: proof.into_iter_nodes().collect(),
		})
	}

	async fn runtime_call(&self, method: &str, data: &[u8], at: Option<H256>) -> Result<Vec<u8>, ChainError> {
		self.request()?;
		let at = self.block(at)?.hash;
		let runtime_api = self
			.runtime_api
			.as_ref()
			.ok_or_else(|| ChainError::Rpc(format!("method {method} not found")))?;
		runtime_api(method, data, at)
	}

	async fn disconnect(&self) {
		self.disconnected.store(true, Ordering::SeqCst);
	}
}
