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

//! Selection of the blocks all proofs are generated against.
//!
//! A parachain block `N` is built on top of some relay parent `R`. The relay
//! block `R` stores the head of the provider block that was included last,
//! which is the parent `N - 1`. So once the provider's finalized block and its
//! relay parent are known, the provider state must be proven at `N - 1` for
//! the proofs to chain up.

use std::time::Duration;

use sp_core::H256;
use sp_runtime::traits::{CheckedSub, One, Saturating};

use crate::{
	chain::{decode, ChainClient, ChainHeader, ChainRole},
	retry::RetryPolicy,
	storage, Error,
};

const LOG_TARGET: &str = "dip::prover::anchor";

/// A block of one of the involved chains.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChainAnchor<N> {
	pub chain: ChainRole,
	pub number: N,
	pub hash: H256,
}

/// The mutually consistent blocks a single envelope is built from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AnchorSet<RelayBlockNumber, ProviderBlockNumber> {
	pub para_id: u32,
	/// The provider block whose relay parent is [`Self::relay`].
	pub provider_finalized: ChainAnchor<ProviderBlockNumber>,
	/// The relay block the parachain head is proven at.
	pub relay: ChainAnchor<RelayBlockNumber>,
	/// The provider block the identity commitment is proven at, the parent of
	/// [`Self::provider_finalized`].
	pub commitment: ChainAnchor<ProviderBlockNumber>,
}

impl<RelayBlockNumber, ProviderBlockNumber> AnchorSet<RelayBlockNumber, ProviderBlockNumber>
where
	ProviderBlockNumber: crate::chain::BlockNumber,
{
	/// Whether the provider chain finalized more than `max_age` blocks since
	/// the anchors were selected.
	pub fn is_stale(&self, latest_finalized: ProviderBlockNumber, max_age: u32) -> bool {
		latest_finalized.saturating_sub(self.provider_finalized.number) > max_age.into()
	}
}

/// When to give up on an anchor set and select a new one.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AnchorPolicy {
	/// How many anchor sets are tried before failing with
	/// [`Error::AnchorExpired`].
	pub max_attempts: u32,
	/// How many provider blocks may be finalized on top of the anchor while
	/// the proofs are generated.
	pub max_age: u32,
	/// Pause before selecting a new anchor set.
	pub delay: Duration,
}

impl Default for AnchorPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			max_age: 5,
			delay: Duration::from_secs(6),
		}
	}
}

/// The latest finalized block of `client`.
pub async fn finalized_anchor<C: ChainClient>(
	client: &C,
	chain: ChainRole,
	retry: &RetryPolicy,
) -> Result<ChainAnchor<C::BlockNumber>, Error> {
	let hash = retry.run(chain, "finalized head", || client.finalized_head()).await?;
	let header = header_at(client, chain, hash, retry).await?;
	Ok(ChainAnchor {
		chain,
		number: header.number,
		hash,
	})
}

pub(crate) async fn header_at<C: ChainClient>(
	client: &C,
	chain: ChainRole,
	hash: H256,
	retry: &RetryPolicy,
) -> Result<ChainHeader<C::BlockNumber>, Error> {
	retry
		.run(chain, "header", || client.header(hash))
		.await?
		.ok_or_else(|| Error::AnchorUnavailable {
			chain,
			reason: format!("header of block {hash:?} not found"),
		})
}

async fn block_at<C: ChainClient>(
	client: &C,
	chain: ChainRole,
	number: C::BlockNumber,
	retry: &RetryPolicy,
) -> Result<ChainAnchor<C::BlockNumber>, Error> {
	let hash = retry
		.run(chain, "block hash", || client.block_hash(number))
		.await?
		.ok_or_else(|| Error::AnchorUnavailable {
			chain,
			reason: format!("no block at height {number}"),
		})?;
	Ok(ChainAnchor { chain, number, hash })
}

/// Selects the relay and provider blocks to prove against, starting from the
/// provider's latest finalized block.
///
/// If `para_id` is not given, the provider's own `ParachainInfo` is used.
pub async fn select_anchors<R, P>(
	relay: &R,
	provider: &P,
	para_id: Option<u32>,
	retry: &RetryPolicy,
) -> Result<AnchorSet<R::BlockNumber, P::BlockNumber>, Error>
where
	R: ChainClient,
	P: ChainClient,
{
	let provider_finalized = finalized_anchor(provider, ChainRole::Provider, retry).await?;
	let at = Some(provider_finalized.hash);

	let relay_parent_key = storage::last_relay_chain_block_number();
	let relay_parent = retry
		.run(ChainRole::Provider, "last relay chain block number", || {
			provider.storage(&relay_parent_key, at)
		})
		.await?
		.ok_or_else(|| Error::AnchorUnavailable {
			chain: ChainRole::Relay,
			reason: format!(
				"provider block {} does not record its relay parent",
				provider_finalized.number
			),
		})?;
	let relay_number: R::BlockNumber = decode(ChainRole::Provider, &relay_parent)?;

	let para_id = match para_id {
		Some(para_id) => para_id,
		None => {
			let para_id_key = storage::parachain_id();
			let encoded = retry
				.run(ChainRole::Provider, "parachain id", || provider.storage(&para_id_key, at))
				.await?
				.ok_or_else(|| Error::AnchorUnavailable {
					chain: ChainRole::Provider,
					reason: "provider is not a parachain".into(),
				})?;
			decode(ChainRole::Provider, &encoded)?
		}
	};

	let relay_anchor = block_at(relay, ChainRole::Relay, relay_number, retry).await?;

	let commitment_number = provider_finalized
		.number
		.checked_sub(&One::one())
		.ok_or_else(|| Error::AnchorUnavailable {
			chain: ChainRole::Provider,
			reason: "finalized block is the genesis block".into(),
		})?;
	let commitment = block_at(provider, ChainRole::Provider, commitment_number, retry).await?;

	log::info!(
		target: LOG_TARGET,
		"Selected anchors: provider #{} ({:?}), relay #{} ({:?}), commitment #{} ({:?})",
		provider_finalized.number,
		provider_finalized.hash,
		relay_anchor.number,
		relay_anchor.hash,
		commitment.number,
		commitment.hash,
	);

	Ok(AnchorSet {
		para_id,
		provider_finalized,
		relay: relay_anchor,
		commitment,
	})
}
