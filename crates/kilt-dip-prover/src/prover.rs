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

use parity_scale_codec::Encode;
use sp_core::{crypto::AccountId32, H256};
use sp_runtime::traits::{Saturating, Zero};

use crate::{
	anchor::{finalized_anchor, select_anchors, AnchorPolicy, AnchorSet},
	call::{self, CallInfo},
	chain::{decode, ChainClient, ChainRole},
	did::{did_uri, DidIdentifier, DidKeyMaterial, DidKeySet},
	envelope::{check_version, DipEnvelope, ProofLimits, RelayTopology, TimeBoundDidSignature},
	merkle::{generate_commitment_proof, CommitmentProof, CommitmentProofRequest, LinkableAccountId},
	payload::{EncodedCall, SignaturePayload},
	retry::RetryPolicy,
	signature::{sign_payload, DidSigner},
	state_proofs::{commitment_root_proof, relay_head_proof, CommitmentRootProof, RelayHeadProof},
	storage::{self, DEFAULT_CONSUMER_PALLET},
	DipRuntimeTypes, Error,
};

const LOG_TARGET: &str = "dip::prover";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProverConfig {
	pub topology: RelayTopology,
	/// The identity commitment version to prove.
	pub version: u16,
	/// The proof version the consumer runtime verifies.
	pub expected_version: u16,
	/// The provider's para ID. Read from the provider chain if not set.
	pub para_id: Option<u32>,
	/// Name of the `DipConsumer` pallet in the consumer runtime.
	pub consumer_pallet: String,
	/// How many blocks past the current consumer block the signature stays
	/// valid.
	pub signature_validity: u32,
	/// Appended to the signed payload, the encoding of the consumer runtime's
	/// signed extra.
	pub signed_extra: Vec<u8>,
	pub retry: RetryPolicy,
	pub anchor: AnchorPolicy,
	pub limits: ProofLimits,
}

impl Default for ProverConfig {
	fn default() -> Self {
		Self {
			topology: RelayTopology::default(),
			version: 0,
			expected_version: 0,
			para_id: None,
			consumer_pallet: DEFAULT_CONSUMER_PALLET.to_owned(),
			signature_validity: 0,
			signed_extra: Vec::new(),
			retry: RetryPolicy::default(),
			anchor: AnchorPolicy::default(),
			limits: ProofLimits::default(),
		}
	}
}

/// A call to dispatch on the consumer chain on behalf of a DID.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DipRequest {
	pub identifier: DidIdentifier,
	/// The encoded call, as it will be dispatched.
	pub call: EncodedCall,
	/// What `call` is, which decides the key that must sign it.
	pub call_info: CallInfo,
	pub keys: DidKeySet,
	/// The account submitting `dispatch_as` on the consumer chain.
	pub submitter: AccountId32,
	/// Linked accounts to reveal in the DID Merkle proof.
	pub accounts: Vec<LinkableAccountId>,
	pub include_web3_name: bool,
}

/// All proofs of the proof branch, generated against a single anchor set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AnchoredProofs<RelayBlockNumber, ProviderBlockNumber> {
	pub anchors: AnchorSet<RelayBlockNumber, ProviderBlockNumber>,
	pub relay_head: RelayHeadProof<RelayBlockNumber, ProviderBlockNumber>,
	pub commitment: CommitmentRootProof<ProviderBlockNumber>,
	pub merkle: CommitmentProof<ProviderBlockNumber>,
}

pub type DipEnvelopeOf<T> = DipEnvelope<
	<T as DipRuntimeTypes>::RelayBlockNumber,
	<T as DipRuntimeTypes>::ProviderBlockNumber,
	<T as DipRuntimeTypes>::ConsumerBlockNumber,
>;

/// Builds DIP envelopes from the three chains involved and a DID signer.
pub struct DipProver<T, R, P, C, S> {
	relay: R,
	provider: P,
	consumer: C,
	signer: S,
	config: ProverConfig,
	_runtime_types: PhantomData<T>,
}

impl<T, R, P, C, S> DipProver<T, R, P, C, S>
where
	T: DipRuntimeTypes,
	R: ChainClient<BlockNumber = T::RelayBlockNumber>,
	P: ChainClient<BlockNumber = T::ProviderBlockNumber>,
	C: ChainClient<BlockNumber = T::ConsumerBlockNumber>,
	S: DidSigner,
{
	pub fn new(relay: R, provider: P, consumer: C, signer: S, config: ProverConfig) -> Self {
		Self {
			relay,
			provider,
			consumer,
			signer,
			config,
			_runtime_types: PhantomData,
		}
	}

	pub fn config(&self) -> &ProverConfig {
		&self.config
	}

	/// Builds the envelope authorizing `request.call`.
	///
	/// Fails without touching any chain if the call contradicts its declared
	/// indices, the DID lacks the key the call needs, or the configured
	/// versions disagree.
	pub async fn build_envelope(&self, request: &DipRequest) -> Result<DipEnvelopeOf<T>, Error> {
		call::check_indices(&request.call_info, &request.call)?;
		let key = call::resolve_key(&request.call_info, &request.keys)?;
		check_version(self.config.version, self.config.expected_version)?;
		log::info!(
			target: LOG_TARGET,
			"Building DIP proof v{} for {} to dispatch {} with its {:?} key",
			self.config.version,
			did_uri(&request.identifier),
			request.call_info,
			key.relationship()
		);

		let (signature, proofs) = futures::try_join!(self.sign(request, key), self.anchored_proofs(request, key))?;

		let envelope = DipEnvelope::assemble(
			self.config.topology,
			request.identifier.clone(),
			proofs.relay_head,
			proofs.commitment,
			proofs.merkle,
			signature,
			request.call.clone(),
			&self.config.limits,
		)?;
		log::info!(
			target: LOG_TARGET,
			"Built {} envelope anchored at relay block #{} and provider block #{}",
			self.config.topology,
			proofs.anchors.relay.number,
			proofs.anchors.commitment.number
		);
		Ok(envelope)
	}

	/// Closes the connections to all three chains.
	pub async fn disconnect(&self) {
		futures::join!(
			self.relay.disconnect(),
			self.provider.disconnect(),
			self.consumer.disconnect()
		);
	}

	/// The signature branch: reads the consumer state the payload depends on
	/// and has the DID sign it.
	async fn sign(
		&self,
		request: &DipRequest,
		key: &DidKeyMaterial,
	) -> Result<TimeBoundDidSignature<T::ConsumerBlockNumber>, Error> {
		let retry = &self.config.retry;
		let consumer = &self.consumer;
		let role = ChainRole::Consumer;

		// All consumer state is read at the same block.
		let at = retry.run(role, "best head", || consumer.best_head()).await?;
		log::debug!(target: LOG_TARGET, "Reading consumer state at block {at:?}");

		let pallet_version_key = storage::pallet_storage_version(&self.config.consumer_pallet);
		let pallet_version = retry
			.run(role, "consumer pallet version", || {
				consumer.storage(&pallet_version_key, Some(at))
			})
			.await?;
		if pallet_version.is_none() {
			return Err(Error::ProtocolUnsupported {
				chain: role,
				pallet: self.config.consumer_pallet.clone(),
			});
		}

		let number_key = storage::block_number();
		let details_key = storage::identity_entry(&self.config.consumer_pallet, &request.identifier);
		let (genesis_hash, block_number, identity_details) = futures::try_join!(
			retry.run(role, "genesis hash", || consumer.block_hash(Zero::zero())),
			retry.run(role, "block number", || consumer.storage(&number_key, Some(at))),
			retry.run(role, "identity details", || consumer.storage(&details_key, Some(at))),
		)?;
		let genesis_hash: H256 = genesis_hash.ok_or_else(|| Error::AnchorUnavailable {
			chain: role,
			reason: "no genesis block".into(),
		})?;
		let current_block: T::ConsumerBlockNumber = match block_number {
			Some(encoded) => decode(role, &encoded)?,
			None => {
				return Err(Error::AnchorUnavailable {
					chain: role,
					reason: "no current block number".into(),
				})
			}
		};
		let identity_details: Option<T::IdentityDetails> = identity_details
			.map(|encoded| decode(role, &encoded))
			.transpose()?;
		let block_number = current_block.saturating_add(self.config.signature_validity.into());

		let payload = SignaturePayload {
			call: request.call.clone(),
			identity_details,
			submitter: request.submitter.clone(),
			block_number,
			genesis_hash,
			signed_extra: self.config.signed_extra.clone(),
		};
		log::debug!(
			target: LOG_TARGET,
			"Signature payload for consumer block #{block_number}: {payload:?}"
		);
		let signature = sign_payload(&self.signer, &payload.encode(), key).await?;
		Ok(TimeBoundDidSignature {
			signature,
			block_number,
		})
	}

	/// The proof branch: selects anchors and generates all proofs against
	/// them, starting over if the anchors turn out inconsistent or stale.
	async fn anchored_proofs(
		&self,
		request: &DipRequest,
		key: &DidKeyMaterial,
	) -> Result<AnchoredProofs<T::RelayBlockNumber, T::ProviderBlockNumber>, Error> {
		let retry = &self.config.retry;
		let policy = self.config.anchor;
		let commitment_request = CommitmentProofRequest {
			identifier: request.identifier.clone(),
			version: self.config.version,
			signing_key: key.clone(),
			accounts: request.accounts.clone(),
			include_web3_name: request.include_web3_name,
		};

		let attempts = policy.max_attempts.max(1);
		for attempt in 1..=attempts {
			if attempt > 1 {
				tokio::time::sleep(policy.delay).await;
			}
			let anchors = select_anchors(&self.relay, &self.provider, self.config.para_id, retry).await?;
			let (relay_head, commitment, merkle) = futures::try_join!(
				relay_head_proof::<_, T::ProviderBlockNumber>(&self.relay, &anchors.relay, anchors.para_id, retry),
				commitment_root_proof(
					&self.provider,
					&anchors.commitment,
					&request.identifier,
					self.config.version,
					retry
				),
				generate_commitment_proof::<_, T::ProofError>(
					&self.provider,
					&anchors.commitment,
					&commitment_request,
					retry
				),
			)?;

			if !relay_head.proves(&anchors.commitment) {
				log::warn!(
					target: LOG_TARGET,
					"Relay block #{} records provider head #{}, not #{} (attempt {attempt}/{attempts})",
					anchors.relay.number,
					relay_head.provider_header.number,
					anchors.commitment.number
				);
				continue;
			}
			let latest = finalized_anchor(&self.provider, ChainRole::Provider, retry).await?;
			if anchors.is_stale(latest.number, policy.max_age) {
				log::warn!(
					target: LOG_TARGET,
					"Anchor at provider block #{} is stale, provider finalized #{} meanwhile (attempt {attempt}/{attempts})",
					anchors.provider_finalized.number,
					latest.number
				);
				continue;
			}

			return Ok(AnchoredProofs {
				anchors,
				relay_head,
				commitment,
				merkle,
			});
		}
		Err(Error::AnchorExpired { attempts })
	}
}
