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

use std::time::Duration;

use anyhow::Context;
use kilt_dip_prover::{
	anchor::AnchorPolicy,
	call::{CallIndices, CallInfo},
	did::{parse_did_uri, DidIdentifier, DidKeySet, KeyAlgorithm},
	envelope::{ProofLimits, RelayTopology},
	merkle::LinkableAccountId,
	payload::EncodedCall,
	retry::RetryPolicy,
	storage::DEFAULT_CONSUMER_PALLET,
	DipRequest, ProverConfig,
};
use sp_core::crypto::AccountId32;

/// Index of the `DipConsumer` pallet in the DIP consumer template runtime.
const DEFAULT_CONSUMER_PALLET_INDEX: u8 = 40;

#[derive(Debug, clap::Parser)]
#[command(
	version,
	args_override_self = true,
	about = "Builds a `dispatch_as` call that authorizes a call on a DIP consumer chain with a KILT DID."
)]
pub struct Cli {
	#[command(flatten)]
	pub endpoints: EndpointArgs,

	#[command(flatten)]
	pub did: DidArgs,

	#[command(flatten)]
	pub call: CallArgs,

	#[command(flatten)]
	pub proof: ProofArgs,

	/// Print the result as JSON.
	#[arg(long)]
	pub json: bool,

	/// More logging. Repeat for more detail. `RUST_LOG` takes precedence.
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,
}

#[derive(Debug, clap::Args)]
pub struct EndpointArgs {
	#[arg(long = "relay", env = "RELAY_WS_ADDRESS")]
	pub relay: String,

	#[arg(long = "provider", env = "PROVIDER_WS_ADDRESS")]
	pub provider: String,

	#[arg(long = "consumer", env = "CONSUMER_WS_ADDRESS")]
	pub consumer: String,
}

#[derive(Debug, clap::Args)]
pub struct DidArgs {
	/// `did:kilt:<address>` of the DID authorizing the call.
	#[arg(long = "did", env = "DID_URI", value_parser = parse_did_uri)]
	pub did: DidIdentifier,

	/// Base mnemonic the key derivation paths are appended to.
	#[arg(long, env = "DID_MNEMONIC", hide_env_values = true)]
	pub did_mnemonic: Option<String>,

	#[command(flatten)]
	pub authentication: AuthenticationKeyArgs,

	#[command(flatten)]
	pub assertion_method: AssertionKeyArgs,

	#[command(flatten)]
	pub capability_delegation: DelegationKeyArgs,
}

#[derive(Debug, clap::Args)]
pub struct AuthenticationKeyArgs {
	/// Secret URI of the authentication key. Defaults to `//Alice`.
	#[arg(long = "auth-mnemonic", env = "AUTH_MNEMONIC", hide_env_values = true)]
	pub mnemonic: Option<String>,

	#[arg(long = "auth-derivation-path", env = "AUTH_DERIVATION_PATH")]
	pub derivation_path: Option<String>,

	#[arg(long = "auth-key-type", env = "AUTH_KEY_TYPE", default_value = "sr25519")]
	pub key_type: KeyAlgorithm,
}

#[derive(Debug, clap::Args)]
pub struct AssertionKeyArgs {
	#[arg(long = "att-mnemonic", env = "ATT_MNEMONIC", hide_env_values = true)]
	pub mnemonic: Option<String>,

	#[arg(long = "att-derivation-path", env = "ATT_DERIVATION_PATH")]
	pub derivation_path: Option<String>,

	#[arg(long = "att-key-type", env = "ATT_KEY_TYPE", default_value = "sr25519")]
	pub key_type: KeyAlgorithm,
}

#[derive(Debug, clap::Args)]
pub struct DelegationKeyArgs {
	#[arg(long = "del-mnemonic", env = "DEL_MNEMONIC", hide_env_values = true)]
	pub mnemonic: Option<String>,

	#[arg(long = "del-derivation-path", env = "DEL_DERIVATION_PATH")]
	pub derivation_path: Option<String>,

	#[arg(long = "del-key-type", env = "DEL_KEY_TYPE", default_value = "sr25519")]
	pub key_type: KeyAlgorithm,
}

#[derive(Debug, clap::Args)]
pub struct CallArgs {
	/// Hex-encoded call to dispatch on the consumer chain.
	#[arg(long = "encoded-call", env = "ENCODED_CALL", value_parser = EncodedCall::from_hex)]
	pub encoded_call: EncodedCall,

	/// What the encoded call is, as `Pallet::function`. Decides the DID key
	/// that signs, and is not checked against the encoded call unless
	/// `--call-index` is given.
	#[arg(long = "call", env = "CALL")]
	pub call: CallInfo,

	/// Pallet and call index `--call` has in the consumer runtime, as
	/// `PALLET_INDEX:CALL_INDEX`. The encoded call must start with them.
	#[arg(long = "call-index", env = "CALL_INDEX")]
	pub call_index: Option<CallIndices>,

	/// Calls wrapped by a batch call, as `Pallet::function`.
	#[arg(long = "nested-call", env = "NESTED_CALLS", value_delimiter = ',')]
	pub nested_calls: Vec<CallInfo>,

	/// Account submitting the `dispatch_as` extrinsic on the consumer chain.
	#[arg(long = "submitter", env = "SUBMITTER_ADDRESS")]
	pub submitter: AccountId32,

	/// Linked accounts to reveal, as SS58 or `0x`-prefixed 20-byte address.
	#[arg(long = "account", env = "LINKED_ACCOUNTS", value_delimiter = ',')]
	pub accounts: Vec<LinkableAccountId>,

	/// Reveal the DID's web3name.
	#[arg(long = "include-web3name", env = "INCLUDE_WEB3NAME")]
	pub include_web3_name: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum RuntimePreset {
	/// Peregrine or Spiritnet as provider.
	Kilt,
	/// The DIP template chains.
	Template,
}

#[derive(Debug, clap::Args)]
pub struct ProofArgs {
	/// How the provider and consumer relate to the relay chain.
	#[arg(long, env = "DIP_TOPOLOGY", default_value = "parent")]
	pub topology: RelayTopology,

	#[arg(long, env = "DIP_RUNTIME", value_enum, default_value = "template")]
	pub runtime: RuntimePreset,

	#[arg(long = "proof-version", env = "DIP_PROOF_VERSION", default_value_t = 0)]
	pub version: u16,

	/// Proof version the consumer verifies. Same as `--proof-version` if not set.
	#[arg(long)]
	pub expected_version: Option<u16>,

	/// Provider para ID. Read from the provider chain if not set.
	#[arg(long, env = "PROVIDER_PARA_ID")]
	pub para_id: Option<u32>,

	#[arg(long, default_value = DEFAULT_CONSUMER_PALLET)]
	pub consumer_pallet: String,

	#[arg(long, default_value_t = DEFAULT_CONSUMER_PALLET_INDEX)]
	pub consumer_pallet_index: u8,

	/// Blocks past the current consumer block the signature stays valid.
	#[arg(long, default_value_t = 0)]
	pub signature_validity: u32,

	/// Hex-encoded signed extra of the consumer runtime.
	#[arg(long)]
	pub signed_extra: Option<String>,

	#[arg(long, default_value_t = RetryPolicy::default().max_attempts)]
	pub retry_attempts: u32,

	#[arg(long, default_value_t = 2_000)]
	pub retry_delay_ms: u64,

	#[arg(long, default_value_t = AnchorPolicy::default().max_attempts)]
	pub anchor_attempts: u32,

	/// Provider blocks that may be finalized on top of the anchor.
	#[arg(long, default_value_t = AnchorPolicy::default().max_age)]
	pub anchor_max_age: u32,

	#[arg(long, default_value_t = 6_000)]
	pub anchor_delay_ms: u64,
}

impl Cli {
	pub fn request(&self, keys: DidKeySet) -> DipRequest {
		DipRequest {
			identifier: self.did.did.clone(),
			call: self.call.encoded_call.clone(),
			call_info: self
				.call
				.call
				.clone()
				.with_indices(self.call.call_index)
				.with_nested(self.call.nested_calls.clone()),
			keys,
			submitter: self.call.submitter.clone(),
			accounts: self.call.accounts.clone(),
			include_web3_name: self.call.include_web3_name,
		}
	}

	pub fn prover_config(&self) -> anyhow::Result<ProverConfig> {
		let proof = &self.proof;
		let signed_extra = match &proof.signed_extra {
			Some(value) => hex::decode(value.trim_start_matches("0x")).context("invalid signed extra")?,
			None => Vec::new(),
		};
		Ok(ProverConfig {
			topology: proof.topology,
			version: proof.version,
			expected_version: proof.expected_version.unwrap_or(proof.version),
			para_id: proof.para_id,
			consumer_pallet: proof.consumer_pallet.clone(),
			signature_validity: proof.signature_validity,
			signed_extra,
			retry: RetryPolicy {
				max_attempts: proof.retry_attempts.max(1),
				delay: Duration::from_millis(proof.retry_delay_ms),
			},
			anchor: AnchorPolicy {
				max_attempts: proof.anchor_attempts.max(1),
				max_age: proof.anchor_max_age,
				delay: Duration::from_millis(proof.anchor_delay_ms),
			},
			limits: ProofLimits::default(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use clap::Parser;

	const ALICE_DID: &str = "did:kilt:4s3jpR7pzrUdhVUqHHdWoBN6oNQHBC7WRo7zsXdjAzQPT7Cf";
	const BOB: &str = "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty";

	fn args(extra: &[&str]) -> Vec<String> {
		[
			"dip-prover",
			"--relay",
			"ws://127.0.0.1:9944",
			"--provider",
			"ws://127.0.0.1:9945",
			"--consumer",
			"ws://127.0.0.1:9946",
			"--did",
			ALICE_DID,
			"--encoded-call",
			"0x0a00",
			"--call",
			"PostIt::post",
			"--submitter",
			BOB,
		]
		.iter()
		.chain(extra)
		.map(|arg| arg.to_string())
		.collect()
	}

	#[test]
	fn defaults() {
		let cli = Cli::try_parse_from(args(&[])).unwrap();
		let config = cli.prover_config().unwrap();

		assert_eq!(config.topology, RelayTopology::Parent);
		assert_eq!(config.version, 0);
		assert_eq!(config.expected_version, 0);
		assert_eq!(config.consumer_pallet, DEFAULT_CONSUMER_PALLET);
		assert_eq!(config.retry, RetryPolicy::default());
		assert_eq!(config.anchor, AnchorPolicy::default());
		assert!(config.signed_extra.is_empty());
		assert_eq!(cli.proof.consumer_pallet_index, DEFAULT_CONSUMER_PALLET_INDEX);
		assert!(matches!(cli.did.authentication.key_type, KeyAlgorithm::Sr25519));
		assert!(!cli.call.include_web3_name);
	}

	#[test]
	fn nested_calls_and_accounts() {
		let cli = Cli::try_parse_from(args(&[
			"--call",
			"Utility::batch",
			"--nested-call",
			"PostIt::post,PostIt::vote",
			"--account",
			BOB,
			"--account",
			"0x1111111111111111111111111111111111111111",
			"--include-web3name",
			"--topology",
			"sibling",
			"--signed-extra",
			"0x0102",
		]))
		.unwrap();

		assert_eq!(
			cli.call.nested_calls,
			vec![CallInfo::new("PostIt", "post"), CallInfo::new("PostIt", "vote")]
		);
		assert_eq!(cli.call.accounts.len(), 2);
		assert!(cli.call.include_web3_name);

		let config = cli.prover_config().unwrap();
		assert_eq!(config.topology, RelayTopology::Sibling);
		assert_eq!(config.signed_extra, vec![1, 2]);
	}

	#[test]
	fn call_index_is_attached_to_the_call() {
		let keys = DidKeySet::new(
			kilt_dip_prover::signature::DidKeyPair::from_suri(KeyAlgorithm::Sr25519, "//Alice")
				.unwrap()
				.key_material(kilt_dip_prover::did::DidVerificationKeyRelationship::Authentication),
		);

		let cli = Cli::try_parse_from(args(&["--call-index", "10:0"])).unwrap();
		let request = cli.request(keys.clone());
		assert_eq!(request.call_info.indices, Some(CallIndices { pallet: 10, call: 0 }));
		assert!(kilt_dip_prover::call::check_indices(&request.call_info, &request.call).is_ok());

		let cli = Cli::try_parse_from(args(&["--call-index", "11:0"])).unwrap();
		let request = cli.request(keys.clone());
		assert!(kilt_dip_prover::call::check_indices(&request.call_info, &request.call).is_err());

		let cli = Cli::try_parse_from(args(&[])).unwrap();
		assert_eq!(cli.request(keys).call_info.indices, None);

		assert!(Cli::try_parse_from(args(&["--call-index", "post"])).is_err());
	}

	#[test]
	fn invalid_did_is_rejected() {
		let mut args = args(&[]);
		let did = args.iter().position(|arg| arg == ALICE_DID).unwrap();
		args[did] = "did:web:example.com".to_owned();
		assert!(Cli::try_parse_from(args).is_err());
	}
}
