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

use anyhow::anyhow;
use kilt_dip_prover::{
	did::{DidVerificationKeyRelationship, KeyAlgorithm},
	signature::{DidKeyPair, PairSigner},
};

use crate::cli::DidArgs;

/// Development key used when no authentication key secret is given.
const DEFAULT_AUTHENTICATION_SURI: &str = "//Alice";

/// The secret URI of a key: given directly, or the DID mnemonic followed by
/// the key's derivation path.
fn secret_uri(direct: Option<&str>, did_mnemonic: Option<&str>, derivation_path: Option<&str>) -> Option<String> {
	match (direct, did_mnemonic, derivation_path) {
		(Some(suri), _, _) => Some(suri.to_owned()),
		(None, Some(mnemonic), Some(path)) => Some(format!("{mnemonic}{path}")),
		_ => None,
	}
}

fn key_pair(
	relationship: DidVerificationKeyRelationship,
	algorithm: KeyAlgorithm,
	suri: &str,
) -> anyhow::Result<DidKeyPair> {
	let pair = DidKeyPair::from_suri(algorithm, suri)
		.map_err(|err| anyhow!("invalid {relationship:?} key secret: {err:?}"))?;
	log::debug!(
		"{relationship:?} key: {algorithm} 0x{}",
		hex::encode(pair.public())
	);
	Ok(pair)
}

/// Loads every DID key whose secret is configured.
pub(crate) fn signer(args: &DidArgs) -> anyhow::Result<PairSigner> {
	let did_mnemonic = args.did_mnemonic.as_deref();

	let auth = &args.authentication;
	let auth_suri = secret_uri(auth.mnemonic.as_deref(), did_mnemonic, auth.derivation_path.as_deref())
		.unwrap_or_else(|| {
			log::warn!("No authentication key configured, using the development key {DEFAULT_AUTHENTICATION_SURI}");
			DEFAULT_AUTHENTICATION_SURI.to_owned()
		});
	let mut signer = PairSigner::default().with_key(
		DidVerificationKeyRelationship::Authentication,
		key_pair(DidVerificationKeyRelationship::Authentication, auth.key_type, &auth_suri)?,
	);

	let optional_keys = [
		(
			DidVerificationKeyRelationship::AssertionMethod,
			args.assertion_method.key_type,
			secret_uri(
				args.assertion_method.mnemonic.as_deref(),
				did_mnemonic,
				args.assertion_method.derivation_path.as_deref(),
			),
		),
		(
			DidVerificationKeyRelationship::CapabilityDelegation,
			args.capability_delegation.key_type,
			secret_uri(
				args.capability_delegation.mnemonic.as_deref(),
				did_mnemonic,
				args.capability_delegation.derivation_path.as_deref(),
			),
		),
	];
	for (relationship, algorithm, suri) in optional_keys {
		if let Some(suri) = suri {
			signer = signer.with_key(relationship, key_pair(relationship, algorithm, &suri)?);
		}
	}
	Ok(signer)
}

#[cfg(test)]
mod tests {
	use super::*;

	use clap::Parser;

	use crate::cli::Cli;

	const MNEMONIC: &str = "bottom drive obey lake curtain smoke basket hold race lonely fit walk";

	fn did_args(extra: &[&str]) -> DidArgs {
		let args = [
			"dip-prover",
			"--relay",
			"ws://relay",
			"--provider",
			"ws://provider",
			"--consumer",
			"ws://consumer",
			"--did",
			"did:kilt:4s3jpR7pzrUdhVUqHHdWoBN6oNQHBC7WRo7zsXdjAzQPT7Cf",
			"--encoded-call",
			"0x0a00",
			"--call",
			"PostIt::post",
			"--submitter",
			"5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty",
		];
		Cli::try_parse_from(args.iter().chain(extra)).unwrap().did
	}

	#[test]
	fn direct_secret_takes_precedence() {
		assert_eq!(
			secret_uri(Some("//Bob"), Some(MNEMONIC), Some("//auth")),
			Some("//Bob".to_owned())
		);
		assert_eq!(
			secret_uri(None, Some(MNEMONIC), Some("//auth")),
			Some(format!("{MNEMONIC}//auth"))
		);
		assert_eq!(secret_uri(None, Some(MNEMONIC), None), None);
		assert_eq!(secret_uri(None, None, Some("//auth")), None);
	}

	#[test]
	fn authentication_defaults_to_alice() {
		let keys = signer(&did_args(&[])).unwrap().key_set().unwrap();
		let alice = DidKeyPair::from_suri(KeyAlgorithm::Sr25519, DEFAULT_AUTHENTICATION_SURI)
			.unwrap()
			.key_material(DidVerificationKeyRelationship::Authentication);

		assert_eq!(keys.get(DidVerificationKeyRelationship::Authentication), Some(&alice));
		assert!(keys.get(DidVerificationKeyRelationship::AssertionMethod).is_none());
		assert!(keys.get(DidVerificationKeyRelationship::CapabilityDelegation).is_none());
	}

	#[test]
	fn keys_derived_from_did_mnemonic() {
		let args = did_args(&[
			"--did-mnemonic",
			MNEMONIC,
			"--auth-derivation-path",
			"//auth",
			"--att-derivation-path",
			"//att",
			"--att-key-type",
			"ed25519",
		]);
		let keys = signer(&args).unwrap().key_set().unwrap();

		let expected = DidKeyPair::from_suri(KeyAlgorithm::Ed25519, &format!("{MNEMONIC}//att"))
			.unwrap()
			.key_material(DidVerificationKeyRelationship::AssertionMethod);
		assert_eq!(keys.get(DidVerificationKeyRelationship::AssertionMethod), Some(&expected));
		assert!(keys.get(DidVerificationKeyRelationship::CapabilityDelegation).is_none());
	}

	#[test]
	fn invalid_secret_is_rejected() {
		assert!(signer(&did_args(&["--del-mnemonic", "not a valid phrase"])).is_err());
	}
}
