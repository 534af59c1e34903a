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

use hex_literal::hex;
use parity_scale_codec::Decode;

use super::*;

use crate::{
	did::{DidPublicKey, DidVerificationKeyRelationship, KeyAlgorithm},
	mock::{MockChain, MockChainBuilder},
	signature::DidKeyPair,
};

const ROOT: H256 = H256([0x42; 32]);

fn did() -> DidIdentifier {
	AccountId32::new([1; 32])
}

fn signing_key(relationship: DidVerificationKeyRelationship) -> DidKeyMaterial {
	DidKeyPair::from_suri(KeyAlgorithm::Sr25519, "//Alice")
		.unwrap()
		.key_material(relationship)
}

fn request(relationship: DidVerificationKeyRelationship) -> CommitmentProofRequest {
	CommitmentProofRequest {
		identifier: did(),
		version: 0,
		signing_key: signing_key(relationship),
		accounts: vec![],
		include_web3_name: false,
	}
}

fn revealed_key(key: &DidKeyMaterial, relationship: DidKeyRelationship) -> RevealedLeafOf<u64> {
	RevealedDidKey {
		id: key.key_id(),
		relationship,
		details: DidPublicKeyDetails {
			key: DidPublicKey::from(key.key().clone()),
			block_number: 10,
		},
	}
	.into()
}

fn provider(response: impl Encode) -> MockChain<u64> {
	let encoded = response.encode();
	MockChainBuilder::default()
		.with_block(499, [])
		.with_runtime_api(move |method, _, _| {
			assert_eq!(method, GENERATE_PROOF_METHOD);
			Ok(encoded.clone())
		})
		.build()
}

fn answer(revealed: Vec<RevealedLeafOf<u64>>) -> GenerateProofResult<u64> {
	Ok(CompleteMerkleProof {
		root: ROOT,
		proof: DidMerkleProof {
			blinded: vec![vec![0x11; 32]],
			revealed,
		},
	})
}

async fn generate_as<ProofError: Decode + Into<ProviderProofError>>(
	provider: &MockChain<u64>,
	request: &CommitmentProofRequest,
) -> Result<CommitmentProof<u64>, Error> {
	let at = ChainAnchor {
		chain: ChainRole::Provider,
		number: 499,
		hash: provider.hash_of(499),
	};
	generate_commitment_proof::<_, ProofError>(provider, &at, request, &RetryPolicy::no_retry()).await
}

async fn generate(
	provider: &MockChain<u64>,
	request: &CommitmentProofRequest,
) -> Result<CommitmentProof<u64>, Error> {
	generate_as::<DipProofError>(provider, request).await
}

fn reason(result: Result<CommitmentProof<u64>, Error>) -> ProofGenerationError {
	match result {
		Err(Error::ProofGenerationFailed { reason, .. }) => reason,
		other => panic!("expected a proof generation failure, got {other:?}"),
	}
}

#[tokio::test]
async fn reveals_signing_key() {
	let request = request(DidVerificationKeyRelationship::Authentication);
	let key_leaf = revealed_key(&request.signing_key, DidVerificationKeyRelationship::Authentication.into());
	let provider = provider(answer(vec![key_leaf.clone()]));

	let proof = generate(&provider, &request).await.unwrap();

	assert_eq!(proof.root, ROOT);
	assert_eq!(proof.version, 0);
	assert_eq!(proof.at.hash, provider.hash_of(499));
	assert_eq!(proof.proof.revealed, vec![key_leaf]);
	assert!(proof.ensure_root(ROOT).is_ok());
}

#[tokio::test]
async fn request_is_scale_encoded() {
	let request = request(DidVerificationKeyRelationship::AssertionMethod);
	let expected_key_id = request.signing_key.key_id();
	let key_leaf = revealed_key(&request.signing_key, DidVerificationKeyRelationship::AssertionMethod.into());
	let response = answer(vec![key_leaf]).encode();
	let provider = MockChainBuilder::<u64>::default()
		.with_block(499, [])
		.with_runtime_api(move |_, mut data, _| {
			let decoded = DipProofRequest::decode(&mut data).unwrap();
			assert_eq!(decoded.identifier, did());
			assert_eq!(decoded.keys, vec![expected_key_id]);
			assert!(decoded.accounts.is_empty());
			assert!(!decoded.should_include_web3_name);
			Ok(response.clone())
		})
		.build();

	assert!(generate(&provider, &request).await.is_ok());
}

#[tokio::test]
async fn runtime_refusal_is_reported() {
	let request = request(DidVerificationKeyRelationship::Authentication);
	let provider = provider(Err(DipProofError::MerkleProof(DidMerkleProofError::KeyNotFound)));

	assert_eq!(
		reason(generate(&provider, &request).await),
		ProofGenerationError::Runtime(ProviderProofError::Kilt(DipProofError::MerkleProof(
			DidMerkleProofError::KeyNotFound
		)))
	);
}

#[tokio::test]
async fn template_runtime_refusal_is_reported() {
	let request = request(DidVerificationKeyRelationship::Authentication);
	let refusal: GenerateProofResult<u64, TemplateDipProofError> = Err(TemplateDipProofError::IdentityNotFound);
	let provider = provider(refusal);

	assert_eq!(
		reason(generate_as::<TemplateDipProofError>(&provider, &request).await),
		ProofGenerationError::Runtime(ProviderProofError::Template(TemplateDipProofError::IdentityNotFound))
	);

	// The template error does not decode as the KILT runtimes' error.
	assert_eq!(
		generate(&provider, &request).await.unwrap_err().kind(),
		crate::ErrorKind::ChainRequestFailed
	);
}

#[tokio::test]
async fn template_identity_provider_error() {
	let request = request(DidVerificationKeyRelationship::Authentication);
	let refusal: GenerateProofResult<u64, TemplateDipProofError> = Err(TemplateDipProofError::IdentityProviderError(
		DidIdentityProviderError::DidNotFound,
	));
	let provider = provider(refusal);

	assert_eq!(
		reason(generate_as::<TemplateDipProofError>(&provider, &request).await),
		ProofGenerationError::Runtime(ProviderProofError::Template(
			TemplateDipProofError::IdentityProviderError(DidIdentityProviderError::DidNotFound)
		))
	);
}

#[tokio::test]
async fn unknown_key_is_rejected() {
	let request = request(DidVerificationKeyRelationship::Authentication);
	let other = DidKeyPair::from_suri(KeyAlgorithm::Ed25519, "//Bob")
		.unwrap()
		.key_material(DidVerificationKeyRelationship::Authentication);
	let provider = provider(answer(vec![revealed_key(
		&other,
		DidVerificationKeyRelationship::Authentication.into(),
	)]));

	assert_eq!(
		reason(generate(&provider, &request).await),
		ProofGenerationError::KeyNotRevealed(request.signing_key.key_id())
	);
}

#[tokio::test]
async fn key_must_have_requested_relationship() {
	let request = request(DidVerificationKeyRelationship::AssertionMethod);
	let provider = provider(answer(vec![revealed_key(
		&request.signing_key,
		DidVerificationKeyRelationship::Authentication.into(),
	)]));

	assert_eq!(
		reason(generate(&provider, &request).await),
		ProofGenerationError::RelationshipMismatch {
			id: request.signing_key.key_id(),
			expected: DidVerificationKeyRelationship::AssertionMethod.into(),
			actual: DidVerificationKeyRelationship::Authentication.into(),
		}
	);
}

#[tokio::test]
async fn linked_accounts_must_be_revealed() {
	let account = LinkableAccountId::AccountId20(AccountId20(hex!("6be02d1d3665660d22ff9624b7be0551ee1ac91b")));
	let mut request = request(DidVerificationKeyRelationship::Authentication);
	request.accounts = vec![account.clone()];
	let key_leaf = revealed_key(&request.signing_key, DidVerificationKeyRelationship::Authentication.into());

	let provider_without = provider(answer(vec![key_leaf.clone()]));
	assert_eq!(
		reason(generate(&provider_without, &request).await),
		ProofGenerationError::AccountNotRevealed(account.clone())
	);

	let provider_with = provider(answer(vec![key_leaf, RevealedAccountId(account).into()]));
	assert!(generate(&provider_with, &request).await.is_ok());
}

#[tokio::test]
async fn web3_name_revealed_only_when_requested() {
	let mut request = request(DidVerificationKeyRelationship::Authentication);
	let key_leaf = revealed_key(&request.signing_key, DidVerificationKeyRelationship::Authentication.into());
	let web3_name_leaf: RevealedLeafOf<u64> = RevealedWeb3Name {
		web3_name: b"alice".to_vec(),
		claimed_at: 5,
	}
	.into();

	let with_name = provider(answer(vec![key_leaf.clone(), web3_name_leaf]));
	let without_name = provider(answer(vec![key_leaf]));

	assert_eq!(
		reason(generate(&with_name, &request).await),
		ProofGenerationError::UnexpectedWeb3Name
	);
	request.include_web3_name = true;
	assert_eq!(
		reason(generate(&without_name, &request).await),
		ProofGenerationError::Web3NameNotRevealed
	);
	assert!(generate(&with_name, &request).await.is_ok());
}

#[tokio::test]
async fn root_must_match_commitment() {
	let request = request(DidVerificationKeyRelationship::Authentication);
	let key_leaf = revealed_key(&request.signing_key, DidVerificationKeyRelationship::Authentication.into());
	let provider = provider(answer(vec![key_leaf]));
	let proof = generate(&provider, &request).await.unwrap();

	let committed = H256([0x43; 32]);
	match proof.ensure_root(committed) {
		Err(Error::ProofGenerationFailed { reason, .. }) => assert_eq!(
			reason,
			ProofGenerationError::RootMismatch {
				proof: ROOT,
				committed
			}
		),
		other => panic!("expected a root mismatch, got {other:?}"),
	}
}

#[test]
fn linkable_account_id_parsing() {
	let eth: LinkableAccountId = "0x6be02d1d3665660d22ff9624b7be0551ee1ac91b".parse().unwrap();
	assert_eq!(
		eth,
		LinkableAccountId::AccountId20(AccountId20(hex!("6be02d1d3665660d22ff9624b7be0551ee1ac91b")))
	);
	assert_eq!(eth.to_string(), "0x6be02d1d3665660d22ff9624b7be0551ee1ac91b");

	let alice = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
	let account: LinkableAccountId = alice.parse().unwrap();
	assert!(matches!(account, LinkableAccountId::AccountId32(_)));
	assert_eq!(account.to_string(), alice);

	assert!("0x1234".parse::<LinkableAccountId>().is_err());
	assert!("not-an-account".parse::<LinkableAccountId>().is_err());
}
