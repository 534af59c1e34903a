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

use std::{future::Future, process::ExitCode};

use anyhow::Context;
use clap::Parser;
use kilt_dip_prover::{
	chain::{ChainClient, ChainRole, RpcChainClient},
	did::did_uri,
	DipProver, DipRuntimeTypes, KiltRuntimeTypes, TemplateRuntimeTypes, UNCLASSIFIED_EXIT_CODE,
};
use log::LevelFilter;
use parity_scale_codec::Encode;
use serde::Serialize;

use crate::{
	cli::{Cli, RuntimePreset},
	keys,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Output {
	did: String,
	proof_version: u16,
	proof: String,
	dispatch_as_call: String,
	polkadot_js_link: String,
}

fn polkadot_js_link(ws_address: &str, encoded_call: &str) -> String {
	format!("https://polkadot.js.org/apps/?rpc={ws_address}#/extrinsics/decode/{encoded_call}")
}

fn init_logger(verbose: u8) {
	let level = match verbose {
		0 => LevelFilter::Info,
		1 => LevelFilter::Debug,
		_ => LevelFilter::Trace,
	};
	env_logger::Builder::new()
		.filter_level(level)
		.parse_default_env()
		.init();
}

/// The process exit status for a failed run: the prover's error code, or
/// [`UNCLASSIFIED_EXIT_CODE`] for anything else.
fn exit_code(err: &anyhow::Error) -> u8 {
	err.downcast_ref::<kilt_dip_prover::Error>()
		.map(|err| u8::from(err.kind()))
		.unwrap_or(UNCLASSIFIED_EXIT_CODE)
}

async fn connect<N>(role: ChainRole, endpoint: &str) -> anyhow::Result<RpcChainClient<N>> {
	RpcChainClient::connect(endpoint)
		.await
		.with_context(|| format!("failed to connect to the {role} chain at {endpoint}"))
}

/// Connects to all three chains concurrently. If any connection fails, the
/// established ones are closed before the first error is returned.
async fn connect_all<R, P, C>(
	relay: impl Future<Output = anyhow::Result<R>>,
	provider: impl Future<Output = anyhow::Result<P>>,
	consumer: impl Future<Output = anyhow::Result<C>>,
) -> anyhow::Result<(R, P, C)>
where
	R: ChainClient,
	P: ChainClient,
	C: ChainClient,
{
	let (relay, provider, consumer) = tokio::join!(relay, provider, consumer);
	if relay.is_err() || provider.is_err() || consumer.is_err() {
		if let Ok(client) = &relay {
			client.disconnect().await;
		}
		if let Ok(client) = &provider {
			client.disconnect().await;
		}
		if let Ok(client) = &consumer {
			client.disconnect().await;
		}
	}
	Ok((relay?, provider?, consumer?))
}

async fn build<T: DipRuntimeTypes>(cli: &Cli) -> anyhow::Result<Output> {
	let signer = keys::signer(&cli.did)?;
	let keys = signer.key_set().context("no authentication key")?;
	let request = cli.request(keys);
	let config = cli.prover_config()?;

	let (relay, provider, consumer) = connect_all(
		connect::<T::RelayBlockNumber>(ChainRole::Relay, &cli.endpoints.relay),
		connect::<T::ProviderBlockNumber>(ChainRole::Provider, &cli.endpoints.provider),
		connect::<T::ConsumerBlockNumber>(ChainRole::Consumer, &cli.endpoints.consumer),
	)
	.await?;
	let prover = DipProver::<T, _, _, _, _>::new(relay, provider, consumer, signer, config);

	let envelope = prover.build_envelope(&request).await;
	prover.disconnect().await;
	let envelope = envelope?;

	let dispatch_as_call = format!(
		"0x{}",
		hex::encode(envelope.dispatch_as_call(cli.proof.consumer_pallet_index))
	);
	Ok(Output {
		did: did_uri(&request.identifier),
		proof_version: envelope.proof.version(),
		proof: format!("0x{}", hex::encode(envelope.proof.encode())),
		polkadot_js_link: polkadot_js_link(&cli.endpoints.consumer, &dispatch_as_call),
		dispatch_as_call,
	})
}

fn print(output: &Output, json: bool) -> anyhow::Result<()> {
	if json {
		println!("{}", serde_json::to_string_pretty(output)?);
	} else {
		println!("DIP tx: {}", output.dispatch_as_call);
		println!("Please add these details to the \"dipConsumer.dispatchAs\" function in PolkadotJS.");
		println!("Direct link: {}", output.polkadot_js_link);
	}
	Ok(())
}

pub(crate) async fn run() -> ExitCode {
	let cli = Cli::parse();
	init_logger(cli.verbose);

	let result = match cli.proof.runtime {
		RuntimePreset::Kilt => build::<KiltRuntimeTypes>(&cli).await,
		RuntimePreset::Template => build::<TemplateRuntimeTypes>(&cli).await,
	}
	.and_then(|output| print(&output, cli.json));

	match result {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			log::error!("{err:#}");
			ExitCode::from(exit_code(&err))
		}
	}
}
