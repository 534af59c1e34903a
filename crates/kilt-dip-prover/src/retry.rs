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

use std::{future::Future, time::Duration};

use crate::{
	chain::{ChainError, ChainRole},
	Error,
};

const LOG_TARGET: &str = "dip::prover::retry";

/// How often a single remote call is retried on transport errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
	/// Including the first attempt. Never less than one.
	pub max_attempts: u32,
	pub delay: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			delay: Duration::from_secs(2),
		}
	}
}

impl RetryPolicy {
	pub fn no_retry() -> Self {
		Self {
			max_attempts: 1,
			delay: Duration::ZERO,
		}
	}

	/// Runs `request` until it succeeds, fails with a non-transient error or
	/// runs out of attempts. Each attempt uses the same parameters.
	pub async fn run<T, F, Fut>(&self, chain: ChainRole, what: &str, mut request: F) -> Result<T, Error>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, ChainError>>,
	{
		let max_attempts = self.max_attempts.max(1);
		let mut attempt = 1;
		loop {
			match request().await {
				Ok(value) => return Ok(value),
				Err(err) if err.is_transient() && attempt < max_attempts => {
					log::warn!(
						target: LOG_TARGET,
						"{what} on {chain} chain failed (attempt {attempt}/{max_attempts}): {err}. Retrying in {:?}.",
						self.delay
					);
					tokio::time::sleep(self.delay).await;
					attempt += 1;
				}
				Err(err) => return Err(Error::chain(chain, attempt, err)),
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use std::sync::atomic::{AtomicU32, Ordering};

	use crate::ErrorKind;

	fn policy(max_attempts: u32) -> RetryPolicy {
		RetryPolicy {
			max_attempts,
			delay: Duration::ZERO,
		}
	}

	#[tokio::test]
	async fn transient_errors_are_retried() {
		let calls = &AtomicU32::new(0);
		let result = policy(3)
			.run(ChainRole::Relay, "test", move || async move {
				if calls.fetch_add(1, Ordering::SeqCst) < 2 {
					Err(ChainError::Transport("timeout".into()))
				} else {
					Ok(42)
				}
			})
			.await;
		assert_eq!(result.unwrap(), 42);
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn attempts_are_bounded() {
		let calls = &AtomicU32::new(0);
		let result: Result<(), _> = policy(2)
			.run(ChainRole::Provider, "test", move || async move {
				calls.fetch_add(1, Ordering::SeqCst);
				Err(ChainError::Transport("timeout".into()))
			})
			.await;
		assert!(matches!(
			result,
			Err(Error::ChainUnreachable {
				chain: ChainRole::Provider,
				attempts: 2,
				..
			})
		));
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn other_errors_are_not_retried() {
		let calls = &AtomicU32::new(0);
		let result: Result<(), _> = policy(5)
			.run(ChainRole::Consumer, "test", move || async move {
				calls.fetch_add(1, Ordering::SeqCst);
				Err(ChainError::Rpc("unknown block".into()))
			})
			.await;
		assert_eq!(result.unwrap_err().kind(), ErrorKind::ChainRequestFailed);
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}
}
