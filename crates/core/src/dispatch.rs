//! Dispatch Serializer: one admitted operation at a time, FIFO.
//!
//! The guarded value is the state itself, so the only way to touch it is to
//! be admitted. Admitted work runs on its own task holding the guard; a caller
//! that stops waiting does not cancel it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};

pub struct Dispatcher<S> {
	slot: Arc<Mutex<S>>,
	in_flight: Arc<AtomicBool>,
	admitted: Arc<AtomicU64>,
}

impl<S> Clone for Dispatcher<S> {
	fn clone(&self) -> Self {
		Self {
			slot: Arc::clone(&self.slot),
			in_flight: Arc::clone(&self.in_flight),
			admitted: Arc::clone(&self.admitted),
		}
	}
}

/// Clears the in-flight flag on every exit path, unwinding included.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
	fn drop(&mut self) {
		self.0.store(false, Ordering::Release);
	}
}

impl<S: Send + 'static> Dispatcher<S> {
	pub fn new(state: S) -> Self {
		Self {
			slot: Arc::new(Mutex::new(state)),
			in_flight: Arc::new(AtomicBool::new(false)),
			admitted: Arc::new(AtomicU64::new(0)),
		}
	}

	/// Runs `op` with exclusive access to the state.
	///
	/// Callers are admitted in the order they started waiting. The guard is
	/// released when `op` finishes, fails or panics; a panic is reported as
	/// [`Error::Aborted`].
	pub async fn with_exclusive_access<T, F>(&self, op: F) -> Result<T>
	where
		T: Send + 'static,
		F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, Result<T>> + Send + 'static,
	{
		let guard = Arc::clone(&self.slot).lock_owned().await;
		let ticket = self.admitted.fetch_add(1, Ordering::Relaxed);
		let in_flight = Arc::clone(&self.in_flight);

		let task = tokio::spawn(async move {
			let mut guard = guard;
			if in_flight.swap(true, Ordering::AcqRel) {
				warn!(target = "tether.dispatch", ticket, "operation admitted while another was in flight");
				return Err(Error::ExclusivityViolation);
			}
			let _in_flight = InFlight(in_flight);

			debug!(target = "tether.dispatch", ticket, "admitted");
			let result = op(&mut guard).await;
			debug!(target = "tether.dispatch", ticket, ok = result.is_ok(), "released");
			result
		});

		match task.await {
			Ok(result) => result,
			Err(e) if e.is_panic() => Err(Error::Aborted(format!("operation {ticket} panicked"))),
			Err(e) => Err(Error::Aborted(e.to_string())),
		}
	}

	/// Number of operations admitted so far.
	pub fn admitted(&self) -> u64 {
		self.admitted.load(Ordering::Relaxed)
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicUsize;
	use std::time::Duration;

	use futures_util::future::join_all;

	use super::*;

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn operations_run_one_at_a_time_in_admission_order() {
		let dispatcher = Dispatcher::new(Vec::<usize>::new());
		let running = Arc::new(AtomicUsize::new(0));

		let ops = (0..8).map(|i| {
			let running = Arc::clone(&running);
			dispatcher.with_exclusive_access(move |log: &mut Vec<usize>| {
				Box::pin(async move {
					assert_eq!(running.fetch_add(1, Ordering::SeqCst), 0, "two operations overlapped");
					tokio::time::sleep(Duration::from_millis(5)).await;
					log.push(i);
					running.fetch_sub(1, Ordering::SeqCst);
					Ok(i)
				})
			})
		});
		let results: Vec<usize> = join_all(ops).await.into_iter().map(Result::unwrap).collect();
		assert_eq!(results, (0..8).collect::<Vec<_>>());

		let log = dispatcher
			.with_exclusive_access(|log: &mut Vec<usize>| Box::pin(async move { Ok(log.clone()) }))
			.await
			.unwrap();
		assert_eq!(log, (0..8).collect::<Vec<_>>());
		assert_eq!(dispatcher.admitted(), 9);
	}

	#[tokio::test]
	async fn guard_is_released_after_an_error() {
		let dispatcher = Dispatcher::new(0u32);
		let err = dispatcher
			.with_exclusive_access(|_: &mut u32| Box::pin(async move { Err::<(), _>(Error::Config("boom".into())) }))
			.await
			.unwrap_err();
		assert_eq!(err.code(), "CONFIG_ERROR");

		let value = dispatcher
			.with_exclusive_access(|n: &mut u32| {
				Box::pin(async move {
					*n += 1;
					Ok(*n)
				})
			})
			.await
			.unwrap();
		assert_eq!(value, 1);
	}

	#[tokio::test]
	async fn guard_is_released_after_a_panic() {
		let dispatcher = Dispatcher::new(0u32);
		let err = dispatcher
			.with_exclusive_access(|n: &mut u32| {
				Box::pin(async move {
					if *n == 0 {
						panic!("op blew up");
					}
					Ok(())
				})
			})
			.await
			.unwrap_err();
		assert_eq!(err.code(), "ABORTED");

		let value = dispatcher
			.with_exclusive_access(|n: &mut u32| Box::pin(async move { Ok(*n) }))
			.await
			.unwrap();
		assert_eq!(value, 0);
	}

	#[tokio::test]
	async fn abandoned_operation_still_completes() {
		let dispatcher = Dispatcher::new(false);

		let slow = dispatcher.with_exclusive_access(|done: &mut bool| {
			Box::pin(async move {
				tokio::time::sleep(Duration::from_millis(50)).await;
				*done = true;
				Ok(())
			})
		});
		assert!(tokio::time::timeout(Duration::from_millis(5), slow).await.is_err());

		let done = dispatcher
			.with_exclusive_access(|done: &mut bool| Box::pin(async move { Ok(*done) }))
			.await
			.unwrap();
		assert!(done, "the abandoned operation was cancelled");
	}
}
