//! The facade callers use: every operation goes through the serializer and
//! runs against whatever session the manager currently supplies.

use std::future::Future;
use std::sync::Arc;

use crate::config::BridgeConfig;
use crate::dialer::{Dialer, NetworkDialer};
use crate::dispatch::Dispatcher;
use crate::endpoint::TargetSpec;
use crate::error::Result;
use crate::launcher::{ChromeLauncher, Launcher};
use crate::manager::{ConnectOptions, ConnectionManager, ConnectionState};
use crate::session::{InstanceInfo, SessionContext};
use crate::switch::SwitchConfirmation;

/// Cheap to clone; clones share the same manager and queue.
#[derive(Clone)]
pub struct Bridge {
	dispatch: Dispatcher<ConnectionManager>,
	options: Arc<ConnectOptions>,
}

impl Bridge {
	/// Bridge over the real network and the local Chrome launcher.
	pub fn new(config: BridgeConfig) -> Result<Self> {
		let dialer = Arc::new(NetworkDialer::new()?);
		let launcher = Arc::new(ChromeLauncher::new()?);
		Self::with_parts(config, dialer, launcher)
	}

	pub fn with_parts(config: BridgeConfig, dialer: Arc<dyn Dialer>, launcher: Arc<dyn Launcher>) -> Result<Self> {
		let options = Arc::new(config.connect_options()?);
		let manager = ConnectionManager::new(Arc::new(config), dialer, launcher);
		Ok(Self {
			dispatch: Dispatcher::new(manager),
			options,
		})
	}

	pub fn connect_options(&self) -> &ConnectOptions {
		&self.options
	}

	/// Runs `op` under exclusive access against the current session,
	/// connecting first if needed.
	pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T>
	where
		T: Send + 'static,
		F: FnOnce(Arc<SessionContext>) -> Fut + Send + 'static,
		Fut: Future<Output = Result<T>> + Send + 'static,
	{
		let options = Arc::clone(&self.options);
		self.dispatch
			.with_exclusive_access(move |manager| {
				Box::pin(async move {
					let session = manager.ensure_connected(&options).await?;
					op(session).await
				})
			})
			.await
	}

	/// Ensures a connection and reports the instance.
	pub async fn connect(&self) -> Result<InstanceInfo> {
		self.execute(|session| async move { Ok(session.info()) }).await
	}

	/// Like [`Bridge::connect`], but never starts a local browser whatever
	/// the configured launch policy.
	pub async fn connect_without_launch(&self) -> Result<InstanceInfo> {
		let options = Arc::new(ConnectOptions {
			allow_launch: false,
			..ConnectOptions::clone(&self.options)
		});
		self.dispatch
			.with_exclusive_access(move |manager| Box::pin(async move { Ok(manager.ensure_connected(&options).await?.info()) }))
			.await
	}

	/// Ensures a launched local instance and reports it.
	pub async fn launch(&self) -> Result<InstanceInfo> {
		let options = Arc::clone(&self.options);
		self.dispatch
			.with_exclusive_access(move |manager| Box::pin(async move { Ok(manager.ensure_launched(&options.launch).await?.info()) }))
			.await
	}

	/// Replaces the active connection; queued behind any in-flight operation.
	pub async fn switch_to(&self, spec: TargetSpec) -> Result<SwitchConfirmation> {
		self.dispatch
			.with_exclusive_access(move |manager| Box::pin(async move { manager.switch_to(&spec).await }))
			.await
	}

	/// The live instance, if any. Does not connect.
	pub async fn current_instance(&self) -> Result<Option<InstanceInfo>> {
		self.dispatch
			.with_exclusive_access(|manager| Box::pin(async move { Ok(manager.live_session().map(|s| s.info())) }))
			.await
	}

	pub async fn state(&self) -> Result<ConnectionState> {
		self.dispatch
			.with_exclusive_access(|manager| Box::pin(async move { Ok(manager.state()) }))
			.await
	}

	pub async fn disconnect(&self) -> Result<()> {
		self.dispatch
			.with_exclusive_access(|manager| {
				Box::pin(async move {
					manager.disconnect().await;
					Ok(())
				})
			})
			.await
	}

	/// Disconnects and stops an isolated local instance.
	pub async fn shutdown(&self) -> Result<()> {
		self.dispatch
			.with_exclusive_access(|manager| Box::pin(async move { manager.shutdown().await }))
			.await
	}
}

#[cfg(test)]
mod tests;
