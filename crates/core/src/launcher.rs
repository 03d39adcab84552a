//! Local browser startup.
//!
//! The browser is started with `--remote-debugging-port=0` and reports the
//! port it picked through `DevToolsActivePort` in its profile directory.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::{Child, Command};
use tracing::{debug, info};
use url::Url;

use crate::config::{DEFAULT_CHANNEL, LaunchOptions};
use crate::endpoint::ReachableEndpoint;
use crate::error::{Error, Result};

pub const ACTIVE_PORT_FILE: &str = "DevToolsActivePort";
const SINGLETON_LOCK: &str = "SingletonLock";
#[cfg(windows)]
const WINDOWS_LOCKFILE: &str = "lockfile";
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[async_trait]
pub trait Launcher: Send + Sync {
	/// Starts a local instance and waits until it reports its endpoint.
	async fn launch(&self, options: &LaunchOptions, timeout: Duration) -> Result<LocalInstance>;
}

/// Profile directory of a launched instance.
#[derive(Debug)]
pub enum ProfileDir {
	/// Stable per-channel directory, reused across runs.
	Persistent(PathBuf),
	/// Disposable directory, removed when dropped.
	Isolated(TempDir),
}

impl ProfileDir {
	pub fn path(&self) -> &Path {
		match self {
			ProfileDir::Persistent(path) => path,
			ProfileDir::Isolated(dir) => dir.path(),
		}
	}

	pub fn is_isolated(&self) -> bool {
		matches!(self, ProfileDir::Isolated(_))
	}
}

/// A launched browser owned by the connection manager.
///
/// Isolated instances are killed when dropped, before their profile directory
/// is removed. Persistent ones keep running.
#[derive(Debug)]
pub struct LocalInstance {
	endpoint: ReachableEndpoint,
	child: Option<Child>,
	profile: ProfileDir,
}

impl LocalInstance {
	pub fn new(endpoint: ReachableEndpoint, profile: ProfileDir, child: Option<Child>) -> Self {
		Self { endpoint, child, profile }
	}

	pub fn endpoint(&self) -> &ReachableEndpoint {
		&self.endpoint
	}

	pub fn profile(&self) -> &ProfileDir {
		&self.profile
	}

	pub fn pid(&self) -> Option<u32> {
		self.child.as_ref().and_then(Child::id)
	}

	/// Stops an isolated instance; a persistent one is left running.
	pub async fn shutdown(mut self) -> Result<()> {
		if !self.profile.is_isolated() {
			debug!(target = "tether.launch", profile = %self.profile.path().display(), "leaving persistent instance running");
			return Ok(());
		}
		if let Some(mut child) = self.child.take() {
			debug!(target = "tether.launch", pid = ?child.id(), "stopping isolated instance");
			child.kill().await?;
		}
		Ok(())
	}
}

/// Starts Chromium-family browsers found on this machine.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
	profile_root: PathBuf,
}

impl ChromeLauncher {
	/// Launcher rooted at `<local data dir>/tether/profiles`.
	pub fn new() -> Result<Self> {
		let data = dirs::data_local_dir().ok_or_else(|| Error::Config("no local data directory on this platform".into()))?;
		Ok(Self::with_profile_root(data.join("tether").join("profiles")))
	}

	pub fn with_profile_root(root: impl Into<PathBuf>) -> Self {
		Self { profile_root: root.into() }
	}

	/// Deterministic persistent profile directory for a release channel.
	pub fn persistent_profile_dir(&self, channel: &str) -> PathBuf {
		self.profile_root.join(normalize_channel(channel))
	}

	fn prepare_profile(&self, options: &LaunchOptions) -> Result<ProfileDir> {
		if options.isolated {
			let dir = tempfile::Builder::new().prefix("tether-profile-").tempdir()?;
			return Ok(ProfileDir::Isolated(dir));
		}

		let dir = self.persistent_profile_dir(&options.channel);
		std::fs::create_dir_all(&dir)?;
		if let Some(holder) = lock_holder(&dir) {
			return Err(Error::AlreadyRunning {
				profile_dir: dir,
				pid: holder.pid,
			});
		}
		Ok(ProfileDir::Persistent(dir))
	}
}

#[async_trait]
impl Launcher for ChromeLauncher {
	async fn launch(&self, options: &LaunchOptions, timeout: Duration) -> Result<LocalInstance> {
		let profile = self.prepare_profile(options)?;

		let executable = match &options.executable {
			Some(path) => path.clone(),
			None => find_browser_executable(&options.channel).ok_or_else(|| {
				Error::LaunchFailed(format!(
					"could not find a Chromium-family browser for channel `{}`; set launch.executable or pass --executable",
					options.channel
				))
			})?,
		};

		// A file left by an earlier run would point at a dead port.
		match std::fs::remove_file(profile.path().join(ACTIVE_PORT_FILE)) {
			Ok(()) => debug!(target = "tether.launch", "removed stale {ACTIVE_PORT_FILE}"),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
			Err(e) => return Err(e.into()),
		}

		let args = launch_args(options, profile.path());
		let mut cmd = Command::new(&executable);
		cmd.args(&args)
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::null())
			.kill_on_drop(profile.is_isolated());

		#[cfg(unix)]
		cmd.process_group(0);

		let mut child = cmd
			.spawn()
			.map_err(|e| Error::LaunchFailed(format!("failed to start {}: {e}", executable.display())))?;
		info!(
			target = "tether.launch",
			executable = %executable.display(),
			pid = ?child.id(),
			profile = %profile.path().display(),
			isolated = profile.is_isolated(),
			"browser started"
		);

		let waited = tokio::time::timeout(timeout, wait_for_active_port(&mut child, profile.path())).await;
		let endpoint = match waited {
			Ok(Ok(endpoint)) => endpoint,
			Ok(Err(e)) => {
				let _ = child.start_kill();
				return Err(e);
			}
			Err(_) => {
				let _ = child.start_kill();
				return Err(Error::ConnectTimeout {
					target: format!("local browser {}", executable.display()),
					timeout_ms: timeout.as_millis() as u64,
				});
			}
		};

		debug!(target = "tether.launch", endpoint = %endpoint, "browser reported endpoint");
		Ok(LocalInstance::new(endpoint, profile, Some(child)))
	}
}

/// Command line for a launch, extra args last.
pub fn launch_args(options: &LaunchOptions, profile: &Path) -> Vec<String> {
	let mut args = vec![
		"--remote-debugging-port=0".to_string(),
		format!("--user-data-dir={}", profile.display()),
		"--no-first-run".to_string(),
		"--no-default-browser-check".to_string(),
	];
	if options.headless {
		args.push("--headless=new".to_string());
	}
	if options.accept_insecure_certs {
		args.push("--ignore-certificate-errors".to_string());
	}
	args.extend(options.args.iter().cloned());
	args
}

/// Parses `DevToolsActivePort`: port on the first line, browser path on the second.
pub fn parse_active_port(contents: &str) -> Option<(u16, String)> {
	let mut lines = contents.lines().map(str::trim);
	let port = lines.next()?.parse::<u16>().ok().filter(|p| *p != 0)?;
	let path = lines.next().filter(|p| p.starts_with('/'))?;
	Some((port, path.to_string()))
}

async fn wait_for_active_port(child: &mut Child, profile: &Path) -> Result<ReachableEndpoint> {
	let file = profile.join(ACTIVE_PORT_FILE);
	loop {
		if let Some(status) = child.try_wait()? {
			return Err(Error::LaunchFailed(format!("browser exited before reporting its endpoint ({status})")));
		}

		// The browser may still be writing; an unparsable file is retried.
		let reported = tokio::fs::read_to_string(&file).await.ok().and_then(|c| parse_active_port(&c));
		if let Some((port, path)) = reported {
			let url = Url::parse(&format!("ws://127.0.0.1:{port}{path}"))
				.map_err(|e| Error::LaunchFailed(format!("browser reported an invalid endpoint: {e}")))?;
			return ReachableEndpoint::direct(url);
		}

		tokio::time::sleep(POLL_INTERVAL).await;
	}
}

/// Restricts a channel name to `[A-Za-z0-9._-]`.
pub fn normalize_channel(channel: &str) -> String {
	let mut out = String::with_capacity(channel.len());
	for c in channel.chars() {
		if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
			out.push(c);
		} else {
			out.push('-');
		}
	}
	let trimmed = out.trim_matches(|c| c == '-' || c == '.');
	if trimmed.is_empty() { DEFAULT_CHANNEL.to_string() } else { trimmed.to_string() }
}

/// Process currently holding a profile directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockHolder {
	pub pid: Option<u32>,
}

/// Reads the browser's singleton lock. Returns `None` when the directory is
/// free or the lock is stale.
#[cfg(unix)]
pub fn lock_holder(profile: &Path) -> Option<LockHolder> {
	// Chromium writes a dangling symlink whose target is `<hostname>-<pid>`.
	let target = std::fs::read_link(profile.join(SINGLETON_LOCK)).ok()?;
	let target = target.to_string_lossy();
	let pid = target.rsplit_once('-')?.1.parse::<u32>().ok()?;
	process_alive(pid).then_some(LockHolder { pid: Some(pid) })
}

#[cfg(windows)]
pub fn lock_holder(profile: &Path) -> Option<LockHolder> {
	use std::os::windows::fs::OpenOptionsExt;

	let lockfile = profile.join(WINDOWS_LOCKFILE);
	if !lockfile.exists() {
		return None;
	}
	// A live browser holds the file open without sharing, so an exclusive
	// open fails. The file itself is left untouched.
	match std::fs::OpenOptions::new().read(true).share_mode(0).open(&lockfile) {
		Ok(_) => None,
		Err(_) => Some(LockHolder { pid: None }),
	}
}

#[cfg(not(any(unix, windows)))]
pub fn lock_holder(_profile: &Path) -> Option<LockHolder> {
	None
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
	let Ok(pid) = libc::pid_t::try_from(pid) else {
		return false;
	};
	if pid <= 0 {
		return false;
	}
	// SAFETY: signal 0 performs permission and existence checks only.
	if unsafe { libc::kill(pid, 0) } == 0 {
		return true;
	}
	std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Looks for a browser for `channel` on `PATH` and in install locations.
pub fn find_browser_executable(channel: &str) -> Option<PathBuf> {
	for candidate in browser_candidates(channel) {
		if candidate.starts_with('/') || candidate.contains('\\') || candidate.contains(':') {
			let path = PathBuf::from(&candidate);
			if path.exists() {
				return Some(path);
			}
		} else if let Ok(path) = which::which(&candidate) {
			return Some(path);
		}
	}
	None
}

fn browser_candidates(channel: &str) -> Vec<String> {
	let channel = normalize_channel(channel).to_ascii_lowercase();
	if cfg!(target_os = "macos") {
		macos_browser_candidates(&channel)
	} else if cfg!(target_os = "windows") {
		windows_browser_candidates(&channel)
	} else {
		linux_browser_candidates(&channel)
	}
}

fn linux_browser_candidates(channel: &str) -> Vec<String> {
	let names: &[&str] = match channel {
		"beta" => &["google-chrome-beta", "microsoft-edge-beta"],
		"dev" | "unstable" => &["google-chrome-unstable", "microsoft-edge-dev"],
		"canary" => &["google-chrome-canary", "chromium-snapshot-bin"],
		"chromium" => &["chromium", "chromium-browser"],
		_ => &[
			"google-chrome-stable",
			"google-chrome",
			"chromium-browser",
			"chromium",
			"brave-browser",
			"brave",
			"microsoft-edge",
		],
	};

	let mut candidates: Vec<String> = names.iter().map(|n| n.to_string()).collect();
	candidates.extend(names.iter().map(|n| format!("/usr/bin/{n}")));
	if matches!(channel, "stable" | "chromium") {
		candidates.push("/snap/bin/chromium".to_string());
	}
	candidates
}

fn macos_browser_candidates(channel: &str) -> Vec<String> {
	let apps: &[&str] = match channel {
		"beta" => &["Google Chrome Beta", "Microsoft Edge Beta"],
		"dev" | "unstable" => &["Google Chrome Dev", "Microsoft Edge Dev"],
		"canary" => &["Google Chrome Canary", "Microsoft Edge Canary"],
		"chromium" => &["Chromium"],
		_ => &["Google Chrome", "Chromium", "Brave Browser", "Microsoft Edge"],
	};
	apps.iter().map(|app| format!("/Applications/{app}.app/Contents/MacOS/{app}")).collect()
}

fn windows_browser_candidates(channel: &str) -> Vec<String> {
	let mut roots = Vec::new();
	for key in ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"] {
		if let Ok(value) = std::env::var(key) {
			roots.push(PathBuf::from(value));
		}
	}
	if roots.is_empty() {
		roots.push(PathBuf::from(r"C:\Program Files"));
		roots.push(PathBuf::from(r"C:\Program Files (x86)"));
	}

	let suffixes: &[&[&str]] = match channel {
		"beta" => &[&["Google", "Chrome Beta", "Application", "chrome.exe"], &["Microsoft", "Edge Beta", "Application", "msedge.exe"]],
		"dev" | "unstable" => &[&["Google", "Chrome Dev", "Application", "chrome.exe"], &["Microsoft", "Edge Dev", "Application", "msedge.exe"]],
		"canary" => &[&["Google", "Chrome SxS", "Application", "chrome.exe"], &["Microsoft", "Edge SxS", "Application", "msedge.exe"]],
		"chromium" => &[&["Chromium", "Application", "chrome.exe"]],
		_ => &[
			&["Google", "Chrome", "Application", "chrome.exe"],
			&["Microsoft", "Edge", "Application", "msedge.exe"],
			&["BraveSoftware", "Brave-Browser", "Application", "brave.exe"],
			&["Chromium", "Application", "chrome.exe"],
		],
	};

	let mut candidates = Vec::new();
	for root in roots {
		for suffix in suffixes {
			let mut path = root.clone();
			for component in *suffix {
				path.push(component);
			}
			candidates.push(path.to_string_lossy().to_string());
		}
	}
	if matches!(channel, "stable" | "chromium") {
		candidates.extend(["chrome.exe", "msedge.exe", "chromium.exe"].map(String::from));
	}
	candidates
}
