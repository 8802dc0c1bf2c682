// crates/netharvest-ssh/src/session.rs
// ============================================================================
// Module: Netharvest SSH Sessions
// Description: libssh2-backed device sessions with prompt-bounded reads.
// Purpose: Implement the transport seam: probe and command execution.
// Dependencies: ssh2, tokio, netharvest-core, crate::drivers
// ============================================================================

//! ## Overview
//! Sessions are blocking libssh2 work wrapped in `spawn_blocking`; the
//! per-device wall-clock deadline is enforced inside the blocking loop, so
//! an exceeded deadline surfaces as a classified timeout rather than an
//! abandoned task. Error classification follows the stage that failed:
//! resolution/connect/handshake are transport errors, authentication
//! rejections are auth errors, and a missing prompt is a command error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::io::Write;
use std::net::SocketAddr;
use std::net::TcpStream;
use std::net::ToSocketAddrs;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use netharvest_core::CancelToken;
use netharvest_core::CommandPlan;
use netharvest_core::ConnectSpec;
use netharvest_core::DeviceConnector;
use netharvest_core::DeviceError;
use netharvest_core::ResolvedCredential;
use netharvest_core::Transcript;
use ssh2::Channel;
use ssh2::Session;
use tracing::debug;
use tracing::trace;

use crate::drivers::DriverProfile;
use crate::drivers::at_prompt;
use crate::drivers::profile_for;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Slice applied to individual blocking reads so the deadline is observed.
const READ_SLICE: Duration = Duration::from_millis(500);

/// Read buffer size for channel drains.
const READ_BUF: usize = 16 * 1024;

/// Timeout used by connect-only probes when none is supplied.
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(15);

// ============================================================================
// SECTION: Connector
// ============================================================================

/// libssh2-backed implementation of the transport seam.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ssh2Connector;

impl Ssh2Connector {
    /// Creates a connector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DeviceConnector for Ssh2Connector {
    async fn probe(
        &self,
        spec: &ConnectSpec,
        credential: &ResolvedCredential,
        timeout: Duration,
    ) -> Result<(), DeviceError> {
        let spec = spec.clone();
        let credential = credential.clone();
        let timeout = if timeout.is_zero() { DEFAULT_PROBE_TIMEOUT } else { timeout };
        tokio::task::spawn_blocking(move || blocking_probe(&spec, &credential, timeout))
            .await
            .map_err(|err| DeviceError::Command(format!("session worker failed: {err}")))?
    }

    async fn run_commands(
        &self,
        spec: &ConnectSpec,
        credential: &ResolvedCredential,
        plan: &CommandPlan,
        cancel: &CancelToken,
    ) -> Result<Transcript, DeviceError> {
        let spec = spec.clone();
        let credential = credential.clone();
        let plan = plan.clone();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || blocking_run(&spec, &credential, &plan, &cancel))
            .await
            .map_err(|err| DeviceError::Command(format!("session worker failed: {err}")))?
    }
}

// ============================================================================
// SECTION: Deadline
// ============================================================================

/// Wall-clock deadline for one session.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    /// Session start.
    started: Instant,
    /// Total budget.
    budget: Duration,
}

impl Deadline {
    fn new(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    /// Returns the remaining budget, or a timeout error once exhausted.
    fn remaining(&self) -> Result<Duration, DeviceError> {
        let elapsed = self.started.elapsed();
        if elapsed >= self.budget {
            return Err(DeviceError::Timeout(u64::try_from(self.budget.as_millis()).unwrap_or(
                u64::MAX,
            )));
        }
        Ok(self.budget - elapsed)
    }
}

// ============================================================================
// SECTION: Blocking Session Logic
// ============================================================================

/// Connect-only probe: authenticate and reach a prompt, run nothing.
fn blocking_probe(
    spec: &ConnectSpec,
    credential: &ResolvedCredential,
    timeout: Duration,
) -> Result<(), DeviceError> {
    let deadline = Deadline::new(timeout);
    let profile = profile_for(&spec.driver_hint);
    let cancel = CancelToken::new();
    let (session, mut channel) = open_shell(spec, credential, &deadline)?;
    let reached = read_until_prompt(&session, &mut channel, &profile, &deadline, &cancel);
    close_channel(&mut channel);
    reached.map(|_| ())
}

/// Full command sequence inside one authenticated session.
///
/// `cancel` is observed at every read boundary: once it fires the channel
/// is closed (soft cancel) and the sequence errors out.
fn blocking_run(
    spec: &ConnectSpec,
    credential: &ResolvedCredential,
    plan: &CommandPlan,
    cancel: &CancelToken,
) -> Result<Transcript, DeviceError> {
    let deadline = Deadline::new(plan.deadline);
    let profile = profile_for(&spec.driver_hint);
    let (session, mut channel) = open_shell(spec, credential, &deadline)?;
    let mut transcript = Transcript::default();

    // Drain the login banner up to the first prompt.
    if let Err(err) = read_until_prompt(&session, &mut channel, &profile, &deadline, cancel) {
        close_channel(&mut channel);
        return Err(err);
    }

    if let Some(prelude) = effective_prelude(plan, &profile) {
        match run_one_command(&session, &mut channel, &profile, &deadline, cancel, &prelude) {
            Ok(_) => {}
            Err(err @ DeviceError::Timeout(_)) => {
                close_channel(&mut channel);
                return Err(err);
            }
            Err(err) if cancel.is_cancelled() => {
                close_channel(&mut channel);
                return Err(err);
            }
            Err(err) => {
                debug!(host = %spec.host, error = %err, "paging prelude failed");
                transcript.warnings.push(format!("paging prelude failed: {err}"));
            }
        }
    }

    let last = plan.commands.len().saturating_sub(1);
    for (index, command) in plan.commands.iter().enumerate() {
        if cancel.is_cancelled() {
            close_channel(&mut channel);
            return Err(cancelled_session());
        }
        let output =
            match run_one_command(&session, &mut channel, &profile, &deadline, cancel, command) {
                Ok(output) => output,
                Err(err) => {
                    close_channel(&mut channel);
                    return Err(err);
                }
            };
        if index > 0 {
            transcript.output.push('\n');
        }
        transcript.output.push_str(&format!("### {command}\n"));
        transcript.output.push_str(&output);
        if !output.ends_with('\n') {
            transcript.output.push('\n');
        }
        if index < last
            && let Some(pause) = plan.inter_command_pause
            && let Err(err) = pause_between_commands(pause, &deadline, cancel)
        {
            close_channel(&mut channel);
            return Err(err);
        }
    }

    close_channel(&mut channel);
    Ok(transcript)
}

/// Sleeps the inter-command pause in slices so cancellation and the
/// deadline are both observed promptly.
fn pause_between_commands(
    pause: Duration,
    deadline: &Deadline,
    cancel: &CancelToken,
) -> Result<(), DeviceError> {
    let mut left = pause;
    while !left.is_zero() {
        if cancel.is_cancelled() {
            return Err(cancelled_session());
        }
        let remaining = deadline.remaining()?;
        let slice = left.min(READ_SLICE).min(remaining);
        std::thread::sleep(slice);
        left = left.saturating_sub(slice);
    }
    Ok(())
}

/// Returns the paging prelude to send: job override, else profile default.
fn effective_prelude(plan: &CommandPlan, profile: &DriverProfile) -> Option<String> {
    plan.paging_prelude
        .clone()
        .or_else(|| profile.paging_disable.map(str::to_string))
}

/// Opens a TCP connection, handshakes, authenticates, and starts a shell.
fn open_shell(
    spec: &ConnectSpec,
    credential: &ResolvedCredential,
    deadline: &Deadline,
) -> Result<(Session, Channel), DeviceError> {
    let address = resolve_address(spec)?;
    let remaining = deadline.remaining()?;
    let tcp = TcpStream::connect_timeout(&address, remaining)
        .map_err(|err| DeviceError::Transport(format!("connect {address}: {err}")))?;
    let mut session =
        Session::new().map_err(|err| DeviceError::Transport(format!("session init: {err}")))?;
    session.set_tcp_stream(tcp);
    apply_slice_timeout(&session, deadline)?;
    session
        .handshake()
        .map_err(|err| DeviceError::Transport(format!("ssh handshake: {err}")))?;

    authenticate(&session, credential)?;

    let mut channel = session
        .channel_session()
        .map_err(|err| DeviceError::Transport(format!("channel open: {err}")))?;
    channel
        .request_pty("vt100", None, None)
        .map_err(|err| DeviceError::Transport(format!("pty request: {err}")))?;
    channel.shell().map_err(|err| DeviceError::Transport(format!("shell request: {err}")))?;
    Ok((session, channel))
}

/// Resolves the host/port pair to one socket address.
fn resolve_address(spec: &ConnectSpec) -> Result<SocketAddr, DeviceError> {
    let mut addresses = (spec.host.as_str(), spec.port)
        .to_socket_addrs()
        .map_err(|err| DeviceError::Transport(format!("resolve {}: {err}", spec.host)))?;
    addresses
        .next()
        .ok_or_else(|| DeviceError::Transport(format!("resolve {}: no addresses", spec.host)))
}

/// Authenticates with key material when present, else password.
fn authenticate(
    session: &Session,
    credential: &ResolvedCredential,
) -> Result<(), DeviceError> {
    if let Some(private_key) = &credential.private_key {
        session
            .userauth_pubkey_memory(
                &credential.username,
                None,
                private_key,
                credential.key_passphrase.as_deref(),
            )
            .map_err(|err| DeviceError::AuthFailed(format!("key auth: {err}")))?;
    } else if let Some(password) = &credential.password {
        session
            .userauth_password(&credential.username, password)
            .map_err(|err| DeviceError::AuthFailed(format!("password auth: {err}")))?;
    } else {
        return Err(DeviceError::AuthFailed("credential holds no usable secret".to_string()));
    }
    if !session.authenticated() {
        return Err(DeviceError::AuthFailed("server rejected credentials".to_string()));
    }
    Ok(())
}

/// Builds the soft-cancel error returned once the token fires.
fn cancelled_session() -> DeviceError {
    DeviceError::Command("session closed on cancellation".to_string())
}

/// Sends one command and reads its prompt-bounded output.
fn run_one_command(
    session: &Session,
    channel: &mut Channel,
    profile: &DriverProfile,
    deadline: &Deadline,
    cancel: &CancelToken,
    command: &str,
) -> Result<String, DeviceError> {
    trace!(command, "sending command");
    channel
        .write_all(command.as_bytes())
        .and_then(|()| channel.write_all(b"\n"))
        .and_then(|()| channel.flush())
        .map_err(|err| DeviceError::Transport(format!("send {command:?}: {err}")))?;
    let raw = read_until_prompt(session, channel, profile, deadline, cancel)?;
    Ok(strip_echo_and_prompt(&raw, profile, command))
}

/// Reads until the driver prompt returns, the deadline elapses, or the
/// cancellation token fires. The sliced read timeout bounds how long a
/// fired token can go unnoticed.
fn read_until_prompt(
    session: &Session,
    channel: &mut Channel,
    profile: &DriverProfile,
    deadline: &Deadline,
    cancel: &CancelToken,
) -> Result<String, DeviceError> {
    let mut buffer = String::new();
    let mut chunk = [0u8; READ_BUF];
    loop {
        if cancel.is_cancelled() {
            return Err(cancelled_session());
        }
        deadline.remaining()?;
        apply_slice_timeout(session, deadline)?;
        match channel.read(&mut chunk) {
            Ok(0) => {
                if at_prompt(profile, &buffer) {
                    return Ok(buffer);
                }
                return Err(DeviceError::Command(
                    "session closed before prompt returned".to_string(),
                ));
            }
            Ok(read) => {
                buffer.push_str(&String::from_utf8_lossy(&chunk[.. read]));
                if at_prompt(profile, &buffer) {
                    return Ok(buffer);
                }
            }
            // A sliced read timeout only means "no data yet"; the deadline
            // check at the top of the loop decides when to give up.
            Err(err) if is_timeout(&err) => {}
            Err(err) => {
                return Err(DeviceError::Transport(format!("channel read: {err}")));
            }
        }
    }
}

/// Returns whether an I/O error is a read-slice timeout.
fn is_timeout(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    )
}

/// Applies the smaller of the read slice and the remaining budget.
fn apply_slice_timeout(session: &Session, deadline: &Deadline) -> Result<(), DeviceError> {
    let remaining = deadline.remaining()?;
    let slice = READ_SLICE.min(remaining);
    session.set_timeout(u32::try_from(slice.as_millis().max(1)).unwrap_or(u32::MAX));
    Ok(())
}

/// Drops the command echo line and the trailing prompt line.
fn strip_echo_and_prompt(raw: &str, profile: &DriverProfile, command: &str) -> String {
    let mut lines: Vec<&str> = raw.lines().collect();
    if let Some(last) = lines.last()
        && at_prompt(profile, last)
    {
        lines.pop();
    }
    if let Some(first) = lines.first()
        && first.trim_end_matches('\r').trim() == command.trim()
    {
        lines.remove(0);
    }
    let mut out = lines.join("\n");
    // Channel output arrives with CRLF endings; captures store plain LF.
    out = out.replace('\r', "");
    out
}

/// Closes the channel, tolerating devices that drop the link first.
fn close_channel(channel: &mut Channel) {
    let _ = channel.send_eof();
    let _ = channel.close();
    let _ = channel.wait_close();
}

// ============================================================================
// SECTION: Tests
// ============================================================================
