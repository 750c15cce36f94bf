//! Termination signal wiring
//!
//! Each configured signal gets its own listener task. Every delivery invokes
//! the callback; repeated deliveries are left to the callback to ignore.

use std::fmt;
use std::str::FromStr;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[cfg(unix)]
use futures::stream::BoxStream;

/// Signals that can be bound to shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalName {
    Term,
    Int,
    Hup,
    Quit,
    Usr1,
    Usr2,
}

impl SignalName {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalName::Term => "SIGTERM",
            SignalName::Int => "SIGINT",
            SignalName::Hup => "SIGHUP",
            SignalName::Quit => "SIGQUIT",
            SignalName::Usr1 => "SIGUSR1",
            SignalName::Usr2 => "SIGUSR2",
        }
    }

    #[cfg(unix)]
    fn kind(&self) -> tokio::signal::unix::SignalKind {
        use tokio::signal::unix::SignalKind;

        match self {
            SignalName::Term => SignalKind::terminate(),
            SignalName::Int => SignalKind::interrupt(),
            SignalName::Hup => SignalKind::hangup(),
            SignalName::Quit => SignalKind::quit(),
            SignalName::Usr1 => SignalKind::user_defined1(),
            SignalName::Usr2 => SignalKind::user_defined2(),
        }
    }
}

impl fmt::Display for SignalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalName {
    type Err = String;

    /// Accepts `SIGTERM`, `sigterm` and `TERM` alike
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let name = upper.strip_prefix("SIG").unwrap_or(&upper);
        match name {
            "TERM" => Ok(SignalName::Term),
            "INT" => Ok(SignalName::Int),
            "HUP" => Ok(SignalName::Hup),
            "QUIT" => Ok(SignalName::Quit),
            "USR1" => Ok(SignalName::Usr1),
            "USR2" => Ok(SignalName::Usr2),
            _ => Err(format!("unknown signal: {}", s)),
        }
    }
}

/// Bind every signal in `signals` to `on_signal`
///
/// Must be called from within a tokio runtime. Handlers are installed
/// before this returns; a signal that cannot be registered is logged and
/// skipped. Returns the listener tasks.
#[cfg(unix)]
pub fn bind_signals<F>(signals: &[SignalName], on_signal: F) -> Vec<JoinHandle<()>>
where
    F: Fn(SignalName) + Clone + Send + Sync + 'static,
{
    use futures::StreamExt;
    use tokio::signal::unix::signal;

    let (_, listeners) = bind_each(
        signals,
        |name| {
            let mut stream = signal(name.kind())?;
            Ok(futures::stream::poll_fn(move |cx| stream.poll_recv(cx)).boxed())
        },
        on_signal,
    );
    listeners
}

/// Spawn a listener per signal whose stream `listen` can open
///
/// Returns the names that were actually bound alongside their tasks.
#[cfg(unix)]
fn bind_each<L, F>(
    signals: &[SignalName],
    mut listen: L,
    on_signal: F,
) -> (Vec<SignalName>, Vec<JoinHandle<()>>)
where
    L: FnMut(SignalName) -> std::io::Result<BoxStream<'static, ()>>,
    F: Fn(SignalName) + Clone + Send + Sync + 'static,
{
    use futures::StreamExt;

    let mut bound = Vec::with_capacity(signals.len());
    let mut listeners = Vec::with_capacity(signals.len());
    for &name in signals {
        let mut stream = match listen(name) {
            Ok(s) => s,
            Err(e) => {
                error!(signal = %name, error = %e, "Failed to register signal handler");
                continue;
            }
        };

        let on_signal = on_signal.clone();
        listeners.push(tokio::spawn(async move {
            while stream.next().await.is_some() {
                debug!(signal = %name, "received a shutdown signal");
                on_signal(name);
            }
        }));
        bound.push(name);
    }

    info!(signals = %join_names(&bound), "Shutdown signals bound");
    (bound, listeners)
}

fn join_names(signals: &[SignalName]) -> String {
    signals
        .iter()
        .map(SignalName::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Bind signals on platforms without Unix signals
///
/// Only `SIGINT` (Ctrl+C) can be observed; other names are skipped.
#[cfg(not(unix))]
pub fn bind_signals<F>(signals: &[SignalName], on_signal: F) -> Vec<JoinHandle<()>>
where
    F: Fn(SignalName) + Clone + Send + Sync + 'static,
{
    use tracing::warn;

    let mut bound = Vec::new();
    let mut listeners = Vec::new();
    for &name in signals {
        if name != SignalName::Int {
            warn!(signal = %name, "signal not supported on this platform; skipping");
            continue;
        }
        let on_signal = on_signal.clone();
        listeners.push(tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "Failed to wait for Ctrl+C");
                    return;
                }
                debug!(signal = %name, "received a shutdown signal");
                on_signal(name);
            }
        }));
        bound.push(name);
    }

    info!(signals = %join_names(&bound), "Shutdown signals bound");
    listeners
}
