//! Orchestrated-environment detection

/// Set by the kubelet in every container of a pod
pub const KUBERNETES_SERVICE_HOST: &str = "KUBERNETES_SERVICE_HOST";

/// Where the process is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Detected a Kubernetes pod
    Kubernetes,
    /// Detected a local or development run: no signal wiring, ephemeral probe port
    Local,
    /// Detection disabled; the service runs in orchestrated mode
    Undetected,
}

impl Environment {
    /// Detect the environment from the process environment variables
    pub fn detect() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        match lookup(KUBERNETES_SERVICE_HOST) {
            Some(host) if !host.trim().is_empty() => Environment::Kubernetes,
            _ => Environment::Local,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Environment::Local)
    }

    /// Whether the environment came from detection rather than configuration
    pub fn is_detected(&self) -> bool {
        !matches!(self, Environment::Undetected)
    }
}
