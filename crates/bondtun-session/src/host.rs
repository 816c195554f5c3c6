//! Hosting several independent sessions in one process.
//!
//! Sessions share nothing but the socket options and the host shutdown
//! token. A session that fails is logged and reported; its siblings keep
//! running.

use std::collections::HashMap;
use std::net::SocketAddr;

use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::HostConfig;
use crate::error::{ConfigError, Result, SessionError};
use crate::session::SessionManager;

/// Final result of one hosted session.
#[derive(Debug)]
pub struct SessionOutcome {
    pub name: String,
    pub result: Result<()>,
}

impl SessionOutcome {
    /// Whether the session ended through host shutdown.
    pub fn is_clean(&self) -> bool {
        self.result.is_ok()
    }
}

/// Outcomes of every configured session, in configuration order.
#[derive(Debug, Default)]
pub struct HostReport {
    pub outcomes: Vec<SessionOutcome>,
}

impl HostReport {
    pub fn all_clean(&self) -> bool {
        self.outcomes.iter().all(SessionOutcome::is_clean)
    }

    pub fn failures(&self) -> impl Iterator<Item = &SessionOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.is_clean())
    }
}

/// Every configured session with its listener bound.
pub struct Host {
    bound: Vec<(usize, SessionManager)>,
    failed: Vec<(usize, SessionOutcome)>,
}

impl Host {
    /// Bind every session's listener. A session that cannot bind is recorded
    /// as failed and does not prevent the others from binding.
    pub fn bind(config: HostConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;

        let mut bound = Vec::with_capacity(config.sessions.len());
        let mut failed = Vec::new();
        for (index, session) in config.sessions.into_iter().enumerate() {
            let name = session.name.clone();
            match SessionManager::bind(session, config.socket) {
                Ok(manager) => bound.push((index, manager)),
                Err(err) => {
                    error!(session = %name, error = %err, "session failed to start");
                    failed.push((
                        index,
                        SessionOutcome {
                            name,
                            result: Err(err),
                        },
                    ));
                }
            }
        }
        Ok(Self { bound, failed })
    }

    /// Name and listen address of every successfully bound session.
    pub fn listeners(&self) -> impl Iterator<Item = (&str, SocketAddr)> {
        self.bound
            .iter()
            .map(|(_, manager)| (manager.name(), manager.local_addr()))
    }

    /// Run every bound session to completion.
    ///
    /// Cancelling `shutdown` stops every session cleanly.
    pub async fn run(self, shutdown: CancellationToken) -> HostReport {
        let mut outcomes = self.failed;
        let mut sessions = JoinSet::new();
        let mut running = HashMap::with_capacity(self.bound.len());

        for (index, manager) in self.bound {
            let name = manager.name().to_string();
            let handle = sessions.spawn(manager.run(shutdown.child_token()));
            running.insert(handle.id(), (index, name));
        }

        join_sessions(sessions, running, &mut outcomes).await;

        outcomes.sort_by_key(|(index, _)| *index);
        HostReport {
            outcomes: outcomes.into_iter().map(|(_, outcome)| outcome).collect(),
        }
    }
}

/// Wait for every session task, recording each outcome under the config
/// index and name its task id maps to. A panicked session keeps both.
async fn join_sessions(
    mut sessions: JoinSet<Result<()>>,
    mut running: HashMap<Id, (usize, String)>,
    outcomes: &mut Vec<(usize, SessionOutcome)>,
) {
    while let Some(joined) = sessions.join_next_with_id().await {
        let (id, result) = match joined {
            Ok((id, result)) => (id, result),
            Err(err) => (
                err.id(),
                Err(SessionError::UnitFailed {
                    unit: "session",
                    reason: err.to_string(),
                }),
            ),
        };
        let Some((index, name)) = running.remove(&id) else {
            continue;
        };

        match &result {
            Ok(()) => info!(session = %name, "session ended cleanly"),
            Err(err) => error!(session = %name, error = %err, "session terminated"),
        }
        outcomes.push((index, SessionOutcome { name, result }));
    }
}

/// Bind and run every session in `config` until each one terminates.
pub async fn run_host(
    config: HostConfig,
    shutdown: CancellationToken,
) -> std::result::Result<HostReport, ConfigError> {
    let host = Host::bind(config)?;
    Ok(host.run(shutdown).await)
}
