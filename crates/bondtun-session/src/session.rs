//! One bonded session: link establishment by role and supervision of the
//! ingress, distributor and collector units.

use std::collections::HashMap;
use std::net::SocketAddr;

use bondtun_frame::{FrameConfig, FrameReader, FrameWriter};
use bondtun_transport::{dial, SocketOptions, TcpLinkListener};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, info, info_span, Instrument};

use crate::collector::LinkCollector;
use crate::config::{RoleConfig, SessionConfig};
use crate::distributor::LinkDistributor;
use crate::error::{Result, SessionError};
use crate::ingress::IngressReader;
use crate::queue::frame_queue;
use crate::teardown::Teardown;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Stopped by its external shutdown signal.
    Clean,
    /// Stopped because setup or a session unit failed.
    Error,
}

/// Lifecycle of one bonded session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    LinkSetupInProgress,
    Running,
    Terminated(Termination),
}

impl SessionState {
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated(_))
    }
}

/// Per-session tuning handed to the three session units.
#[derive(Debug, Clone)]
pub struct SessionParams {
    /// Largest endpoint read, and therefore largest frame payload sent.
    pub chunk_size: usize,
    /// Frame queue capacity.
    pub queue_capacity: usize,
    /// Codec settings for every link.
    pub frame: FrameConfig,
}

impl SessionParams {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            chunk_size: config.chunk_size(),
            queue_capacity: config.queue_capacity(),
            frame: config.frame_config(),
        }
    }
}

/// Run the three session units over an established endpoint and link set
/// until teardown.
///
/// `links` must be in canonical order. Returns `Ok(())` when the session was
/// stopped from outside through a parent of the teardown token, and the first
/// unit error otherwise.
pub async fn run_bonded<E, L>(
    endpoint: E,
    links: Vec<L>,
    params: &SessionParams,
    teardown: Teardown,
) -> Result<()>
where
    E: AsyncRead + AsyncWrite + Send + 'static,
    L: AsyncRead + AsyncWrite + Send + 'static,
{
    let (endpoint_read, endpoint_write) = tokio::io::split(endpoint);
    let mut readers = Vec::with_capacity(links.len());
    let mut writers = Vec::with_capacity(links.len());
    for link in links {
        let (read, write) = tokio::io::split(link);
        readers.push(FrameReader::with_config(read, params.frame.clone()));
        writers.push(FrameWriter::with_config(write, params.frame.clone()));
    }
    let (queue_tx, queue_rx) = frame_queue(params.queue_capacity);

    let mut units = JoinSet::new();
    let mut names = HashMap::with_capacity(3);

    let ingress = IngressReader::new(endpoint_read, queue_tx, params.chunk_size);
    let handle = units.spawn(
        ingress
            .run(teardown.clone())
            .instrument(debug_span!("ingress")),
    );
    names.insert(handle.id(), "ingress");

    let distributor = LinkDistributor::new(writers);
    let handle = units.spawn(
        distributor
            .run(queue_rx, teardown.clone())
            .instrument(debug_span!("distributor")),
    );
    names.insert(handle.id(), "distributor");

    let collector = LinkCollector::new(readers, endpoint_write);
    let handle = units.spawn(
        collector
            .run(teardown.clone())
            .instrument(debug_span!("collector")),
    );
    names.insert(handle.id(), "collector");

    let mut failure: Option<SessionError> = None;
    while let Some(joined) = units.join_next_with_id().await {
        let outcome = match joined {
            Ok((_, outcome)) => outcome,
            Err(err) => {
                let unit = names.get(&err.id()).copied().unwrap_or("unknown");
                let err = SessionError::UnitFailed {
                    unit,
                    reason: err.to_string(),
                };
                // A panicked unit cannot fire teardown itself.
                teardown.fire(format_args!("{unit}: {err}"));
                Err(err)
            }
        };

        if let Err(err) = outcome {
            let primary = failure
                .as_ref()
                .map_or(true, |first| first.is_secondary() && !err.is_secondary());
            if primary {
                failure = Some(err);
            } else {
                debug!(error = %err, "unit failed after teardown");
            }
        }
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Establishes and runs one bonded session over TCP.
///
/// The listener is bound up front so that a peer (or a test) can learn the
/// local address before [`SessionManager::run`] starts accepting.
pub struct SessionManager {
    config: SessionConfig,
    socket: SocketOptions,
    listener: TcpLinkListener,
    state: watch::Sender<SessionState>,
}

impl SessionManager {
    /// Validate `config` and bind its listener. Must be called inside a
    /// tokio runtime.
    pub fn bind(config: SessionConfig, socket: SocketOptions) -> Result<Self> {
        config.validate()?;
        let listener = TcpLinkListener::bind(config.bind_addr(), config.backlog(), socket)
            .map_err(SessionError::Bind)?;
        let (state, _) = watch::channel(SessionState::Initializing);

        info!(
            session = %config.name,
            role = config.role_name(),
            listen = %listener.local_addr(),
            links = config.link_count(),
            "session bound"
        );

        Ok(Self {
            config,
            socket,
            listener,
            state,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Address of the endpoint listener (initiator) or link listener
    /// (responder).
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Establish the endpoint and every link, then run until teardown or
    /// until `shutdown` is cancelled.
    ///
    /// Ends in `Terminated(Clean)` and `Ok(())` only when stopped through
    /// `shutdown`.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let span = info_span!(
            "session",
            session = %self.config.name,
            role = self.config.role_name()
        );
        self.run_inner(shutdown).instrument(span).await
    }

    async fn run_inner(self, shutdown: CancellationToken) -> Result<()> {
        let Self {
            config,
            socket,
            listener,
            state,
        } = self;

        state.send_replace(SessionState::LinkSetupInProgress);
        let established = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("shutdown during link setup");
                state.send_replace(SessionState::Terminated(Termination::Clean));
                return Ok(());
            }
            established = establish(&config, socket, &listener) => established,
        };
        drop(listener);

        let (endpoint, links) = match established {
            Ok(parts) => parts,
            Err(err) => {
                state.send_replace(SessionState::Terminated(Termination::Error));
                return Err(err);
            }
        };

        state.send_replace(SessionState::Running);
        info!(links = links.len(), chunk = config.chunk_size(), "session running");

        let teardown = Teardown::new(shutdown.child_token());
        let params = SessionParams::from_config(&config);
        let result = run_bonded(endpoint, links, &params, teardown.clone()).await;

        let termination = if result.is_ok() {
            info!("session stopped by shutdown");
            Termination::Clean
        } else {
            debug!(cause = teardown.cause().unwrap_or("unknown"), "session torn down");
            Termination::Error
        };
        state.send_replace(SessionState::Terminated(termination));
        result
    }
}

/// Accept and dial in the order the role prescribes. The returned link
/// vector is in canonical order.
async fn establish(
    config: &SessionConfig,
    socket: SocketOptions,
    listener: &TcpLinkListener,
) -> Result<(TcpStream, Vec<TcpStream>)> {
    match &config.role {
        RoleConfig::Initiator { links, .. } => {
            let (endpoint, peer) = listener
                .accept()
                .await
                .map_err(SessionError::EndpointSetup)?;
            info!(%peer, "endpoint connected");

            let mut streams = Vec::with_capacity(links.len());
            for (index, link) in links.iter().enumerate() {
                let stream = dial(link.local, &link.remote, socket)
                    .await
                    .map_err(|source| SessionError::LinkSetup { index, source })?;
                info!(link = index, remote = %link.remote, "link established");
                streams.push(stream);
            }
            Ok((endpoint, streams))
        }
        RoleConfig::Responder {
            link_count, remote, ..
        } => {
            let mut streams = Vec::with_capacity(*link_count);
            for index in 0..*link_count {
                let (stream, peer) = listener
                    .accept()
                    .await
                    .map_err(|source| SessionError::LinkSetup { index, source })?;
                info!(link = index, %peer, "link accepted");
                streams.push(stream);
            }

            let endpoint = dial(None, remote, socket)
                .await
                .map_err(SessionError::EndpointSetup)?;
            info!(%remote, "endpoint connected");
            Ok((endpoint, streams))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    use super::*;

    fn params(chunk_size: usize) -> SessionParams {
        SessionParams {
            chunk_size,
            queue_capacity: 8,
            frame: FrameConfig::default(),
        }
    }

    /// Two bonded sessions joined back to back by `n` in-memory links.
    struct Pair {
        app_a: DuplexStream,
        app_b: DuplexStream,
        teardown_a: Teardown,
        teardown_b: Teardown,
        session_a: tokio::task::JoinHandle<Result<()>>,
        session_b: tokio::task::JoinHandle<Result<()>>,
    }

    fn bonded_pair(n: usize, chunk_size: usize) -> Pair {
        let (app_a, endpoint_a) = tokio::io::duplex(64 * 1024);
        let (app_b, endpoint_b) = tokio::io::duplex(64 * 1024);
        let (links_a, links_b): (Vec<_>, Vec<_>) =
            (0..n).map(|_| tokio::io::duplex(4096)).unzip();

        let teardown_a = Teardown::new(CancellationToken::new());
        let teardown_b = Teardown::new(CancellationToken::new());
        let session_a = {
            let teardown = teardown_a.clone();
            tokio::spawn(async move {
                run_bonded(endpoint_a, links_a, &params(chunk_size), teardown).await
            })
        };
        let session_b = {
            let teardown = teardown_b.clone();
            tokio::spawn(async move {
                run_bonded(endpoint_b, links_b, &params(chunk_size), teardown).await
            })
        };

        Pair {
            app_a,
            app_b,
            teardown_a,
            teardown_b,
            session_a,
            session_b,
        }
    }

    #[tokio::test]
    async fn bytes_cross_both_directions() {
        let mut pair = bonded_pair(3, 7);
        let upstream: Vec<u8> = (0..4000u32).map(|i| (i % 251) as u8).collect();
        let downstream: Vec<u8> = (0..2500u32).map(|i| (i % 13) as u8).collect();

        pair.app_a.write_all(&upstream).await.unwrap();
        pair.app_b.write_all(&downstream).await.unwrap();

        let mut got_up = vec![0u8; upstream.len()];
        pair.app_b.read_exact(&mut got_up).await.unwrap();
        assert_eq!(got_up, upstream);

        let mut got_down = vec![0u8; downstream.len()];
        pair.app_a.read_exact(&mut got_down).await.unwrap();
        assert_eq!(got_down, downstream);

        pair.teardown_a.fire("test done");
        pair.teardown_b.fire("test done");
        assert!(pair.session_a.await.unwrap().is_ok());
        assert!(pair.session_b.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn parent_cancel_is_clean() {
        let parent = CancellationToken::new();
        let teardown = Teardown::new(parent.child_token());
        let (_app, endpoint) = tokio::io::duplex(64);
        let (link, _far) = tokio::io::duplex(64);

        let session = tokio::spawn(async move {
            run_bonded(endpoint, vec![link], &params(16), teardown).await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        parent.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), session)
            .await
            .expect("session must stop on parent cancel")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn endpoint_close_tears_down_every_unit() {
        let teardown = Teardown::new(CancellationToken::new());
        let (app, endpoint) = tokio::io::duplex(64);
        let (links, mut far): (Vec<_>, Vec<_>) = (0..3).map(|_| tokio::io::duplex(64)).unzip();

        let session = {
            let teardown = teardown.clone();
            tokio::spawn(async move { run_bonded(endpoint, links, &params(16), teardown).await })
        };
        drop(app);

        let err = tokio::time::timeout(Duration::from_secs(1), session)
            .await
            .expect("no unit may stay blocked")
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, SessionError::EndpointClosed));
        assert!(teardown.cause().unwrap().starts_with("ingress"));

        // Every link is closed once the units are gone.
        for link in &mut far {
            let mut buf = [0u8; 1];
            assert_eq!(link.read(&mut buf).await.unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn broken_link_stops_both_peers() {
        let mut pair = bonded_pair(2, 8);

        // Stop B abruptly: A's links see EOF and must tear A down as well.
        pair.teardown_b.fire("peer gone");
        assert!(pair.session_b.await.unwrap().is_ok());

        let err = tokio::time::timeout(Duration::from_secs(1), pair.session_a)
            .await
            .expect("peer loss must end the session")
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, SessionError::Link { .. }));
        assert!(pair.teardown_a.is_fired());

        let mut buf = [0u8; 1];
        assert_eq!(pair.app_a.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn single_link_loss_on_idle_session_tears_down() {
        let teardown = Teardown::new(CancellationToken::new());
        let (mut app, endpoint) = tokio::io::duplex(64);
        let (links, mut far): (Vec<_>, Vec<_>) = (0..3).map(|_| tokio::io::duplex(64)).unzip();

        let session = {
            let teardown = teardown.clone();
            tokio::spawn(async move { run_bonded(endpoint, links, &params(16), teardown).await })
        };
        // Nothing flows; only the far end of link 2 goes away.
        drop(far.remove(2));

        let err = tokio::time::timeout(Duration::from_secs(2), session)
            .await
            .expect("a single lost link must end the session")
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, SessionError::Link { index: 2, .. }));
        assert!(teardown.cause().unwrap().starts_with("collector"));

        for link in &mut far {
            let mut buf = [0u8; 1];
            let read = tokio::time::timeout(Duration::from_millis(200), link.read(&mut buf))
                .await
                .expect("surviving links must be closed");
            assert_eq!(read.unwrap(), 0);
        }
        let mut buf = [0u8; 1];
        assert_eq!(app.read(&mut buf).await.unwrap(), 0);
    }

    #[test]
    fn terminated_states() {
        assert!(SessionState::Terminated(Termination::Clean).is_terminated());
        assert!(!SessionState::Running.is_terminated());
    }
}
