use std::net::SocketAddr;

use bondtun_session::{HostConfig, RoleConfig, SessionConfig};
use bondtun_transport::SocketOptions;
use serde::Serialize;

use crate::cmd::{load_config, CheckArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::output::{or_dash, print_json, table, OutputFormat};

#[derive(Serialize)]
struct CheckOutput {
    valid: bool,
    socket: SocketOptions,
    sessions: Vec<SessionSummary>,
}

#[derive(Serialize)]
struct SessionSummary {
    name: String,
    role: &'static str,
    listen: SocketAddr,
    link_count: usize,
    /// Dialed link targets (initiator) or the dialed endpoint (responder).
    dials: Vec<String>,
    chunk_size: usize,
    queue_capacity: usize,
    max_frame_size: usize,
}

impl SessionSummary {
    fn from_config(config: &SessionConfig) -> Self {
        let dials = match &config.role {
            RoleConfig::Initiator { links, .. } => links
                .iter()
                .map(|link| match link.local {
                    Some(local) => format!("{} via {local}", link.remote),
                    None => link.remote.to_string(),
                })
                .collect(),
            RoleConfig::Responder { remote, .. } => vec![remote.to_string()],
        };

        Self {
            name: config.name.clone(),
            role: config.role_name(),
            listen: config.bind_addr(),
            link_count: config.link_count(),
            dials,
            chunk_size: config.chunk_size(),
            queue_capacity: config.queue_capacity(),
            max_frame_size: config.max_frame_size,
        }
    }
}

fn summarize(config: &HostConfig) -> CheckOutput {
    CheckOutput {
        valid: true,
        socket: config.socket,
        sessions: config
            .sessions
            .iter()
            .map(SessionSummary::from_config)
            .collect(),
    }
}

pub fn run(args: CheckArgs, format: OutputFormat) -> CliResult<i32> {
    let config = load_config(&args.config)?;
    print_check(&summarize(&config), format);
    Ok(SUCCESS)
}

fn print_check(out: &CheckOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut t = table(vec![
                "SESSION", "ROLE", "LISTEN", "LINKS", "DIALS", "CHUNK", "QUEUE",
            ]);
            for s in &out.sessions {
                t.add_row(vec![
                    s.name.clone(),
                    s.role.to_string(),
                    s.listen.to_string(),
                    s.link_count.to_string(),
                    s.dials.join("\n"),
                    s.chunk_size.to_string(),
                    s.queue_capacity.to_string(),
                ]);
            }
            println!("{t}");
            println!(
                "socket: sndbuf={} rcvbuf={} nodelay={}",
                or_dash(out.socket.send_buffer_size),
                or_dash(out.socket.recv_buffer_size),
                out.socket.nodelay
            );
        }
        OutputFormat::Pretty => {
            for s in &out.sessions {
                println!(
                    "session={} role={} listen={} links={} chunk={} queue={} max_frame={}",
                    s.name,
                    s.role,
                    s.listen,
                    s.link_count,
                    s.chunk_size,
                    s.queue_capacity,
                    s.max_frame_size
                );
                for dial in &s.dials {
                    println!("  dial {dial}");
                }
            }
        }
        OutputFormat::Raw => {
            for s in &out.sessions {
                println!("{}\t{}\t{}\t{}", s.name, s.role, s.listen, s.link_count);
            }
        }
    }
}
