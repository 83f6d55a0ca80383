//! Subcommands.

use crate::script::parse_line;
use anyhow::Context;
use clap::Subcommand;
use corelib::Partitioner;
use distribution::{DistributionEngine, MappingStore};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Replay a script of operations, one per line (stdin when FILE is omitted).
    Replay {
        file: Option<PathBuf>,
    },
    /// Add servers and hashed clients, then print the load per server.
    Simulate {
        /// Comma-separated server names.
        #[arg(long, value_delimiter = ',', required = true)]
        servers: Vec<String>,
        /// Number of clients to assign.
        #[arg(long, default_value_t = 100)]
        clients: usize,
        /// Print the final snapshot as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

/// Summary of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    /// Operations applied.
    pub operations: usize,
    /// Clients that could not be placed.
    pub dropped: usize,
}

impl Command {
    pub fn execute<P, S>(
        &self,
        engine: &mut DistributionEngine<P, S>,
        out: &mut impl Write,
    ) -> anyhow::Result<CommandResult>
    where
        P: Partitioner,
        S: MappingStore,
    {
        match self {
            Command::Replay { file: Some(path) } => {
                let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
                replay(engine, BufReader::new(file), out)
            }
            Command::Replay { file: None } => replay(engine, io::stdin().lock(), out),
            Command::Simulate {
                servers,
                clients,
                json,
            } => simulate(engine, servers, *clients, *json, out),
        }
    }
}

/// Apply every operation in `input`, writing one result per operation.
pub fn replay<P, S>(
    engine: &mut DistributionEngine<P, S>,
    input: impl BufRead,
    out: &mut impl Write,
) -> anyhow::Result<CommandResult>
where
    P: Partitioner,
    S: MappingStore,
{
    let mut result = CommandResult::default();
    for (index, line) in input.lines().enumerate() {
        let line = line?;
        let op = match parse_line(&line) {
            Some(op) => op.with_context(|| format!("line {}", index + 1))?,
            None => continue,
        };
        let applied = op.apply(engine)?;
        result.dropped += applied.dropped;
        writeln!(out, "{}", applied.text)?;
        result.operations += 1;
    }
    Ok(result)
}

/// Add `servers`, assign `clients` generated ids and print the load.
pub fn simulate<P, S>(
    engine: &mut DistributionEngine<P, S>,
    servers: &[String],
    clients: usize,
    json: bool,
    out: &mut impl Write,
) -> anyhow::Result<CommandResult>
where
    P: Partitioner,
    S: MappingStore,
{
    let mut result = CommandResult::default();
    for name in servers {
        engine.add_server(name)?;
        result.operations += 1;
    }
    for i in 0..clients {
        if engine.assign_client(&format!("client-{:05}", i)).is_err() {
            result.dropped += 1;
        }
        result.operations += 1;
    }

    let snapshot = engine.snapshot();
    if json {
        serde_json::to_writer_pretty(&mut *out, &snapshot)?;
        writeln!(out)?;
        return Ok(result);
    }

    let total = snapshot.client_count().max(1);
    writeln!(out, "{:<20} {:<10} {:>8} {:>8}", "server", "state", "clients", "share")?;
    for server in &snapshot.servers {
        let share = server.clients.len() as f64 * 100.0 / total as f64;
        writeln!(
            out,
            "{:<20} {:<10} {:>8} {:>7.1}%",
            server.name,
            server.state.to_string(),
            server.clients.len(),
            share
        )?;
    }
    writeln!(
        out,
        "{} vnodes, {} clients, {} dropped",
        snapshot.virtual_nodes.len(),
        snapshot.client_count(),
        result.dropped
    )?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use distribution::EngineConfig;

    fn engine() -> DistributionEngine {
        DistributionEngine::new(EngineConfig::default().with_virtual_nodes(8)).unwrap()
    }

    #[test]
    fn test_replay_script() {
        let script = "\
# two servers, one drained
add-server a
add-server b
place-client c1 0.5
toggle a
toggle b
add-client c2
";
        let mut engine = engine();
        let mut out = Vec::new();
        let result = replay(&mut engine, script.as_bytes(), &mut out).unwrap();

        assert_eq!(result.operations, 6);
        // c1 is dropped when b drains, c2 finds nobody at all
        assert_eq!(result.dropped, 2);
        assert!(engine.position_of("c1").is_none());
        assert!(engine.position_of("c2").is_none());
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 6);
        assert!(text.lines().last().unwrap().starts_with("c2 dropped"));
    }

    #[test]
    fn test_replay_counts_rebalance_drops() {
        let script = "\
add-server a
add-client c1
add-client c2
add-client c3
remove-server a
";
        let mut engine = engine();
        let result = replay(&mut engine, script.as_bytes(), &mut Vec::new()).unwrap();
        assert_eq!(result.operations, 5);
        assert_eq!(result.dropped, 3);
        assert_eq!(engine.registry().client_count(), 0);
    }

    #[test]
    fn test_replay_reports_bad_line() {
        let mut engine = engine();
        let err = replay(&mut engine, "add-server a\nfly away\n".as_bytes(), &mut Vec::new())
            .unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_simulate_table() {
        let mut engine = engine();
        let servers = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut out = Vec::new();
        let result = simulate(&mut engine, &servers, 30, false, &mut out).unwrap();

        assert_eq!(result.operations, 33);
        assert_eq!(result.dropped, 0);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("server"));
        assert!(text.contains("24 vnodes, 30 clients, 0 dropped"));
    }
}
