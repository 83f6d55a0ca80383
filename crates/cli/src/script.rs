//! Line-oriented operation scripts.
//!
//! One operation per line:
//!
//! ```text
//! add-server NAME [VNODES]
//! remove-server NAME
//! toggle NAME
//! revive NAME
//! add-client ID
//! place-client ID FRACTION
//! remove-client ID
//! redistribute
//! snapshot
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use corelib::Partitioner;
use distribution::{DistributionEngine, MappingStore, Rebalance};
use std::fmt;
use std::str::FromStr;

/// A single scripted engine operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptOp {
    AddServer { name: String, vnodes: Option<usize> },
    RemoveServer(String),
    Toggle(String),
    Revive(String),
    AddClient(String),
    PlaceClient { id: String, fraction: f64 },
    RemoveClient(String),
    Redistribute,
    Snapshot,
}

/// Why a script line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOpError(String);

impl fmt::Display for ParseOpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseOpError {}

impl FromStr for ScriptOp {
    type Err = ParseOpError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let verb = parts
            .next()
            .ok_or_else(|| ParseOpError("empty line".to_string()))?;
        let args: Vec<&str> = parts.collect();

        let one = |what: &str| -> Result<String, ParseOpError> {
            match args.as_slice() {
                [arg] => Ok(arg.to_string()),
                _ => Err(ParseOpError(format!("{} expects exactly one {}", verb, what))),
            }
        };

        match verb {
            "add-server" => match args.as_slice() {
                [name] => Ok(ScriptOp::AddServer { name: name.to_string(), vnodes: None }),
                [name, vnodes] => {
                    let vnodes = vnodes
                        .parse()
                        .map_err(|_| ParseOpError(format!("invalid vnode count: {}", vnodes)))?;
                    Ok(ScriptOp::AddServer { name: name.to_string(), vnodes: Some(vnodes) })
                }
                _ => Err(ParseOpError("add-server expects NAME [VNODES]".to_string())),
            },
            "remove-server" => Ok(ScriptOp::RemoveServer(one("server name")?)),
            "toggle" => Ok(ScriptOp::Toggle(one("server name")?)),
            "revive" => Ok(ScriptOp::Revive(one("server name")?)),
            "add-client" => Ok(ScriptOp::AddClient(one("client id")?)),
            "remove-client" => Ok(ScriptOp::RemoveClient(one("client id")?)),
            "place-client" => match args.as_slice() {
                [id, fraction] => {
                    let fraction = fraction
                        .parse()
                        .map_err(|_| ParseOpError(format!("invalid position: {}", fraction)))?;
                    Ok(ScriptOp::PlaceClient { id: id.to_string(), fraction })
                }
                _ => Err(ParseOpError("place-client expects ID FRACTION".to_string())),
            },
            "redistribute" if args.is_empty() => Ok(ScriptOp::Redistribute),
            "snapshot" if args.is_empty() => Ok(ScriptOp::Snapshot),
            other => Err(ParseOpError(format!("unknown operation: {}", other))),
        }
    }
}

/// What applying one operation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    /// One-line description, or a JSON document for `snapshot`.
    pub text: String,
    /// Clients the operation failed to place.
    pub dropped: usize,
}

impl Applied {
    fn line(text: String) -> Self {
        Self { text, dropped: 0 }
    }

    fn rebalanced(text: String, report: &Rebalance) -> Self {
        Self {
            text: format!("{} ({})", text, summary(report)),
            dropped: report.dropped.len(),
        }
    }
}

/// Parse a line, skipping blanks and comments.
pub fn parse_line(line: &str) -> Option<Result<ScriptOp, ParseOpError>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(line.parse())
}

impl ScriptOp {
    /// Apply to `engine` and describe the outcome.
    ///
    /// Routing failures are reported in the result, not returned as errors.
    pub fn apply<P, S>(&self, engine: &mut DistributionEngine<P, S>) -> serde_json::Result<Applied>
    where
        P: Partitioner,
        S: MappingStore,
    {
        let applied = match self {
            ScriptOp::AddServer { name, vnodes } => {
                let vnodes = vnodes.unwrap_or(engine.config().virtual_nodes);
                match engine.add_server_with_vnodes(name, vnodes) {
                    Ok(Some(report)) => Applied::rebalanced(format!("added {}", name), &report),
                    Ok(None) => Applied::line(format!("{} already registered", name)),
                    Err(e) => Applied::line(format!("cannot add {}: {}", name, e)),
                }
            }
            ScriptOp::RemoveServer(name) => match engine.remove_server(name) {
                Some(report) => Applied::rebalanced(format!("removed {}", name), &report),
                None => Applied::line(format!("unknown server {}", name)),
            },
            ScriptOp::Toggle(name) => match engine.toggle_server(name) {
                Some((state, report)) => {
                    Applied::rebalanced(format!("{} is {}", name, state), &report)
                }
                None => Applied::line(format!("unknown server {}", name)),
            },
            ScriptOp::Revive(name) => match engine.revive_server(name) {
                Some(report) => Applied::rebalanced(format!("{} is available", name), &report),
                None => Applied::line(format!("unknown server {}", name)),
            },
            ScriptOp::AddClient(id) => route(id, engine.assign_client(id)),
            ScriptOp::PlaceClient { id, fraction } => {
                route(id, engine.place_client_at(id, *fraction))
            }
            ScriptOp::RemoveClient(id) => {
                if engine.remove_client(id) {
                    Applied::line(format!("removed client {}", id))
                } else {
                    Applied::line(format!("unknown client {}", id))
                }
            }
            ScriptOp::Redistribute => {
                Applied::rebalanced("redistributed".to_string(), &engine.redistribute_all())
            }
            ScriptOp::Snapshot => Applied::line(serde_json::to_string_pretty(&engine.snapshot())?),
        };
        Ok(applied)
    }
}

fn route(id: &str, result: corelib::Result<String>) -> Applied {
    match result {
        Ok(server) => Applied::line(format!("{} -> {}", id, server)),
        Err(e) => Applied {
            text: format!("{} dropped: {}", id, e),
            dropped: 1,
        },
    }
}

fn summary(report: &Rebalance) -> String {
    format!(
        "{} placed, {} moved, {} dropped",
        report.placed.len(),
        report.moved,
        report.dropped.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use distribution::EngineConfig;

    #[test]
    fn test_parse_operations() {
        assert_eq!(
            "add-server a 8".parse::<ScriptOp>().unwrap(),
            ScriptOp::AddServer { name: "a".to_string(), vnodes: Some(8) }
        );
        assert_eq!(
            "place-client c1 0.25".parse::<ScriptOp>().unwrap(),
            ScriptOp::PlaceClient { id: "c1".to_string(), fraction: 0.25 }
        );
        assert_eq!("toggle a".parse::<ScriptOp>().unwrap(), ScriptOp::Toggle("a".to_string()));
        assert_eq!("snapshot".parse::<ScriptOp>().unwrap(), ScriptOp::Snapshot);
    }

    #[test]
    fn test_parse_errors() {
        assert!("toggle".parse::<ScriptOp>().is_err());
        assert!("toggle a b".parse::<ScriptOp>().is_err());
        assert!("add-server a many".parse::<ScriptOp>().is_err());
        assert!("explode".parse::<ScriptOp>().is_err());
        assert!("redistribute now".parse::<ScriptOp>().is_err());
    }

    #[test]
    fn test_comments_and_blanks_skipped() {
        assert!(parse_line("   ").is_none());
        assert!(parse_line("# add-server a").is_none());
        assert!(parse_line(" add-client x ").unwrap().is_ok());
    }

    #[test]
    fn test_apply_reports_outcomes() {
        let mut engine = DistributionEngine::new(EngineConfig::default()).unwrap();
        let out = ScriptOp::AddClient("c1".to_string()).apply(&mut engine).unwrap();
        assert_eq!(out.text, "c1 dropped: ring is empty");
        assert_eq!(out.dropped, 1);

        let out = ScriptOp::AddServer { name: "a".to_string(), vnodes: None }
            .apply(&mut engine)
            .unwrap();
        assert_eq!(out.text, "added a (0 placed, 0 moved, 0 dropped)");

        let out = ScriptOp::AddClient("c1".to_string()).apply(&mut engine).unwrap();
        assert_eq!(out, Applied { text: "c1 -> a".to_string(), dropped: 0 });

        let out = ScriptOp::Toggle("a".to_string()).apply(&mut engine).unwrap();
        assert_eq!(out.text, "a is offline (0 placed, 0 moved, 1 dropped)");
        assert_eq!(out.dropped, 1);

        let out = ScriptOp::Snapshot.apply(&mut engine).unwrap();
        let json: serde_json::Value = serde_json::from_str(&out.text).unwrap();
        assert_eq!(json["servers"][0]["state"], "TemporarilyOffline");
    }
}
