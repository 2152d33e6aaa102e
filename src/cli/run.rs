//! Line-oriented JSON command loop.
//!
//! Each input line is one command object tagged by `op`; each command gets
//! exactly one response line:
//!
//! ```text
//! {"op":"like","user_id":999,"item_id":101}
//! {"ok":true,"result":{"timestamp":1700000000}}
//! {"op":"recommend","user_id":999,"k":5,"algorithm":"ppr","seen":[101]}
//! {"ok":true,"result":{"user_id":999,"tier":"personalized",...}}
//! {"op":"recommend","user_id":-1}
//! {"ok":false,"error":"invalid input: user_id must be non-negative, got -1"}
//! ```
//!
//! Ids and counts arrive as signed integers so negative values are rejected
//! with a proper error instead of a parse failure.

use super::{App, parse_genre};
use crate::models::{Algorithm, RecommendRequest, non_negative};
use crate::{Error, Result, current_timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::io::{BufRead, Write};

const DEFAULT_K: i64 = 10;

const fn default_k() -> i64 {
    DEFAULT_K
}

/// A command read from one input line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LineCommand {
    /// Recommend items for a user.
    Recommend {
        /// Target user.
        user_id: i64,
        /// Number of items, default 10.
        #[serde(default = "default_k")]
        k: i64,
        /// `bfs` (default) or `ppr`.
        #[serde(default)]
        algorithm: Option<String>,
        /// Items to exclude.
        #[serde(default)]
        seen: Vec<i64>,
        /// Preferred genre names; omitted means stored preferences.
        #[serde(default)]
        genres: Option<Vec<String>>,
        /// PPR walk count override.
        #[serde(default)]
        walks: Option<i64>,
        /// PPR depth override.
        #[serde(default)]
        depth: Option<i64>,
    },
    /// Record a like.
    Like {
        /// User.
        user_id: i64,
        /// Item.
        item_id: i64,
        /// Seconds since the epoch; defaults to now.
        #[serde(default)]
        timestamp: Option<u64>,
    },
    /// Remove a like.
    Unlike {
        /// User.
        user_id: i64,
        /// Item.
        item_id: i64,
    },
    /// Tag an item with a genre.
    Genre {
        /// Item.
        item_id: i64,
        /// Genre name.
        genre: String,
    },
    /// Replace a user's preferred genres.
    Prefs {
        /// User.
        user_id: i64,
        /// Genre names.
        genres: Vec<String>,
    },
    /// Report graph counts.
    Stats,
    /// Write a snapshot now.
    Snapshot,
}

/// One response line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineResponse {
    /// Whether the command succeeded.
    pub ok: bool,
    /// Command output on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LineResponse {
    fn success(result: Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    fn failure(error: impl std::fmt::Display) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(error.to_string()),
        }
    }
}

/// Counters for a finished loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeStats {
    /// Commands answered successfully.
    pub handled: usize,
    /// Commands answered with an error.
    pub failed: usize,
}

/// Answers commands from `input` until EOF.
///
/// Blank lines are skipped. Malformed or failing commands produce an error
/// response and the loop continues.
///
/// # Errors
///
/// Returns an error only if reading input or writing output fails.
pub fn serve_lines(app: &App, input: impl BufRead, mut output: impl Write) -> Result<ServeStats> {
    let mut stats = ServeStats::default();
    for line in input.lines() {
        let line = line.map_err(|e| Error::operation("read_command", e))?;
        if line.trim().is_empty() {
            continue;
        }

        let response = handle_line(app, &line);
        if response.ok {
            stats.handled += 1;
        } else {
            stats.failed += 1;
        }

        let encoded =
            serde_json::to_string(&response).map_err(|e| Error::operation("encode_response", e))?;
        writeln!(output, "{encoded}").map_err(|e| Error::operation("write_response", e))?;
        output
            .flush()
            .map_err(|e| Error::operation("write_response", e))?;
    }
    tracing::info!(handled = stats.handled, failed = stats.failed, "Input closed");
    Ok(stats)
}

/// Parses and executes one command line.
pub fn handle_line(app: &App, line: &str) -> LineResponse {
    let command: LineCommand = match serde_json::from_str(line) {
        Ok(command) => command,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected malformed command");
            return LineResponse::failure(format!("malformed command: {e}"));
        },
    };
    match execute(app, command) {
        Ok(result) => LineResponse::success(result),
        Err(e) => LineResponse::failure(e),
    }
}

fn execute(app: &App, command: LineCommand) -> Result<Value> {
    let engine = app.engine();
    match command {
        LineCommand::Recommend {
            user_id,
            k,
            algorithm,
            seen,
            genres,
            walks,
            depth,
        } => {
            let mut request = RecommendRequest::from_raw(user_id, k)?;
            if let Some(name) = algorithm {
                let algorithm = Algorithm::parse(&name)
                    .ok_or_else(|| Error::InvalidInput(format!("unknown algorithm: {name}")))?;
                request = request.with_algorithm(algorithm);
            }
            let seen = seen
                .into_iter()
                .map(|id| non_negative("seen item", id))
                .collect::<Result<Vec<_>>>()?;
            request = request.with_seen(seen);
            if let Some(names) = genres {
                let genres = names
                    .iter()
                    .map(|name| parse_genre(name).map(crate::models::Genre::id))
                    .collect::<Result<Vec<_>>>()?;
                request = request.with_preferred_genres(genres);
            }
            if let Some(walks) = walks {
                request = request.with_walks(to_usize("walks", walks)?);
            }
            if let Some(depth) = depth {
                request = request.with_depth(to_usize("depth", depth)?);
            }
            let recommendation = engine.recommend(&request)?;
            serde_json::to_value(recommendation).map_err(|e| Error::operation("encode_result", e))
        },
        LineCommand::Like {
            user_id,
            item_id,
            timestamp,
        } => {
            let timestamp = engine.record_edge(
                non_negative("user_id", user_id)?,
                non_negative("item_id", item_id)?,
                timestamp.unwrap_or_else(current_timestamp),
            )?;
            Ok(json!({ "timestamp": timestamp }))
        },
        LineCommand::Unlike { user_id, item_id } => {
            let removed = engine.remove_edge(
                non_negative("user_id", user_id)?,
                non_negative("item_id", item_id)?,
            )?;
            Ok(json!({ "removed": removed }))
        },
        LineCommand::Genre { item_id, genre } => {
            let genre = parse_genre(&genre)?;
            engine.set_genre(non_negative("item_id", item_id)?, genre)?;
            Ok(json!({ "genre": genre.as_str() }))
        },
        LineCommand::Prefs { user_id, genres } => {
            let genres = genres
                .iter()
                .map(|name| parse_genre(name).map(crate::models::Genre::id))
                .collect::<Result<Vec<_>>>()?;
            let changed = engine.set_preferences(non_negative("user_id", user_id)?, genres)?;
            Ok(json!({ "changed": changed }))
        },
        LineCommand::Stats => {
            serde_json::to_value(engine.stats()).map_err(|e| Error::operation("encode_result", e))
        },
        LineCommand::Snapshot => Ok(json!({ "saved": app.save_snapshot() })),
    }
}

fn to_usize(name: &str, value: i64) -> Result<usize> {
    usize::try_from(non_negative(name, value)?)
        .map_err(|_| Error::InvalidInput(format!("{name} out of range: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphrecConfig;
    use crate::storage::{FileSnapshotStore, SqliteRowStore};
    use std::sync::Arc;

    fn app(dir: &tempfile::TempDir) -> App {
        let config = GraphrecConfig::default().with_data_dir(dir.path());
        let rows = Arc::new(SqliteRowStore::in_memory().unwrap());
        App::with_stores(&config, rows, FileSnapshotStore::new(dir.path().join("graph.snap")))
            .unwrap()
    }

    fn responses(app: &App, input: &str) -> Vec<Value> {
        let mut output = Vec::new();
        serve_lines(app, input.as_bytes(), &mut output).unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_bridge_session() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);
        let input = r#"
{"op":"like","user_id":999,"item_id":101,"timestamp":5}
{"op":"like","user_id":888,"item_id":101}
{"op":"like","user_id":888,"item_id":104}
{"op":"recommend","user_id":999,"k":5}
"#;
        let out = responses(&app, input);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0]["result"]["timestamp"], 5);
        assert_eq!(out[3]["ok"], true);
        assert_eq!(out[3]["result"]["tier"], "personalized");
        assert_eq!(out[3]["result"]["items"][0]["id"], 104);
    }

    #[test]
    fn test_errors_do_not_stop_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);
        let input = "not json\n{\"op\":\"recommend\",\"user_id\":-1}\n{\"op\":\"stats\"}\n";
        let mut output = Vec::new();
        let stats = serve_lines(&app, input.as_bytes(), &mut output).unwrap();
        assert_eq!(stats, ServeStats { handled: 1, failed: 2 });

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].contains("malformed command"));
        assert!(lines[1].contains("non-negative"));
        assert!(lines[2].contains("\"edges\":0"));
    }

    #[test]
    fn test_empty_graph_answers_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);
        let response = handle_line(&app, r#"{"op":"recommend","user_id":1}"#);
        let result = response.result.unwrap();
        assert_eq!(result["tier"], "catalog");
        assert_eq!(result["items"], json!([]));
    }

    #[test]
    fn test_unknown_algorithm_and_genre_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);
        let response = handle_line(&app, r#"{"op":"recommend","user_id":1,"algorithm":"ann"}"#);
        assert!(response.error.unwrap().contains("unknown algorithm"));
        let response = handle_line(&app, r#"{"op":"genre","item_id":1,"genre":"polka"}"#);
        assert!(response.error.unwrap().contains("unknown genre"));
    }

    #[test]
    fn test_prefs_genre_and_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir);
        let out = responses(
            &app,
            concat!(
                "{\"op\":\"genre\",\"item_id\":7,\"genre\":\"horror\"}\n",
                "{\"op\":\"prefs\",\"user_id\":1,\"genres\":[\"horror\",\"sci-fi\"]}\n",
                "{\"op\":\"unlike\",\"user_id\":1,\"item_id\":7}\n",
                "{\"op\":\"snapshot\"}\n",
            ),
        );
        assert_eq!(out[0]["result"]["genre"], "Horror");
        assert_eq!(out[1]["result"]["changed"], true);
        assert_eq!(out[2]["result"]["removed"], false);
        assert_eq!(out[3]["result"]["saved"], true);
        assert!(dir.path().join("graph.snap").exists());
    }
}
