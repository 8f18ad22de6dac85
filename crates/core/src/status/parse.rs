use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::{
    error::StatusError,
    models::{ServerOccupancy, StatusSnapshot},
};

#[derive(Debug, Deserialize)]
struct StatusBody {
    #[serde(rename = "Success", default)]
    success: Option<bool>,
    #[serde(rename = "Servers", default)]
    servers: Vec<ServerEntry>,
    #[serde(rename = "Error", default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ServerEntry {
    #[serde(rename = "Players", default)]
    players: Option<Value>,
}

/// Normalize a raw response body into a successful snapshot.
///
/// Every listed server whose `Players` field parses is kept; the server at
/// `server_index` is required to be present and well-formed.
pub fn parse_status_body(
    text: &str,
    server_index: usize,
    fetched_at: DateTime<Utc>,
) -> Result<StatusSnapshot, StatusError> {
    let raw: Value = serde_json::from_str(text)
        .map_err(|err| StatusError::Parse(format!("body is not JSON: {err}")))?;
    let body: StatusBody = serde_json::from_value(raw.clone())
        .map_err(|err| StatusError::Parse(format!("unexpected body shape: {err}")))?;

    if body.success != Some(true) {
        let message = body
            .error
            .as_ref()
            .map(error_text)
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(StatusError::Upstream(message));
    }

    let available = body.servers.len();
    let selected = body.servers.get(server_index).ok_or(StatusError::ServerIndex {
        index: server_index,
        available,
    })?;
    // Parse the selected server first so its failure is the one reported.
    players_of(server_index, selected)?;

    let servers = body
        .servers
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| match players_of(index, entry) {
            Ok(occupancy) => Some(occupancy),
            Err(err) => {
                warn!("skipping server {index} in status response: {err}");
                None
            }
        })
        .collect();

    Ok(StatusSnapshot::success(servers, fetched_at).with_raw(raw))
}

fn players_of(index: usize, entry: &ServerEntry) -> Result<ServerOccupancy, StatusError> {
    match entry.players.as_ref() {
        Some(Value::String(players)) => ServerOccupancy::parse(index, players),
        Some(other) => Err(StatusError::Parse(format!(
            "server {index} players field is not a string: {other}"
        ))),
        None => Err(StatusError::Parse(format!(
            "server {index} has no players field"
        ))),
    }
}

fn error_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "unknown error".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str, index: usize) -> Result<StatusSnapshot, StatusError> {
        parse_status_body(text, index, Utc::now())
    }

    #[test]
    fn parses_selected_server() {
        let snapshot = parse(r#"{"Success": true, "Servers":[{"Players":"5/20"}]}"#, 0).unwrap();
        assert!(snapshot.is_success());
        let server = snapshot.server(0).unwrap();
        assert_eq!((server.current_players, server.max_slots), (5, 20));
        assert!(snapshot.raw().is_some());
    }

    #[test]
    fn keeps_every_parsable_server() {
        let body = r#"{"Success": true, "Servers":[
            {"Players":"1/10", "ID": 7},
            {"Players":"broken"},
            {"Players":"3/30"}
        ]}"#;
        let snapshot = parse(body, 2).unwrap();
        let indexes: Vec<usize> = snapshot.servers().iter().map(|s| s.index).collect();
        assert_eq!(indexes, vec![0, 2]);
        assert_eq!(snapshot.server(2).unwrap().to_string(), "3/30");
    }

    #[test]
    fn non_json_is_a_parse_error() {
        assert!(matches!(parse("not json", 0), Err(StatusError::Parse(_))));
        assert!(matches!(parse("[1, 2]", 0), Err(StatusError::Parse(_))));
    }

    #[test]
    fn failed_success_flag_surfaces_error_field() {
        let err = parse(r#"{"Success": false, "Error": "bad key"}"#, 0).unwrap_err();
        assert!(matches!(err, StatusError::Upstream(ref message) if message == "bad key"));
    }

    #[test]
    fn missing_success_flag_is_upstream_failure() {
        let err = parse(r#"{"Servers":[{"Players":"5/20"}]}"#, 0).unwrap_err();
        assert!(matches!(err, StatusError::Upstream(ref message) if message == "unknown error"));
    }

    #[test]
    fn out_of_range_index_is_checked() {
        let err = parse(r#"{"Success": true, "Servers":[{"Players":"5/20"}]}"#, 3).unwrap_err();
        assert!(matches!(
            err,
            StatusError::ServerIndex {
                index: 3,
                available: 1
            }
        ));
    }

    #[test]
    fn malformed_selected_server_fails() {
        for body in [
            r#"{"Success": true, "Servers":[{"Players":"5"}]}"#,
            r#"{"Success": true, "Servers":[{"Players":5}]}"#,
            r#"{"Success": true, "Servers":[{}]}"#,
        ] {
            assert!(matches!(parse(body, 0), Err(StatusError::Parse(_))), "{body}");
        }
    }
}
