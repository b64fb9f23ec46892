//! Turning command-line arguments and batch files into identifiers.

use crate::error::{PipelineError, PipelineResult};
use onekey_core::Identifier;
use std::collections::HashSet;
use std::path::Path;

/// Parse identifiers given on the command line.
pub fn parse_identifiers<S: AsRef<str>>(args: &[S]) -> PipelineResult<Vec<Identifier>> {
    args.iter()
        .map(|a| Identifier::parse(a.as_ref()).map_err(PipelineError::from))
        .collect()
}

/// Parse a batch file: one identifier per line, `#` starts a comment.
pub fn parse_batch(contents: &str) -> PipelineResult<Vec<Identifier>> {
    let mut ids = Vec::new();
    for (line_no, line) in contents.lines().enumerate() {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let id = Identifier::parse(line).map_err(|e| {
            PipelineError::InvalidRequest(format!("line {}: {e}", line_no + 1))
        })?;
        ids.push(id);
    }
    Ok(ids)
}

/// Read and parse a batch file.
pub async fn read_batch_file(path: &Path) -> PipelineResult<Vec<Identifier>> {
    let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
        PipelineError::InvalidRequest(format!("cannot read batch file {}: {e}", path.display()))
    })?;
    parse_batch(&contents)
}

/// Remove repeated identifiers, keeping the first occurrence.
///
/// A depot request is dropped when its whole app is also requested.
pub fn dedup(ids: Vec<Identifier>) -> Vec<Identifier> {
    let whole_apps: HashSet<_> = ids
        .iter()
        .filter(|id| id.depot_id.is_none())
        .map(|id| id.app_id)
        .collect();
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| id.depot_id.is_none() || !whole_apps.contains(&id.app_id))
        .filter(|id| seen.insert(*id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use onekey_core::{AppId, DepotId};

    #[test]
    fn test_batch_skips_blanks_and_comments() {
        let ids = parse_batch("# my games\n440\n\n  570/571  # dota\n").unwrap();
        assert_eq!(
            ids,
            vec![
                Identifier::app(AppId(440)),
                Identifier::depot(AppId(570), DepotId(571))
            ]
        );
    }

    #[test]
    fn test_batch_error_names_the_line() {
        match parse_batch("440\nnot-an-id\n") {
            Err(PipelineError::InvalidRequest(msg)) => assert!(msg.starts_with("line 2:")),
            other => panic!("expected invalid request, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_identifiers() {
        assert_eq!(parse_identifiers(&["440/1"]).unwrap().len(), 1);
        assert!(matches!(
            parse_identifiers(&["440", "x"]),
            Err(PipelineError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_dedup_prefers_whole_app() {
        let ids = vec![
            Identifier::depot(AppId(440), DepotId(1)),
            Identifier::app(AppId(440)),
            Identifier::depot(AppId(570), DepotId(2)),
            Identifier::depot(AppId(570), DepotId(2)),
            Identifier::app(AppId(440)),
        ];
        assert_eq!(
            dedup(ids),
            vec![
                Identifier::app(AppId(440)),
                Identifier::depot(AppId(570), DepotId(2))
            ]
        );
    }
}
