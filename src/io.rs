use std::fs;
use std::path::Path;

use crate::error::{ConfigError, Result, SimError};
use crate::workload::{WorkloadReport, WorkloadSpec};

/// Read reference strings, one process per line: `<bound> <page> <page> ...`
pub fn read_workloads<P: AsRef<Path>>(path: P) -> Result<Vec<WorkloadSpec>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| SimError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_workloads(&content)
}

/// Blank lines and `#` comments are skipped; pids follow line order.
pub fn parse_workloads(content: &str) -> Result<Vec<WorkloadSpec>> {
    let mut workloads = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut values = line.split_whitespace().map(|token| {
            token.parse::<i64>().map_err(|_| SimError::Parse {
                line: idx + 1,
                token: token.to_string(),
            })
        });
        // A non-empty trimmed line always has a first token
        let Some(bound) = values.next() else { continue };
        let bound = bound?;
        let references = values.collect::<Result<Vec<i64>>>()?;

        workloads.push(WorkloadSpec {
            pid: workloads.len(),
            bound,
            references,
        });
    }

    if workloads.is_empty() {
        return Err(ConfigError::EmptyReferences.into());
    }
    Ok(workloads)
}

/// Raw outcome codes, one line per process
pub fn format_outcomes(reports: &[WorkloadReport]) -> String {
    reports
        .iter()
        .map(|report| {
            report
                .outcomes
                .iter()
                .map(|o| o.to_raw().to_string())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn write_outcomes<P: AsRef<Path>>(path: P, reports: &[WorkloadReport]) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, format_outcomes(reports) + "\n").map_err(|source| SimError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::AccessOutcome;

    #[test]
    fn test_parse_workloads() {
        let content = "# bound refs...\n2 0 1 0\n\n4 3 -1 7\n";
        let workloads = parse_workloads(content).unwrap();

        assert_eq!(
            workloads,
            vec![
                WorkloadSpec { pid: 0, bound: 2, references: vec![0, 1, 0] },
                WorkloadSpec { pid: 1, bound: 4, references: vec![3, -1, 7] },
            ]
        );
    }

    #[test]
    fn test_parse_bound_only_line() {
        let workloads = parse_workloads("3").unwrap();
        assert_eq!(workloads[0].bound, 3);
        assert!(workloads[0].references.is_empty());
    }

    #[test]
    fn test_parse_reports_bad_token_with_line() {
        let err = parse_workloads("2 0 1\n2 x 1").unwrap_err();
        match err {
            SimError::Parse { line, token } => {
                assert_eq!(line, 2);
                assert_eq!(token, "x");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_empty_file() {
        assert!(matches!(
            parse_workloads("# nothing here\n\n"),
            Err(SimError::Config(ConfigError::EmptyReferences))
        ));
    }

    #[test]
    fn test_format_outcomes() {
        let reports = vec![
            WorkloadReport {
                pid: 0,
                outcomes: vec![AccessOutcome::Frame(0), AccessOutcome::Frame(3)],
            },
            WorkloadReport {
                pid: 1,
                outcomes: vec![AccessOutcome::Frame(1), AccessOutcome::Invalid],
            },
            WorkloadReport {
                pid: 2,
                outcomes: vec![AccessOutcome::Unresolvable],
            },
        ];
        assert_eq!(format_outcomes(&reports), "0 3\n1 -2\n-1");
    }

    #[test]
    fn test_read_missing_file() {
        let err = read_workloads("/nonexistent/refs.txt").unwrap_err();
        assert!(matches!(err, SimError::Io { .. }));
    }

    #[test]
    fn test_write_then_read_back_file() {
        let path = std::env::temp_dir().join(format!("vm-paging-sim-{}.out", std::process::id()));
        let reports = vec![WorkloadReport {
            pid: 0,
            outcomes: vec![AccessOutcome::Frame(2), AccessOutcome::Invalid],
        }];
        write_outcomes(&path, &reports).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "2 -2\n");
        std::fs::remove_file(&path).unwrap();
    }
}
