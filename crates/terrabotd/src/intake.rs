//! Newline-delimited JSON event intake.
//!
//! Each line is one [`IncomingEvent`]. Malformed lines are logged and
//! skipped; the loop ends at EOF or when `shutdown` resolves.

use std::future::Future;

use anyhow::{Context, Result};
use terrabot_core::{EventDispatcher, IncomingEvent};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IntakeStats {
    pub lines: usize,
    pub submitted: usize,
    pub malformed: usize,
}

/// Blank lines carry no event.
pub fn parse_line(line: &str) -> Result<Option<IncomingEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .context("Failed to parse event")
}

pub async fn run_intake<R, F>(
    reader: R,
    dispatcher: &EventDispatcher,
    shutdown: F,
) -> Result<IntakeStats>
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = ()>,
{
    let mut lines = reader.lines();
    let mut stats = IntakeStats::default();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested, closing event intake");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read event stream")? else {
                    info!("event stream closed");
                    break;
                };
                stats.lines += 1;
                match parse_line(&line) {
                    Ok(Some(event)) => {
                        stats.submitted += 1;
                        if let Some(outcome) = dispatcher.submit(event).await {
                            debug!(?outcome, "event handled");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        stats.malformed += 1;
                        warn!(line = stats.lines, error = %format!("{e:#}"), "skipping malformed event");
                    }
                }
            }
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use terrabot_core::fakes::{self, BuildKind, Harness, UnitSpec};
    use terrabot_core::{
        CommandName, CommandRunner, CommentCommand, DispatchMode, Drainer, EngineConfig, Metrics,
    };
    use tokio::io::BufReader;

    fn dispatcher(h: &Harness) -> EventDispatcher {
        let runner = CommandRunner::new(
            h.collaborators(),
            EngineConfig::default(),
            Arc::new(Drainer::new()),
            Arc::new(Metrics::new()),
        )
        .unwrap();
        EventDispatcher::new(Arc::new(runner), DispatchMode::Inline)
    }

    fn command_line(cmd: Option<CommentCommand>) -> String {
        let mut event = fakes::comment_event(CommentCommand::new(CommandName::Plan));
        event.command = cmd;
        serde_json::to_string(&IncomingEvent::Command(event)).unwrap()
    }

    #[test]
    fn test_parse_line() {
        assert!(parse_line("   ").unwrap().is_none());
        assert!(parse_line("{not json").is_err());

        let line = command_line(None);
        match parse_line(&line).unwrap() {
            Some(IncomingEvent::Command(event)) => assert!(event.command.is_none()),
            other => panic!("unexpected {other:?}"),
        }

        let closed = serde_json::to_string(&IncomingEvent::PullClosed {
            repo: fakes::repo(),
            pull: fakes::pull_request(),
        })
        .unwrap();
        assert!(closed.contains(r#""kind":"pull_closed""#));
        assert!(matches!(
            parse_line(&closed).unwrap(),
            Some(IncomingEvent::PullClosed { .. })
        ));
    }

    #[tokio::test]
    async fn test_intake_runs_events_until_eof() {
        let h = Harness::new();
        h.builder.set_units(BuildKind::Plan, vec![UnitSpec::dir("a")]);
        let closed = serde_json::to_string(&IncomingEvent::PullClosed {
            repo: fakes::repo(),
            pull: fakes::pull_request(),
        })
        .unwrap();
        let input = format!(
            "{}\n\nnot-an-event\n{closed}\n",
            command_line(Some(CommentCommand::new(CommandName::Plan))),
        );

        let stats = run_intake(
            BufReader::new(input.as_bytes()),
            &dispatcher(&h),
            std::future::pending(),
        )
        .await
        .unwrap();

        assert_eq!(
            stats,
            IntakeStats {
                lines: 4,
                submitted: 2,
                malformed: 1,
            }
        );
        assert_eq!(h.executor.calls().len(), 1);
        assert_eq!(h.cleaner.deleted(), vec![1]);
    }

    #[tokio::test]
    async fn test_shutdown_stops_intake() {
        let h = Harness::new();
        let (_writer, reader) = tokio::io::duplex(64);
        let stats = run_intake(BufReader::new(reader), &dispatcher(&h), async {})
            .await
            .unwrap();
        assert_eq!(stats, IntakeStats::default());
    }
}
