// patchverify-core/src/report.rs
//! Rendering of trial events for CI consumption.

use std::io::Write;

use patchverify_common::error::Result;
use patchverify_common::pipeline::TrialEvent;

pub trait Reporter {
    fn report(&mut self, event: &TrialEvent) -> Result<()>;
}

/// Writes TeamCity service messages, one per line.
pub struct ServiceMessageReporter<W: Write> {
    out: W,
}

impl<W: Write> ServiceMessageReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for ServiceMessageReporter<W> {
    fn report(&mut self, event: &TrialEvent) -> Result<()> {
        writeln!(self.out, "{}", format_service_message(event))?;
        self.out.flush()?;
        Ok(())
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub events: Vec<TrialEvent>,
}

impl Reporter for RecordingReporter {
    fn report(&mut self, event: &TrialEvent) -> Result<()> {
        self.events.push(event.clone());
        Ok(())
    }
}

pub fn format_service_message(event: &TrialEvent) -> String {
    match event {
        TrialEvent::TrialCount { count } => format!("##teamcity[testCount count='{count}']"),
        TrialEvent::Started { name } => {
            format!("##teamcity[testStarted name='{}']", escape(name))
        }
        TrialEvent::Ignored { name, message } => format!(
            "##teamcity[testIgnored name='{}' message='{}']",
            escape(name),
            escape(message)
        ),
        TrialEvent::Failed {
            name,
            message,
            details,
        } => format!(
            "##teamcity[testFailed name='{}' message='{}' details='{}']",
            escape(name),
            escape(message),
            escape(details)
        ),
        TrialEvent::Finished { name, duration_ms } => format!(
            "##teamcity[testFinished name='{}' duration='{duration_ms}']",
            escape(name)
        ),
    }
}

/// Service-message value escaping; `|` is the escape character.
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '|' => escaped.push_str("||"),
            '\'' => escaped.push_str("|'"),
            '\n' => escaped.push_str("|n"),
            '\r' => escaped.push_str("|r"),
            '[' => escaped.push_str("|["),
            ']' => escaped.push_str("|]"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_special_characters() {
        assert_eq!(escape("a|b'c\nd\re[f]"), "a||b|'c|nd|re|[f|]");
        assert_eq!(escape("PY 171.100 -> 171.200 (exe)"), "PY 171.100 -> 171.200 (exe)");
    }

    #[test]
    fn writes_one_message_per_line() {
        let mut reporter = ServiceMessageReporter::new(Vec::new());
        reporter.report(&TrialEvent::TrialCount { count: 2 }).unwrap();
        reporter
            .report(&TrialEvent::Started {
                name: "PY 1 -> 2 (zip)".into(),
            })
            .unwrap();
        reporter
            .report(&TrialEvent::Failed {
                name: "PY 1 -> 2 (zip)".into(),
                message: "checksums differ".into(),
                details: "differs: lib/app.jar\nonly in patched build: [x]".into(),
            })
            .unwrap();
        reporter
            .report(&TrialEvent::Finished {
                name: "PY 1 -> 2 (zip)".into(),
                duration_ms: 1500,
            })
            .unwrap();

        let output = String::from_utf8(reporter.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines,
            vec![
                "##teamcity[testCount count='2']",
                "##teamcity[testStarted name='PY 1 -> 2 (zip)']",
                "##teamcity[testFailed name='PY 1 -> 2 (zip)' message='checksums differ' details='differs: lib/app.jar|nonly in patched build: |[x|]']",
                "##teamcity[testFinished name='PY 1 -> 2 (zip)' duration='1500']",
            ]
        );
    }

    #[test]
    fn ignored_message_format() {
        assert_eq!(
            format_service_message(&TrialEvent::Ignored {
                name: "IC 1 -> 2 (tar.gz)".into(),
                message: "not found".into(),
            }),
            "##teamcity[testIgnored name='IC 1 -> 2 (tar.gz)' message='not found']"
        );
    }
}
