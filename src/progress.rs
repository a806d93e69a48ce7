//! Structured progress events and the sinks that render them.
//!
//! Reconciliation, readiness waits and the deploy transaction report what
//! they are doing through an injected [`ProgressSink`]; none of them print
//! directly.

use crate::deploy::{Phase, Step};
use colored::Colorize;
use declarative::{Action, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Which stream an output line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    /// stderr from a command whose policy counts it as failure
    Stderr,
    /// stderr from a command whose policy treats it as chatter
    StderrChatter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ResourceStarted {
        id: String,
        description: String,
    },
    ResourceReconciled {
        id: String,
        action: Action,
    },
    WaitAttempt {
        url: String,
        attempt: u32,
        observed: String,
    },
    Ready {
        url: String,
        elapsed: Duration,
    },
    PhaseEntered(Phase),
    CommandStarted {
        step: Step,
        command: String,
    },
    OutputLine {
        stream: OutputStream,
        line: String,
    },
    RollbackStarted {
        reason: String,
    },
    RollbackFinished {
        relaunched: bool,
    },
    CleanupWarning {
        message: String,
    },
}

/// Receives progress events. Shared across reconciliation threads.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &Event);
}

/// Routes events to the `log` facade.
#[derive(Debug, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn emit(&self, event: &Event) {
        match event {
            Event::ResourceStarted { description, .. } => debug!("reconciling {description}"),
            Event::ResourceReconciled { id, action } => info!("{action} {id}"),
            Event::WaitAttempt {
                url,
                attempt,
                observed,
            } => debug!("attempt {attempt} for {url}: {observed}"),
            Event::Ready { url, elapsed } => {
                info!("{url} is up after {}s", elapsed.as_secs());
            }
            Event::PhaseEntered(phase) => debug!("deploy phase: {phase}"),
            Event::CommandStarted { step, command } => info!("[{step}] $ {command}"),
            Event::OutputLine { stream, line } => match stream {
                OutputStream::Stderr => error!("{line}"),
                OutputStream::Stdout | OutputStream::StderrChatter => info!("{line}"),
            },
            Event::RollbackStarted { reason } => warn!("rolling back: {reason}"),
            Event::RollbackFinished { relaunched } => {
                if *relaunched {
                    warn!("rollback complete, previous version relaunched");
                } else {
                    warn!("rollback complete");
                }
            }
            Event::CleanupWarning { message } => warn!("cleanup: {message}"),
        }
    }
}

/// Human-facing sink: a spinner during waits, colored status lines otherwise.
///
/// Every event is also forwarded to [`LogSink`] so `-v` keeps working.
pub struct TerminalSink {
    spinner: Mutex<Option<ProgressBar>>,
    show_output: bool,
}

impl TerminalSink {
    pub fn new(show_output: bool) -> Self {
        Self {
            spinner: Mutex::new(None),
            show_output,
        }
    }

    fn with_spinner(&self, f: impl FnOnce(&mut Option<ProgressBar>)) {
        let mut guard = self.spinner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
    }

    fn println(&self, line: &str) {
        self.with_spinner(|spinner| match spinner {
            Some(pb) => pb.println(line),
            None => println!("{line}"),
        });
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg} [{elapsed}]")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

impl ProgressSink for TerminalSink {
    fn emit(&self, event: &Event) {
        LogSink.emit(event);
        match event {
            Event::ResourceReconciled { id, action } => {
                let mark = match action {
                    Action::Reused => "=".dimmed(),
                    Action::Updated => "~".yellow(),
                    Action::Created => "+".green(),
                };
                self.println(&format!("  {mark} {id} {}", action.to_string().dimmed()));
            }
            Event::WaitAttempt { url, observed, .. } => self.with_spinner(|spinner| {
                let pb = spinner.get_or_insert_with(|| {
                    let pb = ProgressBar::new_spinner();
                    pb.set_style(spinner_style());
                    pb.enable_steady_tick(Duration::from_millis(120));
                    pb
                });
                pb.set_message(format!("Waiting for {url} ({observed})"));
            }),
            Event::Ready { url, elapsed } => {
                self.with_spinner(|spinner| {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                });
                self.println(&format!(
                    "{} {url} is up ({}s)",
                    "✓".green(),
                    elapsed.as_secs()
                ));
            }
            Event::CommandStarted { step, command } => {
                self.println(&format!("{} {}", format!("[{step}]").blue().bold(), command));
            }
            Event::OutputLine { stream, line } if self.show_output => match stream {
                OutputStream::Stderr => self.println(&format!("    {}", line.red())),
                _ => self.println(&format!("    {}", line.dimmed())),
            },
            Event::RollbackStarted { reason } => {
                self.println(&format!("{} Rolling back: {reason}", "⚠".yellow()));
            }
            Event::RollbackFinished { relaunched } => {
                let detail = if *relaunched {
                    "previous version relaunched"
                } else {
                    "live directory restored"
                };
                self.println(&format!("{} Rollback complete, {detail}", "⚠".yellow()));
            }
            Event::CleanupWarning { message } => {
                self.println(&format!("{} {message}", "⚠".yellow()));
            }
            _ => {}
        }
    }
}

impl Drop for TerminalSink {
    fn drop(&mut self) {
        self.with_spinner(|spinner| {
            if let Some(pb) = spinner.take() {
                pb.finish_and_clear();
            }
        });
    }
}

/// Adapts a sink to the reconciliation framework's callback.
pub struct ReconcileProgress<'a> {
    sink: &'a dyn ProgressSink,
}

impl<'a> ReconcileProgress<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self { sink }
    }
}

impl ProgressCallback for ReconcileProgress<'_> {
    fn on_batch_start(&mut self, _count: usize) {}

    fn on_resource_start(&mut self, id: &str, description: &str) {
        self.sink.emit(&Event::ResourceStarted {
            id: id.to_string(),
            description: description.to_string(),
        });
    }

    fn on_resource_complete(&mut self, id: &str, action: Action) {
        self.sink.emit(&Event::ResourceReconciled {
            id: id.to_string(),
            action,
        });
    }

    fn on_batch_complete(&mut self) {}
}

/// Keeps every event, for assertions.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::PhaseEntered(phase) => Some(phase),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
impl ProgressSink for RecordingSink {
    fn emit(&self, event: &Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
