use std::sync::mpsc;

use serde::Serialize;

/// Lowest fraction reported once a job starts.
pub const PROGRESS_EPSILON: f32 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub status: JobStatus,
    pub fraction: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Create a connected reporter/receiver pair. The receiver starts `queued`.
pub fn progress_channel() -> (ProgressReporter, ProgressReceiver) {
    let (sender, receiver) = mpsc::channel();
    (
        ProgressReporter {
            sender,
            fraction: 0.0,
            finished: false,
        },
        ProgressReceiver {
            receiver,
            latest: ProgressUpdate {
                status: JobStatus::Queued,
                fraction: 0.0,
                stage: None,
                error: None,
            },
        },
    )
}

/// Render side of the channel. Fractions never decrease, and exactly one
/// terminal update is sent: dropping an unfinished reporter reports `failed`.
#[derive(Debug)]
pub struct ProgressReporter {
    sender: mpsc::Sender<ProgressUpdate>,
    fraction: f32,
    finished: bool,
}

impl ProgressReporter {
    pub fn report(&mut self, stage: &'static str, fraction: f32) {
        if self.finished {
            return;
        }
        let fraction = fraction.clamp(PROGRESS_EPSILON, 0.99).max(self.fraction);
        self.fraction = fraction;
        self.send(ProgressUpdate {
            status: JobStatus::Processing,
            fraction,
            stage: Some(stage),
            error: None,
        });
    }

    pub fn fraction(&self) -> f32 {
        self.fraction
    }

    pub fn complete(mut self) {
        self.finish(JobStatus::Completed, None);
    }

    pub fn fail(mut self, error: impl Into<String>) {
        self.finish(JobStatus::Failed, Some(error.into()));
    }

    fn finish(&mut self, status: JobStatus, error: Option<String>) {
        if self.finished {
            return;
        }
        self.finished = true;
        if status == JobStatus::Completed {
            self.fraction = 1.0;
        }
        self.send(ProgressUpdate {
            status,
            fraction: self.fraction,
            stage: None,
            error,
        });
    }

    fn send(&self, update: ProgressUpdate) {
        // A dropped receiver means nobody is polling; the render carries on.
        let _ = self.sender.send(update);
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.finish(
            JobStatus::Failed,
            Some("render stopped before reporting completion".to_owned()),
        );
    }
}

/// Poll side of the channel. Keeps the most recent update.
#[derive(Debug)]
pub struct ProgressReceiver {
    receiver: mpsc::Receiver<ProgressUpdate>,
    latest: ProgressUpdate,
}

impl ProgressReceiver {
    /// Drain pending updates and return the latest known state.
    pub fn poll_latest(&mut self) -> &ProgressUpdate {
        while let Ok(update) = self.receiver.try_recv() {
            self.latest = update;
        }
        &self.latest
    }

    /// Block until the reporter sends a terminal update or goes away.
    pub fn wait_terminal(&mut self) -> &ProgressUpdate {
        while !self.latest.status.is_terminal() {
            match self.receiver.recv() {
                Ok(update) => self.latest = update,
                Err(_) => break,
            }
        }
        &self.latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_queued() {
        let (_reporter, mut receiver) = progress_channel();
        assert_eq!(receiver.poll_latest().status, JobStatus::Queued);
    }

    #[test]
    fn fractions_are_monotonic() {
        let (mut reporter, mut receiver) = progress_channel();
        reporter.report("render", 0.5);
        reporter.report("render", 0.3);
        let latest = receiver.poll_latest().clone();
        assert_eq!(latest.status, JobStatus::Processing);
        assert!((latest.fraction - 0.5).abs() < f32::EPSILON);

        reporter.report("start", 0.0);
        assert!((reporter.fraction() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn completion_reaches_one() {
        let (mut reporter, mut receiver) = progress_channel();
        reporter.report("encode", 0.9);
        reporter.complete();
        let latest = receiver.wait_terminal();
        assert_eq!(latest.status, JobStatus::Completed);
        assert_eq!(latest.fraction, 1.0);
    }

    #[test]
    fn dropped_reporter_reports_failure() {
        let (mut reporter, mut receiver) = progress_channel();
        reporter.report("render", 0.4);
        drop(reporter);
        let latest = receiver.wait_terminal();
        assert_eq!(latest.status, JobStatus::Failed);
        assert!(latest.error.is_some());
        assert!((latest.fraction - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn explicit_failure_keeps_message() {
        let (reporter, mut receiver) = progress_channel();
        reporter.fail("encoding failed: boom");
        let latest = receiver.wait_terminal();
        assert_eq!(latest.status, JobStatus::Failed);
        assert_eq!(latest.error.as_deref(), Some("encoding failed: boom"));
    }
}
