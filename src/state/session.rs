use tokio::task::JoinHandle;

use crate::clock::QuizDate;

/// Owner of the per-day advancement loop. Created when the LIVE transition
/// is won by this process, torn down at a terminal state.
pub struct DailySession {
    date: QuizDate,
    task: JoinHandle<()>,
}

impl DailySession {
    pub fn new(date: QuizDate, task: JoinHandle<()>) -> Self {
        Self { date, task }
    }

    pub fn date(&self) -> QuizDate {
        self.date
    }

    /// Stop the advancement loop. Safe to call on an already-finished task.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for DailySession {
    fn drop(&mut self) {
        self.task.abort();
    }
}
