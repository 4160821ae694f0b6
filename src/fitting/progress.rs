use std::sync::Mutex;

/// Receives fractional progress of one or more running fits.
pub trait ProgressSink: Send + Sync {
    fn update_progress(&self, fraction: f64, task_index: usize);

    fn done(&self) {}
}

/// Aggregates the progress of several concurrently fitted paths.
#[derive(Debug)]
pub struct MultiTaskProgress {
    fractions: Mutex<Vec<f64>>,
}

impl MultiTaskProgress {
    pub fn new(total_tasks: usize) -> Self {
        Self {
            fractions: Mutex::new(vec![0.0; total_tasks]),
        }
    }

    /// Mean completion over all tasks, in `[0, 1]`.
    pub fn overall(&self) -> f64 {
        let fractions = match self.fractions.lock() {
            Ok(f) => f,
            Err(poisoned) => poisoned.into_inner(),
        };
        if fractions.is_empty() {
            return 1.0;
        }
        fractions.iter().sum::<f64>() / fractions.len() as f64
    }

    pub fn task(&self, task_index: usize) -> Option<f64> {
        let fractions = match self.fractions.lock() {
            Ok(f) => f,
            Err(poisoned) => poisoned.into_inner(),
        };
        fractions.get(task_index).copied()
    }
}

impl ProgressSink for MultiTaskProgress {
    fn update_progress(&self, fraction: f64, task_index: usize) {
        let mut fractions = match self.fractions.lock() {
            Ok(f) => f,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(slot) = fractions.get_mut(task_index) {
            // nodes may finish out of order under rayon
            *slot = slot.max(fraction.clamp(0.0, 1.0));
        }
        log::debug!("Task {} at {:.0}%", task_index, fraction * 100.0);
    }

    fn done(&self) {
        let mut fractions = match self.fractions.lock() {
            Ok(f) => f,
            Err(poisoned) => poisoned.into_inner(),
        };
        fractions.iter_mut().for_each(|f| *f = 1.0);
    }
}

#[cfg(test)]
mod progress_tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_overall_progress_averages_tasks() {
        let progress = MultiTaskProgress::new(2);
        progress.update_progress(0.5, 0);
        progress.update_progress(1.0, 1);
        assert_relative_eq!(progress.overall(), 0.75);
        assert_eq!(progress.task(0), Some(0.5));
    }

    #[test]
    fn test_progress_is_monotonic_and_bounded() {
        let progress = MultiTaskProgress::new(1);
        progress.update_progress(0.8, 0);
        progress.update_progress(0.3, 0);
        progress.update_progress(4.0, 0);
        assert_eq!(progress.task(0), Some(1.0));
        // unknown task index is ignored
        progress.update_progress(0.5, 9);
        assert_eq!(progress.task(9), None);
    }

    #[test]
    fn test_done_completes_every_task() {
        let progress = MultiTaskProgress::new(3);
        progress.update_progress(0.1, 2);
        progress.done();
        assert_relative_eq!(progress.overall(), 1.0);
    }
}
