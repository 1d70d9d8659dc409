use std::fmt::Write as _;
use std::time::{Duration, Instant};

/// Wall time of one stage of a layer run.
#[derive(Debug, Clone)]
pub struct StepTiming {
    /// Position in the configured step list; `None` for read and write stages.
    pub index: Option<usize>,
    pub name: String,
    pub duration: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineTimings {
    steps: Vec<StepTiming>,
}

impl PipelineTimings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_step(&mut self, index: Option<usize>, name: impl Into<String>, duration: Duration) {
        self.steps.push(StepTiming {
            index,
            name: name.into(),
            duration,
        });
    }

    pub fn extend(&mut self, other: PipelineTimings) {
        self.steps.extend(other.steps);
    }

    pub fn total_duration(&self) -> Duration {
        self.steps.iter().map(|s| s.duration).sum()
    }

    /// Summed duration of every stage with this name.
    pub fn get_step(&self, name: &str) -> Option<Duration> {
        let mut matching = self.steps.iter().filter(|s| s.name == name).peekable();
        matching.peek()?;
        Some(matching.map(|s| s.duration).sum())
    }

    pub fn steps(&self) -> &[StepTiming] {
        &self.steps
    }

    /// Table of stages with their share of the total, one line per stage.
    pub fn summary(&self) -> String {
        let total = self.total_duration();
        let mut out = String::new();
        let _ = writeln!(out, "{:-<60}", "");
        for step in &self.steps {
            let percentage = if total.as_secs_f64() > 0.0 {
                (step.duration.as_secs_f64() / total.as_secs_f64()) * 100.0
            } else {
                0.0
            };
            let label = match step.index {
                Some(index) => format!("{index}: {}", step.name),
                None => step.name.clone(),
            };
            let _ = writeln!(
                out,
                "{:<30} {:>12.3}ms ({:>5.1}%)",
                label,
                step.duration.as_secs_f64() * 1000.0,
                percentage
            );
        }
        let _ = writeln!(out, "{:-<60}", "");
        let _ = write!(out, "{:<30} {:>12.3}ms", "Total", total.as_secs_f64() * 1000.0);
        out
    }
}

pub struct Timer {
    start: Instant,
    index: Option<usize>,
    name: String,
}

impl Timer {
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            index: None,
            name: name.into(),
        }
    }

    pub fn start_step(index: usize, name: impl Into<String>) -> Self {
        Self {
            index: Some(index),
            ..Self::start(name)
        }
    }

    /// Stops the timer and records it.
    pub fn stop(self, timings: &mut PipelineTimings) {
        timings.add_step(self.index, self.name, self.start.elapsed());
    }
}
