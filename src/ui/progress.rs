//! Terminal renderer for the sequential phase/step run.
//!
//! Grounded on the teacher's `indicatif`/`console` progress bar, trimmed to
//! the shape this orchestrator actually reports: one bar tracking phases
//! complete out of total, plus a line per step transition. `--quiet`
//! suppresses the per-step lines and shows only the bar; `--verbose` also
//! echoes each orchestrator log entry as it's appended.

use crate::ui::icons::{ARROW, CHECK, CROSS, QUESTION};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

pub struct OrchestratorUI {
    bar: ProgressBar,
    verbose: bool,
    quiet: bool,
}

impl OrchestratorUI {
    pub fn new(total_phases: u64, verbose: bool, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total_phases)
        };
        let style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("█▓▒░");
        bar.set_style(style);
        bar.set_prefix("Phases");

        Self {
            bar,
            verbose,
            quiet,
        }
    }

    pub fn phase_started(&self, number: &str, name: &str) {
        if self.quiet {
            return;
        }
        self.bar
            .println(format!("{} Phase {}: {}", ARROW, style(number).yellow().bold(), name));
    }

    pub fn phase_completed(&self, number: &str) {
        self.bar.inc(1);
        if self.quiet {
            return;
        }
        self.bar
            .println(format!("{} Phase {} complete", CHECK, style(number).green().bold()));
    }

    pub fn phase_failed(&self, number: &str, reason: &str) {
        if self.quiet {
            return;
        }
        self.bar.println(format!(
            "{} Phase {} failed: {}",
            CROSS,
            style(number).red().bold(),
            reason
        ));
    }

    pub fn step_started(&self, number: &str, step: &str) {
        if !self.verbose {
            return;
        }
        self.bar
            .println(format!("    {} {} / {}", ARROW, number, step));
    }

    pub fn step_completed(&self, number: &str, step: &str) {
        if !self.verbose {
            return;
        }
        self.bar
            .println(format!("    {} {} / {}", CHECK, number, step));
    }

    pub fn escalation(&self, number: &str, step: &str, message: &str) {
        if self.quiet {
            return;
        }
        self.bar.println(format!(
            "{} Phase {} / {}: {}",
            QUESTION, number, step, message
        ));
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_bar_starts_at_zero_progress() {
        let ui = OrchestratorUI::new(5, false, false);
        assert_eq!(ui.bar.position(), 0);
    }

    #[test]
    fn phase_completed_increments_the_bar() {
        let ui = OrchestratorUI::new(5, false, false);
        ui.phase_completed("1");
        assert_eq!(ui.bar.position(), 1);
    }

    #[test]
    fn quiet_mode_hides_the_bar() {
        let ui = OrchestratorUI::new(5, false, true);
        assert!(ui.bar.is_hidden());
    }
}
