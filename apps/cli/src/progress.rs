//! Progress bar for a running acquisition

use console::style;
use emufetch_types::{PipelineEvent, PipelineStage};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// Drives one bar from pipeline events
pub struct AcquireProgress {
    bar: ProgressBar,
}

impl AcquireProgress {
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new_spinner())
    }

    fn with_bar(bar: ProgressBar) -> Self {
        bar.set_style(spinner_style());
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    /// Update the bar from an event
    pub fn handle_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::StageChanged { stage, .. } => match stage {
                PipelineStage::Completed | PipelineStage::Failed => {}
                stage => self.bar.set_message(stage_label(*stage)),
            },

            PipelineEvent::DownloadProgress {
                downloaded, total, ..
            } => {
                if let Some(total) = total {
                    if self.bar.length() != Some(*total) {
                        self.bar.set_style(bar_style());
                        self.bar.set_length(*total);
                    }
                }
                self.bar.set_position(*downloaded);
            }

            PipelineEvent::Finished { error: None, .. } => {
                self.bar.finish_with_message(format!("{} Done", style("✓").green().bold()));
            }

            PipelineEvent::Finished { error: Some(_), .. } => {
                self.bar.abandon_with_message(format!("{} Failed", style("✗").red().bold()));
            }
        }
    }

    /// Follow events until the run finishes or the channel closes
    pub fn watch(self, mut events: broadcast::Receiver<PipelineEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        self.handle_event(&event);
                        if matches!(event, PipelineEvent::Finished { .. }) {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => {
                        self.bar.finish_and_clear();
                        break;
                    }
                }
            }
        })
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg} {bytes}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
        .map(|s| s.progress_chars("█▓▒░  "))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

pub fn stage_label(stage: PipelineStage) -> &'static str {
    match stage {
        PipelineStage::Validating => "Checking request",
        PipelineStage::Downloading => "Downloading",
        PipelineStage::FormatDetecting => "Inspecting",
        PipelineStage::Extracting => "Placing",
        PipelineStage::Cleaning => "Cleaning up",
        PipelineStage::Completed => "Done",
        PipelineStage::Failed => "Failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn progress_sets_length_once_known() {
        let progress = AcquireProgress::with_bar(ProgressBar::hidden());
        let request_id = Uuid::new_v4();

        progress.handle_event(&PipelineEvent::DownloadProgress {
            request_id,
            downloaded: 10,
            total: None,
        });
        assert_eq!(progress.bar.position(), 10);

        progress.handle_event(&PipelineEvent::DownloadProgress {
            request_id,
            downloaded: 40,
            total: Some(100),
        });
        assert_eq!(progress.bar.length(), Some(100));
        assert_eq!(progress.bar.position(), 40);

        progress.handle_event(&PipelineEvent::Finished {
            request_id,
            error: None,
        });
        assert!(progress.bar.is_finished());
    }

    #[test]
    fn stage_messages_follow_stages() {
        let progress = AcquireProgress::with_bar(ProgressBar::hidden());
        progress.handle_event(&PipelineEvent::StageChanged {
            request_id: Uuid::new_v4(),
            stage: PipelineStage::Extracting,
        });
        assert_eq!(progress.bar.message(), "Placing");
    }
}
