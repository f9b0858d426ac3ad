//! Progress bars for long transfers

use indicatif::{ProgressBar, ProgressStyle};
use mibctl_core::Progress;

/// [`Progress`] sink drawing an `indicatif` bar
pub struct BarProgress {
    style: ProgressStyle,
    message: &'static str,
    bar: Option<ProgressBar>,
}

impl BarProgress {
    /// Bar counting bytes, finishing with `message`
    pub fn bytes(message: &'static str) -> Result<Self, indicatif::style::TemplateError> {
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")?
            .progress_chars("#>-");
        Ok(Self {
            style,
            message,
            bar: None,
        })
    }

    /// Bar counting hex records, finishing with `message`
    pub fn records(message: &'static str) -> Result<Self, indicatif::style::TemplateError> {
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} records ({eta})")?
            .progress_chars("#>-");
        Ok(Self {
            style,
            message,
            bar: None,
        })
    }
}

impl Progress for BarProgress {
    fn start(&mut self, total: u64) {
        let bar = ProgressBar::new(total);
        bar.set_style(self.style.clone());
        self.bar = Some(bar);
    }

    fn progress(&mut self, n: u64) {
        if let Some(bar) = &self.bar {
            bar.set_position(n);
        }
    }

    fn end(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_with_message(self.message);
        }
    }
}
