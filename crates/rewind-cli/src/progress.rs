//! Terminal progress for restore passes.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use rewind_config::log_restore_debug;
use rewind_image::ReplayObserver;
use rewind_store::{Backup, Block};

const CHECKSUM_PREFIX: usize = 20;

/// One progress bar per backup pass; hidden bars when disabled.
pub struct ProgressObserver {
    enabled: bool,
    bar: Option<ProgressBar>,
}

impl ProgressObserver {
    pub fn new(enabled: bool) -> Self {
        Self { enabled, bar: None }
    }

    fn new_bar(&self, len: u64) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        let style = ProgressStyle::default_bar()
            .template("{prefix:.bold} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        pb.set_style(style);
        pb
    }
}

impl ReplayObserver for ProgressObserver {
    fn backup_started(&mut self, index: usize, total: usize, backup: &Backup) {
        log_restore_debug!(
            "Backup pass started",
            pass = index + 1,
            total = total,
            backup = backup.name()
        );
        let pb = self.new_bar(backup.blocks.len() as u64);
        pb.set_prefix(format!("[pass {}/{}]", index + 1, total));
        pb.set_message(backup.name());
        self.bar = Some(pb);
    }

    fn block_written(&mut self, backup: &Backup, _block_index: usize, block: &Block, _len: usize) {
        if let Some(pb) = &self.bar {
            pb.set_message(format!(
                "{}* offset={} {}",
                short_checksum(&block.checksum),
                block.offset,
                backup.compression
            ));
            pb.inc(1);
        }
    }

    fn backup_finished(&mut self, _index: usize, backup: &Backup) {
        if let Some(pb) = self.bar.take() {
            pb.finish_with_message(format!("{} {}", style("done").green(), backup.name()));
        }
    }
}

/// Leading characters of a checksum, for display.
fn short_checksum(checksum: &str) -> &str {
    checksum.get(..CHECKSUM_PREFIX).unwrap_or(checksum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_checksum() {
        assert_eq!(short_checksum("abc"), "abc");
        let long = "0123456789abcdef0123456789abcdef";
        assert_eq!(short_checksum(long), "0123456789abcdef0123");
    }

    #[test]
    fn test_hidden_bar_when_disabled() {
        let observer = ProgressObserver::new(false);
        assert!(observer.new_bar(10).is_hidden());
    }
}
