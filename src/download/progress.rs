//! 进度上报与 CLI 进度条管理。

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::models::DownloadProgress;

/// 把逐块读取的字节数折算成进度事件。
///
/// 比例只在整数百分比增长时上报，保证单调不减；`finish` 补发最终的 1.0。
pub(crate) struct ProgressReporter<'a> {
    total: Option<u64>,
    received: u64,
    last_percent: Option<u64>,
    cb: &'a mut dyn FnMut(DownloadProgress),
}

impl<'a> ProgressReporter<'a> {
    pub(crate) fn new(total: Option<u64>, cb: &'a mut dyn FnMut(DownloadProgress)) -> Self {
        Self {
            total: total.filter(|&t| t > 0),
            received: 0,
            last_percent: None,
            cb,
        }
    }

    pub(crate) fn received(&self) -> u64 {
        self.received
    }

    pub(crate) fn advance(&mut self, n: usize) {
        self.received += n as u64;
        match self.total {
            Some(total) => {
                let percent = (self.received.min(total) * 100) / total;
                if self.last_percent.is_none_or(|last| percent > last) {
                    self.last_percent = Some(percent);
                    (self.cb)(DownloadProgress::Fraction(percent as f64 / 100.0));
                }
            }
            None => (self.cb)(DownloadProgress::Bytes(self.received)),
        }
    }

    pub(crate) fn finish(&mut self) {
        if self.last_percent != Some(100) {
            self.last_percent = Some(100);
            (self.cb)(DownloadProgress::Fraction(1.0));
        }
    }
}

/// 纯命令行模式下的单条下载进度条。
pub struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    pub fn new(label: &str) -> Self {
        let bar = ProgressBar::with_draw_target(Some(100), ProgressDrawTarget::stderr());
        let style = ProgressStyle::with_template("{prefix} [{elapsed_precise}] {wide_bar} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");
        bar.set_style(style);
        bar.set_prefix(label.to_string());
        Self { bar }
    }

    pub fn update(&self, progress: DownloadProgress) {
        match progress {
            DownloadProgress::Fraction(f) => {
                let percent = progress.percent().unwrap_or(0);
                self.bar.set_position((f.clamp(0.0, 1.0) * 100.0) as u64);
                self.bar.set_message(format!("{percent}%"));
            }
            DownloadProgress::Bytes(n) => {
                self.bar.set_message(indicatif::HumanBytes(n).to_string());
            }
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fractions(events: &[DownloadProgress]) -> Vec<f64> {
        events
            .iter()
            .filter_map(|e| match e {
                DownloadProgress::Fraction(f) => Some(*f),
                DownloadProgress::Bytes(_) => None,
            })
            .collect()
    }

    #[test]
    fn fractions_are_monotone_and_end_at_one() {
        let mut events = Vec::new();
        let mut cb = |p: DownloadProgress| events.push(p);
        let mut reporter = ProgressReporter::new(Some(1000), &mut cb);
        for _ in 0..7 {
            reporter.advance(3);
        }
        for _ in 0..10 {
            reporter.advance(100);
        }
        reporter.finish();
        drop(reporter);

        let seen = fractions(&events);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seen.last().copied(), Some(1.0));
        // 每个整数百分比至多上报一次
        assert!(seen.len() <= 101);
    }

    #[test]
    fn unknown_length_reports_bytes_then_one() {
        let mut events = Vec::new();
        let mut cb = |p: DownloadProgress| events.push(p);
        let mut reporter = ProgressReporter::new(None, &mut cb);
        reporter.advance(10);
        reporter.advance(20);
        assert_eq!(reporter.received(), 30);
        reporter.finish();
        drop(reporter);

        assert_eq!(
            events,
            vec![
                DownloadProgress::Bytes(10),
                DownloadProgress::Bytes(30),
                DownloadProgress::Fraction(1.0),
            ]
        );
    }

    #[test]
    fn full_length_does_not_repeat_final_fraction() {
        let mut events = Vec::new();
        let mut cb = |p: DownloadProgress| events.push(p);
        let mut reporter = ProgressReporter::new(Some(10), &mut cb);
        reporter.advance(10);
        reporter.finish();
        drop(reporter);
        assert_eq!(events, vec![DownloadProgress::Fraction(1.0)]);
    }
}
