use flatline_archive::ScanProgress;
use flatline_convert::ConversionProgress;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use once_cell::sync::Lazy;

pub trait Tracker<P> {
    fn update(&self, progress: P);
}

const BAR_STYLE: &str =
    "{spinner:.blue} {prefix:>10.cyan.bold} [{elapsed_precise}] {wide_bar:.cyan/blue} {pos}/{len} ({msg})";

const SPINNER_STYLE: &str = "{spinner:.blue} {prefix:>10.cyan.bold} [{elapsed_precise}] {wide_msg}";

const TICK: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";

const PB_CHARS: &str = "█▓▒░  ";

static BAR_TEMPLATE: Lazy<Option<ProgressStyle>> = Lazy::new(|| {
    ProgressStyle::with_template(BAR_STYLE)
        .ok()
        .map(|style| style.tick_chars(TICK).progress_chars(PB_CHARS))
});

static SPINNER_TEMPLATE: Lazy<Option<ProgressStyle>> = Lazy::new(|| {
    ProgressStyle::with_template(SPINNER_STYLE)
        .ok()
        .map(|style| style.tick_chars(TICK))
});

#[derive(Clone)]
pub struct ProgressTracker {
    pb: ProgressBar,
    finish: Option<String>,
}

impl Tracker<ScanProgress> for ProgressTracker {
    fn update(&self, progress: ScanProgress) {
        self.pb.set_message(format!(
            "{} entries, {} documents",
            progress.entries_done, progress.xml_found
        ));
        self.pb.tick();
    }
}

impl Tracker<ConversionProgress> for ProgressTracker {
    fn update(&self, progress: ConversionProgress) {
        self.pb.set_length(progress.total as u64);
        self.pb.set_position(progress.done as u64);
        let eta = progress
            .eta
            .map(|eta| format!(", eta {}s", eta.as_secs()))
            .unwrap_or_default();
        self.pb.set_message(format!(
            "{} failed, {:.1} files/s, {:.1} MB/s{eta}",
            progress.failed, progress.files_per_sec, progress.mb_per_sec
        ));
    }
}

impl ProgressTracker {
    pub fn finish(self) {
        match self.finish {
            Some(msg) => self.pb.finish_with_message(msg),
            None => self.pb.finish_and_clear(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProgressTrackerBuilder {
    len: Option<u64>,
    prefix: Option<String>,
    finish: Option<String>,
    hidden: bool,
}

impl ProgressTrackerBuilder {
    pub fn with_len(mut self, len: u64) -> Self {
        self.len = Some(len);
        self
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
    }

    pub fn with_finish(mut self, finish: &str) -> Self {
        self.finish = Some(finish.to_string());
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn build(self) -> ProgressTracker {
        let (pb, style) = match self.len {
            Some(len) => (ProgressBar::new(len), BAR_TEMPLATE.as_ref()),
            None => (ProgressBar::new_spinner(), SPINNER_TEMPLATE.as_ref()),
        };
        let pb = match style {
            Some(style) => pb.with_style(style.clone()),
            None => pb,
        };

        if self.hidden {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }
        if let Some(prefix) = self.prefix {
            pb.set_prefix(prefix);
        }

        ProgressTracker {
            pb,
            finish: self.finish,
        }
    }
}
