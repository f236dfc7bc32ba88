//! Terminal progress for CLI runs.
//!
//! Jobs run on a worker thread; the UI only polls `JobControl::progress`, so
//! the pipeline never waits on drawing.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::pipeline::{JobControl, JobSummary};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool) -> Self {
        let mode = match ui_flag.map(str::to_ascii_lowercase).as_deref() {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty)
    }

    fn pretty(&self) -> bool {
        self.is_tty && !matches!(self.mode, UiMode::Plain)
    }

    /// Stderr spinner for pretty mode, `None` otherwise.
    fn spinner(&self, template: &str) -> Option<ProgressBar> {
        self.pretty().then(|| {
            let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
            bar.set_style(
                ProgressStyle::with_template(template)
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar
        })
    }

    /// Announce a named setup step; the guard reports its duration when dropped.
    pub fn stage(&self, name: &str) -> StageGuard {
        let spinner = self.spinner("{spinner} {msg}");
        match &spinner {
            Some(bar) => {
                bar.set_message(format!("{name}..."));
                bar.enable_steady_tick(Duration::from_millis(120));
            }
            None => eprintln!("==> {name}"),
        }
        StageGuard {
            name: name.to_string(),
            started: Instant::now(),
            spinner,
        }
    }

    /// Follow a running job until its worker returns. Plain mode draws nothing;
    /// the pipeline's own progress log lines cover it.
    pub fn follow(
        &self,
        control: &JobControl,
        worker: JoinHandle<JobSummary>,
    ) -> Result<JobSummary> {
        let bar = self.spinner("{spinner} {msg}");

        while !worker.is_finished() {
            if let Some(bar) = &bar {
                let progress = control.progress();
                match progress.total_frames {
                    Some(total) if bar.length() != Some(total) => {
                        bar.set_length(total);
                        let style = ProgressStyle::with_template(
                            "{bar:40} {pos}/{len} frames ({percent}%) eta {eta}",
                        )
                        .unwrap_or_else(|_| ProgressStyle::default_bar());
                        bar.set_style(style);
                    }
                    Some(_) => {}
                    None => bar.set_message(format!("{} frames", progress.frames_processed)),
                }
                bar.set_position(progress.frames_processed);
                bar.tick();
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        let summary = worker
            .join()
            .map_err(|_| anyhow!("pipeline worker panicked"))?;
        if let Some(bar) = bar {
            bar.set_position(summary.frames_processed);
            bar.finish_with_message(format!("{:?}", summary.outcome));
        }
        Ok(summary)
    }
}

/// Operator commands typed while an interactive job runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Quit,
    Reset,
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "q" | "Q" | "quit" => Some(Command::Quit),
            "r" | "R" | "reset" => Some(Command::Reset),
            _ => None,
        }
    }

    pub fn apply(self, control: &JobControl) {
        match self {
            Command::Quit => control.request_stop(),
            Command::Reset => control.request_reset(),
        }
    }
}

/// Read `q` / `r` lines from stdin and forward them to `control` until the
/// job stops or stdin closes.
pub fn spawn_command_reader(control: JobControl) -> Result<JoinHandle<()>> {
    let handle = std::thread::Builder::new()
        .name("operator-commands".to_string())
        .spawn(move || {
            eprintln!("commands: q = quit, r = reset statistics");
            let stdin = std::io::stdin();
            let mut line = String::new();
            while !control.stop_requested() {
                line.clear();
                match stdin.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => match Command::parse(&line) {
                        Some(command) => {
                            log::info!("operator command: {:?}", command);
                            command.apply(&control);
                        }
                        None => eprintln!("unknown command '{}'", line.trim()),
                    },
                }
            }
        })?;
    Ok(handle)
}

pub struct StageGuard {
    name: String,
    started: Instant,
    spinner: Option<ProgressBar>,
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let done = format!("{} done in {}", self.name, format_duration(self.started.elapsed()));
        match self.spinner.take() {
            Some(bar) => bar.finish_with_message(done),
            None => eprintln!("{done}"),
        }
    }
}

pub fn format_duration(duration: Duration) -> String {
    match duration.as_millis() {
        ms @ 0..=999 => format!("{ms}ms"),
        _ => format!("{:.2}s", duration.as_secs_f64()),
    }
}
