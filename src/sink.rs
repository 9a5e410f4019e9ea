use std::collections::HashMap;

use crossbeam_channel::{Receiver, Sender};
use tracing::info;

use crate::decoder::Label;

/// Consumer of the label stream. Runs on the pipeline's result thread.
pub trait ResultSink: Send {
    fn accept(&mut self, label: Label);

    /// Called once after the last label, before the result queue goes away.
    fn finish(&mut self) {}
}

/// Logs every label as it arrives.
#[derive(Debug, Default)]
pub struct LogSink;

impl ResultSink for LogSink {
    fn accept(&mut self, label: Label) {
        info!("OUTPUT : {label}");
    }
}

/// Reports the most frequent label once per window of `window` labels.
///
/// Ties go to the label that reached the top count first. Labels left in an
/// incomplete window at shutdown are dropped.
pub struct MostFrequentSink {
    window: usize,
    queue: Vec<Label>,
    report: Box<dyn FnMut(Label) + Send>,
}

impl MostFrequentSink {
    /// Log each window's winner.
    pub fn new(window: usize) -> Self {
        Self::with_reporter(window, |label| info!("Output : {label}"))
    }

    pub fn with_reporter(window: usize, report: impl FnMut(Label) + Send + 'static) -> Self {
        Self {
            window: window.max(1),
            queue: Vec::with_capacity(window.max(1)),
            report: Box::new(report),
        }
    }
}

impl ResultSink for MostFrequentSink {
    fn accept(&mut self, label: Label) {
        self.queue.push(label);
        if self.queue.len() >= self.window {
            let window = std::mem::take(&mut self.queue);
            if let Some(winner) = most_frequent(window) {
                (self.report)(winner);
            }
        }
    }
}

/// Most frequent element; ties go to whichever reached the count first.
pub fn most_frequent(labels: Vec<Label>) -> Option<Label> {
    let mut counts: HashMap<&Label, usize> = HashMap::new();
    let mut best: Option<(&Label, usize)> = None;
    for label in &labels {
        let count = counts.entry(label).or_insert(0);
        *count += 1;
        if best.is_none_or(|(_, top)| *count > top) {
            best = Some((label, *count));
        }
    }
    best.map(|(label, _)| label.clone())
}

/// Forwards labels into a channel so callers can iterate the result stream.
///
/// The receiving iterator ends once the pipeline has closed.
pub struct ChannelSink {
    tx: Sender<Label>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<Label>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }
}

impl ResultSink for ChannelSink {
    fn accept(&mut self, label: Label) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.tx.send(label);
    }
}
