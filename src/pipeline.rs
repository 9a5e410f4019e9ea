//! Ingestion queue, cascade workers, and the result consumer.
//!
//! ```text
//! submit() -> [bounded ingestion queue] -> worker(s) -> [result queue] -> consumer -> ResultSink
//! ```
//!
//! Shutdown order in `close()`:
//! 1. drop the pipeline's ingestion sender, so no new frame can enter
//! 2. workers drain what is already queued, then see the queue disconnect
//! 3. join workers; their result senders are gone with them
//! 4. close both models
//! 5. the consumer sees the result queue disconnect, finishes the sink, and is joined

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::cascade::{CascadeDecision, TwoStageCascade};
use crate::config::LabellerConfig;
use crate::debug_frames::DebugFrameWriter;
use crate::decoder::Label;
use crate::error::ModelLoadError;
use crate::frame::Frame;
use crate::model::ClassifierModel;
use crate::sink::ResultSink;

/// Default ingestion queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Created,
    Running,
    Draining,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub queue_capacity: usize,
    /// With one worker, labels come out in submission order.
    pub workers: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            workers: 1,
        }
    }
}

/// A rejected submission. The frame is handed back.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("ingestion queue is full")]
    Full(Frame),
    #[error("pipeline is not accepting frames")]
    Closed(Frame),
}

impl SubmitError {
    pub fn into_frame(self) -> Frame {
        match self {
            SubmitError::Full(frame) | SubmitError::Closed(frame) => frame,
        }
    }
}

/// Per-frame outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub submitted: u64,
    pub processed: u64,
    pub accepted: u64,
    pub no_number: u64,
    pub malformed: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    processed: AtomicU64,
    accepted: AtomicU64,
    no_number: AtomicU64,
    malformed: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PipelineReport {
        // `processed` is read first so a snapshot never shows it above `submitted`.
        let processed = self.processed.load(Ordering::SeqCst);
        PipelineReport {
            submitted: self.submitted.load(Ordering::SeqCst),
            processed,
            accepted: self.accepted.load(Ordering::SeqCst),
            no_number: self.no_number.load(Ordering::SeqCst),
            malformed: self.malformed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

/// Unit of work on the ingestion queue.
struct FrameTask {
    index: u64,
    frame: Frame,
}

pub struct Pipeline {
    state: Mutex<PipelineState>,
    ingest_tx: RwLock<Option<Sender<FrameTask>>>,
    next_index: AtomicU64,
    cascade: Arc<TwoStageCascade>,
    workers: Vec<JoinHandle<()>>,
    consumer: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl Pipeline {
    /// Load both models from `config` and start processing.
    ///
    /// Fails without spawning anything if either model cannot be loaded.
    pub fn init(config: &LabellerConfig, sink: Box<dyn ResultSink>) -> Result<Self, ModelLoadError> {
        let detector = ClassifierModel::load(
            "detector",
            &config.detector_model_path,
            config.detector_input_layer.clone(),
            config.detector_output_layers.clone(),
            config.detector_preprocess(),
        )?;
        let recognizer = ClassifierModel::load(
            "recognizer",
            &config.recognizer_model_path,
            config.recognizer_input_layer.clone(),
            config.recognizer_output_layers.clone(),
            config.recognizer_preprocess(),
        )?;

        let mut cascade = TwoStageCascade::new(detector, recognizer);
        if config.save_debug_frames {
            cascade = cascade.with_debug_writer(DebugFrameWriter::new(
                &config.debug_noise_dir,
                &config.debug_number_dir,
            ));
        }

        let options = PipelineOptions {
            queue_capacity: config.ingestion_queue_capacity,
            workers: config.workers,
        };
        Ok(Self::start(cascade, options, sink))
    }

    /// Spawn workers and the result consumer around an already built cascade.
    pub fn start(cascade: TwoStageCascade, options: PipelineOptions, sink: Box<dyn ResultSink>) -> Self {
        let (ingest_tx, ingest_rx) = crossbeam_channel::bounded(options.queue_capacity.max(1));
        let (result_tx, result_rx) = crossbeam_channel::unbounded();

        let mut pipeline = Self {
            state: Mutex::new(PipelineState::Created),
            ingest_tx: RwLock::new(Some(ingest_tx)),
            next_index: AtomicU64::new(0),
            cascade: Arc::new(cascade),
            workers: Vec::new(),
            consumer: None,
            counters: Arc::new(Counters::default()),
        };

        pipeline.consumer = Some(spawn_consumer(result_rx, sink));
        for worker_index in 0..options.workers.max(1) {
            pipeline.workers.push(spawn_worker(
                worker_index,
                ingest_rx.clone(),
                result_tx.clone(),
                pipeline.cascade.clone(),
                pipeline.counters.clone(),
            ));
        }
        // Only workers may hold result senders from here on.
        drop(result_tx);

        pipeline.set_state(PipelineState::Running);
        info!(
            "pipeline running ({} worker(s), queue capacity {})",
            pipeline.workers.len(),
            options.queue_capacity.max(1)
        );
        pipeline
    }

    pub fn state(&self) -> PipelineState {
        match self.state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Counts so far.
    pub fn report(&self) -> PipelineReport {
        self.counters.snapshot()
    }

    /// Queue a frame, blocking while the ingestion queue is full.
    pub fn submit(&self, frame: Frame) -> Result<(), SubmitError> {
        let Some(tx) = self.sender() else {
            return Err(SubmitError::Closed(frame));
        };
        let task = FrameTask {
            index: self.next_index.fetch_add(1, Ordering::SeqCst),
            frame,
        };
        // Counted before the send so `processed` never runs ahead of `submitted`.
        self.counters.submitted.fetch_add(1, Ordering::SeqCst);
        tx.send(task).map_err(|e| {
            self.counters.submitted.fetch_sub(1, Ordering::SeqCst);
            SubmitError::Closed(e.into_inner().frame)
        })
    }

    /// Queue a frame without blocking.
    pub fn try_submit(&self, frame: Frame) -> Result<(), SubmitError> {
        let Some(tx) = self.sender() else {
            return Err(SubmitError::Closed(frame));
        };
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        self.counters.submitted.fetch_add(1, Ordering::SeqCst);
        match tx.try_send(FrameTask { index, frame }) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.counters.submitted.fetch_sub(1, Ordering::SeqCst);
                // Hand the index back when nobody took a later one, so a
                // rejected try leaves no gap in the debug file names.
                let _ = self.next_index.compare_exchange(
                    index + 1,
                    index,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                match err {
                    TrySendError::Full(task) => Err(SubmitError::Full(task.frame)),
                    TrySendError::Disconnected(task) => Err(SubmitError::Closed(task.frame)),
                }
            }
        }
    }

    /// Stop intake, finish queued frames, release both models, and flush the sink.
    pub fn close(mut self) -> PipelineReport {
        self.shutdown();
        self.counters.snapshot()
    }

    fn sender(&self) -> Option<Sender<FrameTask>> {
        match self.ingest_tx.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_state(&self, next: PipelineState) {
        match self.state.lock() {
            Ok(mut state) => *state = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    fn shutdown(&mut self) {
        if matches!(self.state(), PipelineState::Closed) {
            return;
        }
        self.set_state(PipelineState::Draining);
        debug!("pipeline draining");

        let tx = match self.ingest_tx.write() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(tx);

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("cascade worker panicked");
            }
        }

        self.cascade.close();

        if let Some(consumer) = self.consumer.take() {
            if consumer.join().is_err() {
                error!("result consumer panicked");
            }
        }

        self.set_state(PipelineState::Closed);
        let report = self.counters.snapshot();
        info!(
            "pipeline closed: {} processed, {} labelled, {} noise, {} malformed, {} failed",
            report.processed, report.accepted, report.no_number, report.malformed, report.failed
        );
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker(
    worker_index: usize,
    rx: Receiver<FrameTask>,
    result_tx: Sender<Label>,
    cascade: Arc<TwoStageCascade>,
    counters: Arc<Counters>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        debug!("worker #{worker_index} started");
        for FrameTask { index, frame } in rx.iter() {
            // A panicking backend costs this frame only; the loop keeps its receiver.
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| cascade.process_one(&frame, index)));
            // The frame is released here, before the result is published.
            drop(frame);

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(payload) => {
                    counters.failed.fetch_add(1, Ordering::SeqCst);
                    counters.processed.fetch_add(1, Ordering::SeqCst);
                    warn!("frame #{index}: cascade panicked: {}", panic_message(&*payload));
                    continue;
                }
            };

            match outcome {
                Ok(CascadeDecision::Accepted(label)) => {
                    counters.accepted.fetch_add(1, Ordering::SeqCst);
                    debug!("frame #{index}: {label}");
                    if result_tx.send(label).is_err() {
                        error!("result queue closed before worker #{worker_index} stopped");
                    }
                }
                Ok(CascadeDecision::NoNumber) => {
                    counters.no_number.fetch_add(1, Ordering::SeqCst);
                }
                Ok(CascadeDecision::Malformed(_)) => {
                    counters.malformed.fetch_add(1, Ordering::SeqCst);
                }
                Err(err) => {
                    counters.failed.fetch_add(1, Ordering::SeqCst);
                    warn!("frame #{index}: inference failed: {err}");
                }
            }
            counters.processed.fetch_add(1, Ordering::SeqCst);
        }
        debug!("worker #{worker_index} stopped");
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

fn spawn_consumer(rx: Receiver<Label>, mut sink: Box<dyn ResultSink>) -> JoinHandle<()> {
    thread::spawn(move || {
        for label in rx.iter() {
            sink.accept(label);
        }
        sink.finish();
    })
}
