//! Progress reporting, cooperative cancellation, and item traversal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::domain::model::{SubmittableItem, forest_leaf_count};

/// Progress and cancellation contract for long-running operations.
///
/// Work is split into nested subtasks: `begin_subtask(n)` declares `n` units,
/// `do_work` consumes them, and `finish_subtask` closes the subtask, which
/// then counts as a single unit of its parent.
pub trait LongRunningTask {
    fn begin_subtask(&mut self, total_units: usize);
    fn do_work(&mut self, units: usize);
    fn finish_subtask(&mut self);
    fn is_cancelled(&self) -> bool;

    /// Close the current subtask after a failure. Unlike `finish_subtask`,
    /// implementations may leave the parent's unit uncounted.
    fn abandon_subtask(&mut self) {
        self.finish_subtask();
    }

    /// Describe what is currently happening. Ignored by default.
    fn set_message(&mut self, _message: &str) {}
}

/// Task that tracks nothing and is never cancelled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTask;

impl LongRunningTask for NoopTask {
    fn begin_subtask(&mut self, _total_units: usize) {}
    fn do_work(&mut self, _units: usize) {}
    fn finish_subtask(&mut self) {}
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Shared flag used to request cancellation from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Snapshot passed to progress observers.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Overall completion in `[0, 1]`.
    pub fraction: f64,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    total: usize,
    done: usize,
}

type Observer = Box<dyn FnMut(&ProgressUpdate) + Send>;

/// [`LongRunningTask`] that computes overall completion across nested
/// subtasks and notifies an optional observer.
#[derive(Default)]
pub struct ProgressTracker {
    frames: Vec<Frame>,
    finished: bool,
    message: Option<String>,
    cancel: CancelHandle,
    observer: Option<Observer>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(mut self, observer: impl FnMut(&ProgressUpdate) + Send + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Handle that can cancel this task from elsewhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Number of subtasks currently open.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Overall completion in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.frames.is_empty() {
            return if self.finished { 1.0 } else { 0.0 };
        }

        self.frames.iter().rev().fold(0.0, |inner, frame| {
            if frame.total == 0 {
                return 0.0;
            }
            ((frame.done as f64 + inner) / frame.total as f64).min(1.0)
        })
    }

    fn notify(&mut self) {
        let update = ProgressUpdate {
            fraction: self.fraction(),
            message: self.message.clone(),
        };
        if let Some(observer) = self.observer.as_mut() {
            observer(&update);
        }
    }
}

impl LongRunningTask for ProgressTracker {
    fn begin_subtask(&mut self, total_units: usize) {
        if self.frames.is_empty() {
            self.finished = false;
        }
        self.frames.push(Frame {
            total: total_units,
            done: 0,
        });
        self.notify();
    }

    fn do_work(&mut self, units: usize) {
        if let Some(frame) = self.frames.last_mut() {
            frame.done = (frame.done + units).min(frame.total);
        }
        self.notify();
    }

    fn finish_subtask(&mut self) {
        if self.frames.pop().is_none() {
            return;
        }
        match self.frames.last_mut() {
            Some(parent) => parent.done = (parent.done + 1).min(parent.total),
            None => self.finished = true,
        }
        self.notify();
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn abandon_subtask(&mut self) {
        if self.frames.pop().is_some() {
            self.notify();
        }
    }

    fn set_message(&mut self, message: &str) {
        self.message = Some(message.to_owned());
        self.notify();
    }
}

/// Why a traversal stopped early.
#[derive(Debug)]
pub enum VisitError<E> {
    Cancelled,
    Callback(E),
}

/// Walk the forest depth-first and call `accept` once per file.
///
/// Folders are descended into but never passed to `accept`. The walk runs as
/// one subtask of `task` sized to the number of files, checks for
/// cancellation before every file, and reports one unit per file. An error
/// from `accept` stops the walk and abandons the subtask.
pub fn visit_items<E, F>(
    items: &[SubmittableItem],
    task: &mut dyn LongRunningTask,
    mut accept: F,
) -> Result<(), VisitError<E>>
where
    F: FnMut(&SubmittableItem) -> Result<(), E>,
{
    task.begin_subtask(forest_leaf_count(items));
    match walk(items, task, &mut accept) {
        Ok(()) => {
            task.finish_subtask();
            Ok(())
        }
        Err(err) => {
            task.abandon_subtask();
            Err(err)
        }
    }
}

fn walk<E, F>(
    items: &[SubmittableItem],
    task: &mut dyn LongRunningTask,
    accept: &mut F,
) -> Result<(), VisitError<E>>
where
    F: FnMut(&SubmittableItem) -> Result<(), E>,
{
    for item in items {
        if item.is_folder() {
            walk(item.children(), task, accept)?;
            continue;
        }

        if task.is_cancelled() {
            return Err(VisitError::Cancelled);
        }
        task.set_message(item.filename());
        accept(item).map_err(VisitError::Callback)?;
        task.do_work(1);
    }
    Ok(())
}
