// SPDX-License-Identifier: GPL-3.0-only

//! Single-threaded sequential executor
//!
//! One dedicated thread owns a context value `C` and runs submitted jobs
//! against it strictly in submission order. The render stage uses it to own
//! the video encoder and its input surface; nothing else ever touches them.

use crate::errors::RecordingError;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

type Job<C> = Box<dyn FnOnce(&mut C) + Send + 'static>;

enum Message<C> {
    Run(Job<C>),
    Quit,
}

/// Handle to the executor thread
pub struct RenderExecutor<C> {
    sender: Sender<Message<C>>,
    thread_handle: Option<JoinHandle<()>>,
    name: String,
}

impl<C: Send + 'static> RenderExecutor<C> {
    /// Spawn the executor thread, moving `context` onto it
    pub fn spawn(name: &str, context: C) -> Result<Self, RecordingError> {
        let (sender, receiver) = mpsc::channel();
        let thread_name = name.to_string();

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(&thread_name, context, receiver))
            .map_err(|e| RecordingError::Pipeline(format!("Failed to spawn {}: {}", name, e)))?;

        info!(name = %name, "Render executor started");

        Ok(Self {
            sender,
            thread_handle: Some(thread_handle),
            name: name.to_string(),
        })
    }

    /// Queue `job` behind everything submitted before it
    pub fn submit<F>(&self, job: F) -> Result<(), RecordingError>
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        self.sender
            .send(Message::Run(Box::new(job)))
            .map_err(|_| RecordingError::NotRecording)
    }

    /// Let the thread exit once the queue is drained
    ///
    /// Returns the thread handle so the caller decides when to join.
    pub fn quit(&mut self) -> Option<JoinHandle<()>> {
        debug!(name = %self.name, "Render executor quit requested");
        let _ = self.sender.send(Message::Quit);
        self.thread_handle.take()
    }
}

fn run<C>(name: &str, mut context: C, receiver: Receiver<Message<C>>) {
    debug!(name = %name, "Render executor thread running");
    let mut jobs = 0u64;

    // A disconnected channel means every handle is gone
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Run(job) => {
                job(&mut context);
                jobs += 1;
            }
            Message::Quit => break,
        }
    }

    info!(name = %name, jobs, "Render executor thread exiting");
}

impl<C> Drop for RenderExecutor<C> {
    fn drop(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            let _ = self.sender.send(Message::Quit);
            if handle.join().is_err() {
                warn!(name = %self.name, "Render executor thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_jobs_run_in_submission_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut executor = RenderExecutor::spawn("test-executor", Vec::<u32>::new()).unwrap();

        for i in 0..50 {
            executor.submit(move |ctx: &mut Vec<u32>| ctx.push(i)).unwrap();
        }
        let seen_clone = Arc::clone(&seen);
        executor
            .submit(move |ctx: &mut Vec<u32>| *seen_clone.lock().unwrap() = ctx.clone())
            .unwrap();

        executor.quit().unwrap().join().unwrap();
        assert_eq!(*seen.lock().unwrap(), (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_submit_after_quit_fails() {
        let mut executor = RenderExecutor::spawn("test-executor", ()).unwrap();
        executor.quit().unwrap().join().unwrap();
        assert!(matches!(
            executor.submit(|_| {}),
            Err(RecordingError::NotRecording)
        ));
    }
}
