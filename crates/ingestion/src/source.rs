//! Background trigger sources
//!
//! Each source runs on its own named OS thread and pushes into the shared
//! [`TriggerQueue`]. [`SourceContainer`] owns the threads; shutting it down
//! closes the queue first, then joins every thread.

use std::io::Read;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use contracts::{TriggerCode, TriggerEvent};
use tracing::{debug, info, warn};

use crate::error::{IngestionError, Result};
use crate::queue::TriggerQueue;

/// Granularity of [`SourceContext::sleep`]'s close checks
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// What a source thread gets to talk to the queue
pub struct SourceContext {
    name: String,
    queue: TriggerQueue,
}

impl SourceContext {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Push `code` stamped with the current instant; `false` once closed
    pub fn enqueue(&self, code: TriggerCode) -> bool {
        self.queue.enqueue(TriggerEvent::now(code))
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// Sleep for `duration`, waking early on close
    ///
    /// Returns `false` if the queue was closed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_closed() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

/// A producer that runs until its input ends or the queue closes
pub trait TriggerSource: Send + 'static {
    fn name(&self) -> &str;
    fn run(self, ctx: SourceContext);
}

/// Owns the producer side of the queue and all source threads
pub struct SourceContainer {
    queue: TriggerQueue,
    threads: Vec<(String, JoinHandle<()>)>,
    join_timeout: Duration,
}

impl SourceContainer {
    pub fn new(queue: TriggerQueue) -> Self {
        Self {
            queue,
            threads: Vec::new(),
            join_timeout: Duration::from_secs(2),
        }
    }

    /// How long `shutdown` waits for each thread before detaching it
    pub fn with_join_timeout(mut self, join_timeout: Duration) -> Self {
        self.join_timeout = join_timeout;
        self
    }

    pub fn queue(&self) -> &TriggerQueue {
        &self.queue
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Start `source` on a new thread named after it
    pub fn add_source<S: TriggerSource>(&mut self, source: S) -> Result<()> {
        let name = source.name().to_string();
        self.spawn(name, move |ctx| source.run(ctx))
    }

    /// Start a closure as a source
    pub fn spawn<F>(&mut self, name: impl Into<String>, body: F) -> Result<()>
    where
        F: FnOnce(SourceContext) + Send + 'static,
    {
        let name = name.into();
        let ctx = SourceContext {
            name: name.clone(),
            queue: self.queue.clone(),
        };

        let handle = thread::Builder::new()
            .name(format!("source-{}", name))
            .spawn(move || {
                debug!(source = %ctx.name, "Source started");
                let source = ctx.name.clone();
                body(ctx);
                debug!(source = %source, "Source finished");
            })
            .map_err(|source| IngestionError::SourceSpawn {
                name: name.clone(),
                source,
            })?;

        info!(source = %name, "Started trigger source");
        self.threads.push((name, handle));
        Ok(())
    }

    /// Close the queue, then join every source thread
    ///
    /// A thread still blocked after the join timeout (e.g. on a terminal
    /// read) is detached with a warning.
    pub fn shutdown(&mut self) {
        self.queue.close();
        for (name, handle) in self.threads.drain(..) {
            let deadline = Instant::now() + self.join_timeout;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(SLEEP_SLICE);
            }
            if !handle.is_finished() {
                warn!(source = %name, "Source did not stop in time; detaching");
                continue;
            }
            if handle.join().is_err() {
                warn!(source = %name, "Source thread panicked");
            }
        }
    }

    /// [`shutdown`](Self::shutdown) for async callers
    ///
    /// The joins run on the blocking pool, so a source stuck on a terminal
    /// read never stalls a runtime worker.
    pub async fn shutdown_async(mut self) {
        if let Err(e) = tokio::task::spawn_blocking(move || self.shutdown()).await {
            warn!(error = %e, "Source shutdown task failed");
        }
    }
}

impl Drop for SourceContainer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Emits a fixed list of codes, optionally forever
pub struct GeneratorSource {
    name: String,
    codes: Vec<TriggerCode>,
    interval: Duration,
    repeat: bool,
}

impl GeneratorSource {
    /// Emit `codes` once, `interval` apart
    pub fn sequence(name: impl Into<String>, codes: Vec<TriggerCode>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            codes,
            interval,
            repeat: false,
        }
    }

    /// Emit `code` every `interval` until the queue closes
    pub fn periodic(name: impl Into<String>, code: TriggerCode, interval: Duration) -> Self {
        Self {
            name: name.into(),
            codes: vec![code],
            interval,
            repeat: true,
        }
    }
}

impl TriggerSource for GeneratorSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self, ctx: SourceContext) {
        if self.codes.is_empty() {
            return;
        }
        loop {
            for (i, &code) in self.codes.iter().enumerate() {
                if !ctx.enqueue(code) {
                    return;
                }
                let last = !self.repeat && i + 1 == self.codes.len();
                if !last && !ctx.sleep(self.interval) {
                    return;
                }
            }
            if !self.repeat {
                return;
            }
        }
    }
}

/// Turns every byte of a stream into a trigger
///
/// Line breaks and non-positive bytes are skipped; end of input or a read
/// error ends the source.
pub struct ReaderSource<R> {
    name: String,
    reader: R,
}

impl<R: Read + Send + 'static> ReaderSource<R> {
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        Self {
            name: name.into(),
            reader,
        }
    }
}

impl ReaderSource<std::io::Stdin> {
    pub fn stdin() -> Self {
        Self::new("stdin", std::io::stdin())
    }
}

impl<R: Read + Send + 'static> TriggerSource for ReaderSource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(mut self, ctx: SourceContext) {
        let mut byte = [0u8; 1];
        while !ctx.is_closed() {
            match self.reader.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    let code = byte[0] as i8;
                    if code <= 0 || byte[0] == b'\n' || byte[0] == b'\r' {
                        continue;
                    }
                    if !ctx.enqueue(code) {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(source = %self.name, error = %e, "Source read failed");
                    break;
                }
            }
        }
    }
}
