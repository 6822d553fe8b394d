use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use indexmap::IndexSet;
use rustc_hash::FxHashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use tracing::{debug, warn};

use super::bridge::{importer_bridge, ImportRequest, ImporterSignal, MainImporterPort, WorkerImporterPort};
use super::{
    ImportResolver, RenderContext, RenderLogger, RenderOptions, RenderOutput, ResolveError,
    StylesheetError, StylesheetLanguage, StylesheetPreprocessor, StylesheetWarning,
};

type RenderResult = Result<RenderOutput, StylesheetError>;

struct RenderJob {
    id: u64,
    source: String,
    options: RenderOptions,
    has_importer: bool,
}

struct RenderResponse {
    id: u64,
    /// `None` when the preprocessor panicked
    result: Option<RenderResult>,
    warnings: Vec<StylesheetWarning>,
}

struct PendingRender {
    importer: Option<Arc<dyn ImportResolver>>,
    logger: Option<Arc<dyn RenderLogger>>,
    previous_resolved_modules: IndexSet<PathBuf>,
    reply: Sender<RenderResult>,
}

type PendingRenders = Arc<Mutex<FxHashMap<u64, PendingRender>>>;

struct WorkerHandle {
    jobs: Sender<RenderJob>,
    signal: Arc<ImporterSignal>,
}

#[derive(Default)]
struct PoolState {
    workers: Vec<WorkerHandle>,
    idle: Vec<usize>,
    next_worker_index: usize,
    /// Bumped by `close` so listeners of terminated workers stop touching
    /// the idle list
    generation: u64,
}

/// A render submitted to the pool
pub struct RenderTask {
    receiver: Receiver<RenderResult>,
}

impl RenderTask {
    /// Block until the render finishes. A pool closed in the meantime yields
    /// `Terminated`.
    pub fn wait(self) -> RenderResult {
        self.receiver.recv().unwrap_or(Err(StylesheetError::Terminated))
    }
}

/// Worker threads of one stylesheet language
pub struct StylesheetWorkerPool {
    language: StylesheetLanguage,
    preprocessor: Arc<dyn StylesheetPreprocessor>,
    max_workers: usize,
    state: Arc<Mutex<PoolState>>,
    requests: PendingRenders,
    next_id: AtomicU64,
}

impl StylesheetWorkerPool {
    /// Workers are spawned on demand, never more than `max_workers`
    pub fn new(
        language: StylesheetLanguage,
        preprocessor: Arc<dyn StylesheetPreprocessor>,
        max_workers: usize,
    ) -> Self {
        StylesheetWorkerPool {
            language,
            preprocessor,
            max_workers: max_workers.max(1),
            state: Arc::new(Mutex::new(PoolState::default())),
            requests: Arc::new(Mutex::new(FxHashMap::default())),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn language(&self) -> StylesheetLanguage {
        self.language
    }

    pub fn worker_count(&self) -> usize {
        lock(&self.state).workers.len()
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Submit a render. Imports are resolved through `importer` on a
    /// listener thread; warnings are replayed to `logger` once the render
    /// completes.
    pub fn render(
        &self,
        source: &str,
        options: RenderOptions,
        importer: Option<Arc<dyn ImportResolver>>,
        logger: Option<Arc<dyn RenderLogger>>,
    ) -> Result<RenderTask, StylesheetError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (reply, receiver) = bounded(1);
        let job = RenderJob {
            id,
            source: source.to_string(),
            options,
            has_importer: importer.is_some(),
        };

        lock(&self.requests).insert(
            id,
            PendingRender {
                importer,
                logger,
                previous_resolved_modules: IndexSet::new(),
                reply,
            },
        );

        let sent = {
            let mut state = lock(&self.state);
            self.acquire_worker(&mut state)
                .and_then(|index| {
                    state.workers[index]
                        .jobs
                        .send(job)
                        .map_err(|_| StylesheetError::Terminated)
                })
        };

        if let Err(error) = sent {
            lock(&self.requests).remove(&id);
            return Err(error);
        }

        Ok(RenderTask { receiver })
    }

    /// Terminate every worker. Waiting importers are released, pending
    /// renders fail with `Terminated` and threads are left to exit on their
    /// own. The next render starts new workers.
    pub fn close(&self) {
        let workers = {
            let mut state = lock(&self.state);
            state.generation += 1;
            state.idle.clear();
            state.next_worker_index = 0;
            std::mem::take(&mut state.workers)
        };

        for worker in &workers {
            worker.signal.terminate();
        }

        let pending = std::mem::take(&mut *lock(&self.requests));
        if !workers.is_empty() || !pending.is_empty() {
            debug!(
                language = %self.language,
                workers = workers.len(),
                pending = pending.len(),
                "Terminated stylesheet workers"
            );
        }
    }

    fn acquire_worker(&self, state: &mut PoolState) -> Result<usize, StylesheetError> {
        if let Some(index) = state.idle.pop() {
            return Ok(index);
        }

        if state.workers.len() < self.max_workers {
            let index = state.workers.len();
            let worker = self.spawn_worker(index, state.generation)?;
            state.workers.push(worker);
            return Ok(index);
        }

        let index = state.next_worker_index % state.workers.len();
        state.next_worker_index = (index + 1) % state.workers.len();
        Ok(index)
    }

    fn spawn_worker(&self, index: usize, generation: u64) -> Result<WorkerHandle, StylesheetError> {
        let (job_sender, job_receiver) = unbounded();
        let (response_sender, response_receiver) = unbounded();
        let (main_port, worker_port) = importer_bridge();
        let signal = main_port.signal().clone();
        let name = format!("ng-{}-{}", self.language, index);

        let preprocessor = self.preprocessor.clone();
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_worker(preprocessor, job_receiver, response_sender, worker_port))
            .map_err(|error| StylesheetError::Spawn(error.to_string()))?;

        let listener = Listener {
            index,
            generation,
            state: self.state.clone(),
            requests: self.requests.clone(),
            port: main_port,
            responses: response_receiver,
        };
        thread::Builder::new()
            .name(format!("{}-listener", name))
            .spawn(move || listener.run())
            .map_err(|error| StylesheetError::Spawn(error.to_string()))?;

        debug!(language = %self.language, index, "Started stylesheet worker");
        Ok(WorkerHandle {
            jobs: job_sender,
            signal,
        })
    }
}

impl Drop for StylesheetWorkerPool {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_worker(
    preprocessor: Arc<dyn StylesheetPreprocessor>,
    jobs: Receiver<RenderJob>,
    responses: Sender<RenderResponse>,
    port: WorkerImporterPort,
) {
    // Ends once the pool drops the job sender
    for job in jobs.iter() {
        let importer = job.has_importer.then_some(&port);
        let mut context = RenderContext::new(job.id, importer);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            preprocessor.render(&job.source, &job.options, &mut context)
        }))
        .ok();

        let response = RenderResponse {
            id: job.id,
            result,
            warnings: context.into_warnings(),
        };
        if responses.send(response).is_err() {
            break;
        }
    }
}

/// Coordinator side of one worker: completes renders and answers imports
struct Listener {
    index: usize,
    generation: u64,
    state: Arc<Mutex<PoolState>>,
    requests: PendingRenders,
    port: MainImporterPort,
    responses: Receiver<RenderResponse>,
}

impl Listener {
    fn run(self) {
        loop {
            select! {
                recv(self.responses) -> response => match response {
                    Ok(response) => self.complete(response),
                    Err(_) => break,
                },
                recv(self.port.requests()) -> request => match request {
                    Ok(request) => self.resolve(request),
                    Err(_) => break,
                },
            }
        }
    }

    fn complete(&self, response: RenderResponse) {
        let pending = lock(&self.requests).remove(&response.id);

        {
            let mut state = lock(&self.state);
            if state.generation == self.generation && !state.idle.contains(&self.index) {
                state.idle.push(self.index);
            }
        }

        // Dropped by `close`
        let Some(pending) = pending else {
            return;
        };

        if let Some(logger) = &pending.logger {
            for warning in &response.warnings {
                logger.warn(warning);
            }
        }

        let result = response.result.unwrap_or(Err(StylesheetError::NoResult));
        let _ = pending.reply.send(result);
    }

    fn resolve(&self, request: ImportRequest) {
        let found = lock(&self.requests).get(&request.id).and_then(|pending| {
            let importer = pending.importer.clone()?;
            let previous: Vec<PathBuf> = pending.previous_resolved_modules.iter().cloned().collect();
            Some((importer, previous))
        });

        let Some((importer, previous)) = found else {
            self.port.respond(Ok(None));
            return;
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            importer.resolve(&request.url, &request.options, &previous)
        }))
        .unwrap_or_else(|_| {
            warn!(url = %request.url, "Stylesheet import resolver panicked");
            Err(ResolveError::Failed {
                url: request.url.clone(),
                message: "resolver panicked".to_string(),
            })
        });

        if let Ok(Some(path)) = &result {
            if let Some(directory) = path.parent() {
                if let Some(pending) = lock(&self.requests).get_mut(&request.id) {
                    pending.previous_resolved_modules.insert(directory.to_path_buf());
                }
            }
        }

        self.port.respond(result);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
