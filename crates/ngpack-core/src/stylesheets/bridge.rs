//! Synchronous import resolution across threads.
//!
//! A preprocessor on a worker thread asks for an import and must block until
//! the coordinator answers. Each worker owns one bridge: a request channel,
//! a response channel and a shared signal. At most one request per worker is
//! outstanding at any time.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use super::{ImportOptions, ResolveError};

const SIGNAL_WAITING: i32 = 0;
const SIGNAL_READY: i32 = 1;
const SIGNAL_TERMINATED: i32 = 2;

/// Atomic integer the worker blocks on until the coordinator stores a
/// non-zero value. The condition variable only provides the blocking wait.
#[derive(Debug)]
pub struct ImporterSignal {
    state: AtomicI32,
    lock: Mutex<()>,
    condvar: Condvar,
}

impl Default for ImporterSignal {
    fn default() -> Self {
        ImporterSignal {
            state: AtomicI32::new(SIGNAL_READY),
            lock: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }
}

impl ImporterSignal {
    /// Store 0 before posting a request. Fails once terminated.
    fn arm(&self) -> bool {
        self.state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |state| {
                (state != SIGNAL_TERMINATED).then_some(SIGNAL_WAITING)
            })
            .is_ok()
    }

    /// Block while the state is 0 and return the value that ended the wait
    fn wait(&self) -> i32 {
        let mut guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        loop {
            let state = self.state.load(Ordering::SeqCst);
            if state != SIGNAL_WAITING {
                return state;
            }
            guard = self
                .condvar
                .wait(guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    fn store_and_notify(&self, value: i32) {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.state.load(Ordering::SeqCst) == SIGNAL_TERMINATED {
            return;
        }
        self.state.store(value, Ordering::SeqCst);
        self.condvar.notify_all();
    }

    /// Release any waiter for good
    pub fn terminate(&self) {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.state.store(SIGNAL_TERMINATED, Ordering::SeqCst);
        self.condvar.notify_all();
    }

    pub fn is_terminated(&self) -> bool {
        self.state.load(Ordering::SeqCst) == SIGNAL_TERMINATED
    }
}

/// Import request posted by a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    /// Id of the render request being processed
    pub id: u64,
    pub url: String,
    pub options: ImportOptions,
}

pub type ImportResponse = Result<Option<PathBuf>, ResolveError>;

/// Coordinator end of a bridge
pub struct MainImporterPort {
    requests: Receiver<ImportRequest>,
    responses: Sender<ImportResponse>,
    signal: Arc<ImporterSignal>,
}

impl MainImporterPort {
    pub fn requests(&self) -> &Receiver<ImportRequest> {
        &self.requests
    }

    /// Post the answer, then store 1 and wake the worker
    pub fn respond(&self, response: ImportResponse) {
        // A worker that stopped waiting is not an error
        let _ = self.responses.send(response);
        self.signal.store_and_notify(SIGNAL_READY);
    }

    pub fn signal(&self) -> &Arc<ImporterSignal> {
        &self.signal
    }
}

/// Worker end of a bridge
pub struct WorkerImporterPort {
    requests: Sender<ImportRequest>,
    responses: Receiver<ImportResponse>,
    signal: Arc<ImporterSignal>,
}

impl WorkerImporterPort {
    /// Ask the coordinator to resolve `url` and block for the answer
    pub fn resolve(&self, id: u64, url: &str, options: ImportOptions) -> ImportResponse {
        if !self.signal.arm() {
            return Err(ResolveError::Terminated);
        }

        let request = ImportRequest {
            id,
            url: url.to_string(),
            options,
        };
        if self.requests.send(request).is_err() {
            return Err(ResolveError::Terminated);
        }

        if self.signal.wait() == SIGNAL_TERMINATED {
            return Err(ResolveError::Terminated);
        }

        self.responses.recv().unwrap_or(Err(ResolveError::Terminated))
    }
}

/// Create the two ends of a bridge sharing one signal
pub fn importer_bridge() -> (MainImporterPort, WorkerImporterPort) {
    let (request_sender, request_receiver) = unbounded();
    let (response_sender, response_receiver) = unbounded();
    let signal = Arc::new(ImporterSignal::default());

    (
        MainImporterPort {
            requests: request_receiver,
            responses: response_sender,
            signal: signal.clone(),
        },
        WorkerImporterPort {
            requests: request_sender,
            responses: response_receiver,
            signal,
        },
    )
}
