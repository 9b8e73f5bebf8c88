use crate::{
    catalog::{CatalogRoot, PresetId, RemotePreset},
    client::{CatalogSource, FetchError},
};
use std::{
    sync::{
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc,
    },
    thread,
};

#[derive(Debug, Clone, PartialEq)]
pub enum RequestState<T> {
    Idle,
    Pending,
    Succeeded(T),
    Faulted(FetchError),
}

impl<T> RequestState<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, RequestState::Pending)
    }
}

/// What `poll` observed this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    Nothing,
    Completed,
    Faulted,
    DroppedStale,
}

struct Completion<T> {
    generation: u64,
    result: Result<T, FetchError>,
}

/// Holds at most one request of one kind. Work runs on its own thread; results are
/// only observed through `poll`, and a result whose request was discarded is dropped.
pub struct RequestSlot<T> {
    state: RequestState<T>,
    generation: u64,
    tx: Sender<Completion<T>>,
    rx: Receiver<Completion<T>>,
}

impl<T: Send + 'static> RequestSlot<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            state: RequestState::Idle,
            generation: 0,
            tx,
            rx,
        }
    }

    pub fn state(&self) -> &RequestState<T> {
        &self.state
    }

    /// Starts `work` unless a request is already pending. Nothing is queued.
    pub fn start<F>(&mut self, work: F) -> bool
    where
        F: FnOnce() -> Result<T, FetchError> + Send + 'static,
    {
        if self.state.is_pending() {
            return false;
        }
        self.generation += 1;
        self.state = RequestState::Pending;
        let generation = self.generation;
        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = work();
            let _ = tx.send(Completion { generation, result });
        });
        true
    }

    /// Forgets the current request so a fresh one can start.
    pub fn discard(&mut self) {
        self.generation += 1;
        self.state = RequestState::Idle;
    }

    pub fn poll(&mut self) -> PollEvent {
        let mut event = PollEvent::Nothing;
        loop {
            match self.rx.try_recv() {
                Ok(completion) => {
                    if completion.generation != self.generation || !self.state.is_pending() {
                        event = PollEvent::DroppedStale;
                        continue;
                    }
                    match completion.result {
                        Ok(value) => {
                            self.state = RequestState::Succeeded(value);
                            event = PollEvent::Completed;
                        }
                        Err(err) => {
                            self.state = RequestState::Faulted(err);
                            event = PollEvent::Faulted;
                        }
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        event
    }
}

impl<T: Send + 'static> Default for RequestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RequestCoordinator {
    source: Arc<dyn CatalogSource>,
    pub catalog: RequestSlot<CatalogRoot>,
    pub updates: RequestSlot<Vec<RemotePreset>>,
}

impl RequestCoordinator {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self {
            source,
            catalog: RequestSlot::new(),
            updates: RequestSlot::new(),
        }
    }

    pub fn request_catalog(&mut self) -> bool {
        let source = Arc::clone(&self.source);
        self.catalog.start(move || source.fetch_catalog())
    }

    /// Empty `ids` is refused here, before any thread or socket is involved.
    pub fn request_updates(&mut self, ids: Vec<PresetId>) -> Result<bool, FetchError> {
        if ids.is_empty() {
            return Err(FetchError::EmptyQuery);
        }
        let source = Arc::clone(&self.source);
        Ok(self.updates.start(move || source.fetch_updates(&ids)))
    }
}
