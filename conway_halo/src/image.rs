// image.rs - The image collaborator: named grids in, named grids out
//
// A store is plain blocking code. `ImageIo` runs it on its own blocking
// thread, so disk access never runs on a runtime worker. Writes are queued;
// `check_idle` waits for every queued write and reports the first failure.
// The distributor calls it after each snapshot and before returning.

use crate::error::ImageError;
use crate::grid::Grid;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub trait ImageStore: Send + 'static {
    /// Loads `name`, which must be exactly `width` x `height`.
    fn load(&mut self, name: &str, width: usize, height: usize) -> Result<Grid, ImageError>;
    fn store(&mut self, name: &str, grid: &Grid) -> Result<(), ImageError>;
}

pub(crate) fn check_dimensions(name: &str, grid: &Grid, width: usize, height: usize) -> Result<(), ImageError> {
    if grid.width() != width || grid.height() != height {
        return Err(ImageError::DimensionMismatch {
            name: name.to_owned(),
            width,
            height,
            actual_width: grid.width(),
            actual_height: grid.height(),
        });
    }
    Ok(())
}

enum IoCommand {
    Load {
        name: String,
        width: usize,
        height: usize,
        reply: oneshot::Sender<Result<Grid, ImageError>>,
    },
    Store {
        name: String,
        grid: Grid,
    },
    CheckIdle {
        reply: oneshot::Sender<Result<(), ImageError>>,
    },
}

/// Handle to the image task.
pub struct ImageIo {
    commands: mpsc::UnboundedSender<IoCommand>,
    task: JoinHandle<()>,
}

impl ImageIo {
    pub fn spawn(store: impl ImageStore) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::task::spawn_blocking(move || serve(store, rx));
        Self { commands, task }
    }

    pub async fn load(&self, name: &str, width: usize, height: usize) -> Result<Grid, ImageError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(IoCommand::Load {
                name: name.to_owned(),
                width,
                height,
                reply,
            })
            .map_err(|_| ImageError::Closed)?;
        rx.await.map_err(|_| ImageError::Closed)?
    }

    /// Queues a write and returns straight away.
    pub fn store(&self, name: &str, grid: Grid) -> Result<(), ImageError> {
        self.commands
            .send(IoCommand::Store {
                name: name.to_owned(),
                grid,
            })
            .map_err(|_| ImageError::Closed)
    }

    /// Returns once everything queued before it has been written.
    pub async fn check_idle(&self) -> Result<(), ImageError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(IoCommand::CheckIdle { reply })
            .map_err(|_| ImageError::Closed)?;
        rx.await.map_err(|_| ImageError::Closed)?
    }

    pub async fn shutdown(self) {
        drop(self.commands);
        let _ = self.task.await;
    }
}

fn serve(mut store: impl ImageStore, mut commands: mpsc::UnboundedReceiver<IoCommand>) {
    let mut failure = None;
    while let Some(command) = commands.blocking_recv() {
        match command {
            IoCommand::Load {
                name,
                width,
                height,
                reply,
            } => {
                debug!(%name, width, height, "loading image");
                let _ = reply.send(store.load(&name, width, height));
            }
            IoCommand::Store { name, grid } => match store.store(&name, &grid) {
                Ok(()) => debug!(%name, "image written"),
                Err(error) => {
                    warn!(%name, %error, "image write failed");
                    failure.get_or_insert(error);
                }
            },
            IoCommand::CheckIdle { reply } => {
                let _ = reply.send(failure.take().map_or(Ok(()), Err));
            }
        }
    }
}

#[derive(Default)]
struct Images {
    named: HashMap<String, Grid>,
    writes: Vec<(String, Grid)>,
}

/// In-memory store. Clones share the same images; every write is also
/// recorded in order.
#[derive(Clone, Default)]
pub struct MemoryStore {
    images: Arc<Mutex<Images>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(name: &str, grid: Grid) -> Self {
        let store = Self::new();
        store.insert(name, grid);
        store
    }

    pub fn insert(&self, name: &str, grid: Grid) {
        self.lock().named.insert(name.to_owned(), grid);
    }

    pub fn get(&self, name: &str) -> Option<Grid> {
        self.lock().named.get(name).cloned()
    }

    /// Every stored image, oldest first.
    pub fn writes(&self) -> Vec<(String, Grid)> {
        self.lock().writes.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Images> {
        // Every update is a single insert or push, so a poisoned lock is still consistent.
        self.images.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ImageStore for MemoryStore {
    fn load(&mut self, name: &str, width: usize, height: usize) -> Result<Grid, ImageError> {
        let grid = self.get(name).ok_or_else(|| ImageError::NotFound {
            name: name.to_owned(),
        })?;
        check_dimensions(name, &grid, width, height)?;
        Ok(grid)
    }

    fn store(&mut self, name: &str, grid: &Grid) -> Result<(), ImageError> {
        let mut images = self.lock();
        images.named.insert(name.to_owned(), grid.clone());
        images.writes.push((name.to_owned(), grid.clone()));
        Ok(())
    }
}

/// Serves one generated grid under `name` and defers everything else to
/// the wrapped store.
pub struct Seeded<S> {
    name: String,
    grid: Grid,
    inner: S,
}

impl<S: ImageStore> Seeded<S> {
    pub fn new(name: impl Into<String>, grid: Grid, inner: S) -> Self {
        Self {
            name: name.into(),
            grid,
            inner,
        }
    }
}

impl<S: ImageStore> ImageStore for Seeded<S> {
    fn load(&mut self, name: &str, width: usize, height: usize) -> Result<Grid, ImageError> {
        if name != self.name {
            return self.inner.load(name, width, height);
        }
        check_dimensions(name, &self.grid, width, height)?;
        Ok(self.grid.clone())
    }

    fn store(&mut self, name: &str, grid: &Grid) -> Result<(), ImageError> {
        self.inner.store(name, grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingStore;

    impl ImageStore for FailingStore {
        fn load(&mut self, name: &str, _: usize, _: usize) -> Result<Grid, ImageError> {
            Err(ImageError::NotFound { name: name.to_owned() })
        }

        fn store(&mut self, name: &str, _: &Grid) -> Result<(), ImageError> {
            Err(ImageError::Malformed {
                name: name.to_owned(),
                reason: "read-only".to_owned(),
            })
        }
    }

    #[tokio::test]
    async fn writes_are_flushed_by_check_idle() {
        let store = MemoryStore::new();
        let io = ImageIo::spawn(store.clone());
        io.store("a", Grid::new(2, 2)).unwrap();
        io.store("b", Grid::from_ascii(&["#."])).unwrap();
        io.check_idle().await.unwrap();

        let names: Vec<_> = store.writes().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["a", "b"]);
        io.shutdown().await;
    }

    #[tokio::test]
    async fn load_checks_dimensions() {
        let io = ImageIo::spawn(MemoryStore::with_image("4x2", Grid::new(4, 2)));
        assert_eq!(io.load("4x2", 4, 2).await.unwrap(), Grid::new(4, 2));
        assert!(matches!(
            io.load("4x2", 2, 4).await,
            Err(ImageError::DimensionMismatch { actual_width: 4, actual_height: 2, .. })
        ));
        assert!(matches!(io.load("8x8", 8, 8).await, Err(ImageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn write_failure_surfaces_once_at_check_idle() {
        let io = ImageIo::spawn(FailingStore);
        io.store("out", Grid::new(1, 1)).unwrap();
        assert!(matches!(io.check_idle().await, Err(ImageError::Malformed { .. })));
        assert!(io.check_idle().await.is_ok());
    }

    #[tokio::test]
    async fn seeded_store_serves_its_grid_and_passes_writes_through() {
        let memory = MemoryStore::new();
        let seed = Grid::from_ascii(&["#.#", "..."]);
        let io = ImageIo::spawn(Seeded::new("3x2", seed.clone(), memory.clone()));
        assert_eq!(io.load("3x2", 3, 2).await.unwrap(), seed);
        io.store("3x2x0", seed.clone()).unwrap();
        io.check_idle().await.unwrap();
        assert_eq!(memory.get("3x2x0"), Some(seed));
    }
}
