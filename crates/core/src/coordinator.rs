use crate::error::{BuildError, EngineError, NotReadyError};
use crate::models::{Catalog, EngineDocument, EngineIndex, IndexHandle, IndexedDocument};
use crate::progress::ProgressSink;
use crate::traits::IndexEngine;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub enum IndexStatus {
    Idle,
    Building,
    Ready(Arc<IndexHandle>),
    Failed(BuildError),
}

#[derive(Default)]
struct CoordinatorState {
    building: bool,
    current: Option<Arc<IndexHandle>>,
    last_error: Option<BuildError>,
    generation: u64,
}

/// Owns the one queryable index handle and admits a single build at a time.
///
/// A second build requested while one is running is rejected, not queued.
/// Handles are shared through `Arc`, so swapping in a new one never pulls
/// the old one out from under a query that already holds it.
pub struct IndexCoordinator {
    engine: Arc<dyn IndexEngine>,
    index_name: String,
    state: Mutex<CoordinatorState>,
}

/// Clears the `building` flag when the build ends, including when the
/// build future is dropped part-way.
struct BuildGuard<'a> {
    state: &'a Mutex<CoordinatorState>,
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .building = false;
    }
}

impl IndexCoordinator {
    pub fn new(engine: Arc<dyn IndexEngine>, index_name: impl Into<String>) -> Self {
        Self {
            engine,
            index_name: index_name.into(),
            state: Mutex::new(CoordinatorState::default()),
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Rebuilds the logical index from `snapshot`, overwriting whatever the
    /// engine holds under the same name.
    pub async fn build(
        &self,
        snapshot: Arc<Catalog>,
        progress: &dyn ProgressSink,
    ) -> Result<Arc<IndexHandle>, BuildError> {
        if snapshot.total_pages() == 0 {
            return Err(BuildError::EmptyCatalog);
        }

        let _guard = self.begin_build()?;

        let documents: Vec<EngineDocument> = snapshot
            .documents()
            .iter()
            .map(|document| EngineDocument {
                path: document.source_path.clone(),
                pages: document.pages.clone(),
            })
            .collect();

        info!(
            index = %self.index_name,
            catalog_version = snapshot.version(),
            documents = documents.len(),
            "building index"
        );

        let outcome = self
            .engine
            .build_index(&self.index_name, &documents, true, progress)
            .await
            .and_then(|engine_index| {
                let documents = map_documents(&snapshot, &engine_index)?;
                Ok((engine_index, documents))
            });

        let mut state = self.lock();
        match outcome {
            Ok((engine_index, documents)) => {
                state.generation += 1;
                let handle = Arc::new(IndexHandle {
                    name: self.index_name.clone(),
                    engine_index,
                    generation: state.generation,
                    catalog_version: snapshot.version(),
                    built_at: Utc::now(),
                    documents,
                });
                state.current = Some(Arc::clone(&handle));
                state.last_error = None;
                info!(
                    generation = handle.generation,
                    catalog_version = handle.catalog_version,
                    "index ready"
                );
                Ok(handle)
            }
            Err(cause) => {
                let error = BuildError::from(cause);
                warn!(
                    error = %error,
                    keeps_previous = state.current.is_some(),
                    "index build failed"
                );
                state.last_error = Some(error.clone());
                Err(error)
            }
        }
    }

    pub fn status(&self) -> IndexStatus {
        let state = self.lock();
        if state.building {
            IndexStatus::Building
        } else if let Some(error) = &state.last_error {
            IndexStatus::Failed(error.clone())
        } else if let Some(handle) = &state.current {
            IndexStatus::Ready(Arc::clone(handle))
        } else {
            IndexStatus::Idle
        }
    }

    pub fn current_handle(&self) -> Result<Arc<IndexHandle>, NotReadyError> {
        self.lock().current.clone().ok_or(NotReadyError)
    }

    pub fn current_generation(&self) -> Option<u64> {
        self.lock().current.as_ref().map(|handle| handle.generation)
    }

    pub fn is_current(&self, handle: &IndexHandle) -> bool {
        self.current_generation() == Some(handle.generation)
    }

    fn begin_build(&self) -> Result<BuildGuard<'_>, BuildError> {
        let mut state = self.lock();
        if state.building {
            return Err(BuildError::AlreadyBuilding);
        }
        state.building = true;
        Ok(BuildGuard { state: &self.state })
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn map_documents(
    snapshot: &Catalog,
    engine_index: &EngineIndex,
) -> Result<HashMap<String, IndexedDocument>, EngineError> {
    if engine_index.document_refs.len() != snapshot.len() {
        return Err(EngineError::BackendResponse {
            backend: "index".to_string(),
            details: format!(
                "engine returned {} document refs for {} documents",
                engine_index.document_refs.len(),
                snapshot.len()
            ),
        });
    }

    let mut documents = HashMap::with_capacity(snapshot.len());
    for (document_ref, document) in engine_index.document_refs.iter().zip(snapshot.documents()) {
        let indexed = IndexedDocument {
            document_id: document.id,
            page_count: document.page_count(),
        };
        if documents.insert(document_ref.clone(), indexed).is_some() {
            return Err(EngineError::BackendResponse {
                backend: "index".to_string(),
                details: format!("duplicate document ref {document_ref}"),
            });
        }
    }
    Ok(documents)
}
