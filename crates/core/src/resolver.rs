use crate::error::{PartialResolutionWarning, UnresolvedHit, UnresolvedReason};
use crate::models::{Catalog, PresentableResult, QueryHit};
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub results: Vec<PresentableResult>,
    pub warning: Option<PartialResolutionWarning>,
}

impl Resolution {
    pub fn is_partial(&self) -> bool {
        self.warning.is_some()
    }
}

/// Turns hits into presentable results, looking documents up by id.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultResolver;

impl ResultResolver {
    pub fn resolve(&self, hits: &[QueryHit], catalog: &Catalog) -> Resolution {
        if let Some(hit) = hits
            .iter()
            .find(|hit| hit.catalog_version != catalog.version())
        {
            warn!(
                hits_version = hit.catalog_version,
                catalog_version = catalog.version(),
                "resolving hits against a newer catalog"
            );
        }

        let mut results = Vec::with_capacity(hits.len());
        let mut unresolved = Vec::new();

        for hit in hits {
            let Some(document) = catalog.get(&hit.document_id) else {
                unresolved.push(UnresolvedHit {
                    document_id: hit.document_id,
                    page_number: hit.page_number,
                    reason: UnresolvedReason::MissingDocument,
                });
                continue;
            };

            let Some(page_image) = document.page(hit.page_number) else {
                unresolved.push(UnresolvedHit {
                    document_id: hit.document_id,
                    page_number: hit.page_number,
                    reason: UnresolvedReason::MissingPage,
                });
                continue;
            };

            results.push(PresentableResult {
                document: document.clone(),
                page_number: hit.page_number,
                score: hit.score,
                page_image: page_image.clone(),
                thumbnail: hit.thumbnail.clone(),
            });
        }

        let warning = (!unresolved.is_empty()).then(|| PartialResolutionWarning {
            catalog_version: catalog.version(),
            total: hits.len(),
            unresolved,
        });
        if let Some(warning) = &warning {
            warn!(%warning, "partial resolution");
        }

        Resolution { results, warning }
    }
}
