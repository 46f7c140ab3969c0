//! Combines a [SourceInspector](crate::inspector::SourceInspector) and a
//! [Renderer](crate::render::Renderer) into a single step which produces an
//! [Artifact](crate::artifact::Artifact).
//!
//! This step touches no shared state at all. It is used by the miss path of the
//! [DocCache](crate::cache::DocCache) as well as by each refresher. As both collaborators are
//! synchronous (they perform file I/O and CPU bound template work), the async callers use
//! [Fetcher::fetch_and_render_async] which moves the work onto the blocking thread pool.
use std::sync::Arc;

use crate::artifact::Artifact;
use crate::error::DocError;
use crate::inspector::SourceInspector;
use crate::render::Renderer;

/// Fetches the documentation of a namespace and renders it.
#[derive(Clone)]
pub struct Fetcher {
    inspector: Arc<dyn SourceInspector>,
    renderer: Arc<dyn Renderer>,
}

impl Fetcher {
    /// Creates a new fetcher for the given collaborators.
    pub fn new(inspector: Arc<dyn SourceInspector>, renderer: Arc<dyn Renderer>) -> Self {
        Fetcher {
            inspector,
            renderer,
        }
    }

    /// Inspects and renders the given name.
    ///
    /// Any failure of the inspector, as well as a name which doesn't resolve to a package, is
    /// reported as [DocError::Import]. Failures of the renderer are reported as
    /// [DocError::Render].
    pub fn fetch_and_render(&self, name: &str) -> Result<Artifact, DocError> {
        let package = match self.inspector.inspect(name) {
            Ok(Some(package)) if package.is_resolved() => package,
            Ok(_) => {
                return Err(DocError::import(
                    name,
                    anyhow::anyhow!("No documentable sources found"),
                ))
            }
            Err(error) => return Err(DocError::import(name, error)),
        };

        let payload = self
            .renderer
            .render(&package)
            .map_err(|error| DocError::render(name, error))?;

        Ok(Artifact::new(payload))
    }

    /// Runs [fetch_and_render](Fetcher::fetch_and_render) on the blocking thread pool.
    pub async fn fetch_and_render_async(&self, name: &str) -> Result<Artifact, DocError> {
        let fetcher = self.clone();
        let owned_name = name.to_owned();

        match tokio::task::spawn_blocking(move || fetcher.fetch_and_render(&owned_name)).await {
            Ok(result) => result,
            Err(error) => Err(DocError::render(
                name,
                anyhow::anyhow!("Rendering was aborted: {}", error),
            )),
        }
    }
}
