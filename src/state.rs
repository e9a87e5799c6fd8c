use crate::collaborators::LocalContent;
use crate::content::ContentRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ContentRegistry>,
}

impl AppState {
    pub fn new(registry: ContentRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn local_content(&self) -> LocalContent {
        LocalContent::new(self.registry.clone())
    }
}
