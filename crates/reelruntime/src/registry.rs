use async_trait::async_trait;
use parking_lot::RwLock;
use reelcore::{NodeContext, NodeError, Processor, ProcessorMetadata, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Adapts an async closure into a [`Processor`].
pub struct FnProcessor<F> {
    func: F,
    metadata: ProcessorMetadata,
}

impl<F> FnProcessor<F> {
    pub fn new(func: F) -> Self {
        Self {
            func,
            metadata: ProcessorMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: ProcessorMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

#[async_trait]
impl<F, Fut> Processor for FnProcessor<F>
where
    F: Fn(NodeContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, NodeError>> + Send + 'static,
{
    async fn process(&self, ctx: NodeContext) -> Result<Value, NodeError> {
        (self.func)(ctx).await
    }

    fn metadata(&self) -> ProcessorMetadata {
        self.metadata.clone()
    }
}

/// Registry of available node types.
///
/// Registration may happen at any time, including while runs execute; a
/// node looks up its processor when it starts.
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: RwLock<HashMap<String, Arc<dyn Processor>>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor, replacing any previous one for `node_type`.
    pub fn register(&self, node_type: impl Into<String>, processor: Arc<dyn Processor>) {
        let node_type = node_type.into();
        tracing::info!("Registering node type: {}", node_type);
        self.processors.write().insert(node_type, processor);
    }

    pub fn register_fn<F, Fut>(&self, node_type: impl Into<String>, func: F)
    where
        F: Fn(NodeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, NodeError>> + Send + 'static,
    {
        self.register(node_type, Arc::new(FnProcessor::new(func)));
    }

    pub fn get(&self, node_type: &str) -> Option<Arc<dyn Processor>> {
        self.processors.read().get(node_type).cloned()
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.processors.read().contains_key(node_type)
    }

    /// Get all registered node types, sorted
    pub fn list_node_types(&self) -> Vec<String> {
        let mut types: Vec<_> = self.processors.read().keys().cloned().collect();
        types.sort();
        types
    }

    pub fn get_metadata(&self, node_type: &str) -> Option<ProcessorMetadata> {
        self.get(node_type).map(|p| p.metadata())
    }
}
