//! Router / Dispatcher
//!
//! Static intent -> handler mapping, validated once at startup: every
//! declared intent must have exactly one handler.

use crate::error::AssistantError;
use crate::handlers::Handler;
use crate::models::IntentKind;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub type HandlerRef = Arc<dyn Handler>;

pub struct Router {
    routes: HashMap<IntentKind, HandlerRef>,
}

impl Router {
    pub fn new(handlers: Vec<HandlerRef>) -> Result<Self> {
        let mut routes = HashMap::with_capacity(handlers.len());

        for handler in handlers {
            let kind = handler.kind();
            if routes.insert(kind, handler).is_some() {
                return Err(AssistantError::UnroutableIntent(format!(
                    "more than one handler registered for {}",
                    kind
                )));
            }
        }

        let missing: Vec<&str> = IntentKind::ALL
            .iter()
            .filter(|kind| !routes.contains_key(*kind))
            .map(|kind| kind.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(AssistantError::UnroutableIntent(format!(
                "no handler registered for {}",
                missing.join(", ")
            )));
        }

        info!(routes = routes.len(), "Router validated");
        Ok(Self { routes })
    }

    pub fn route(&self, intent: IntentKind) -> Result<HandlerRef> {
        self.routes
            .get(&intent)
            .cloned()
            .ok_or_else(|| AssistantError::UnroutableIntent(intent.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{HandlerOutcome, HandlerRequest};
    use crate::rag::ContextBlock;
    use async_trait::async_trait;

    struct Stub(IntentKind);

    #[async_trait]
    impl Handler for Stub {
        fn kind(&self) -> IntentKind {
            self.0
        }

        async fn handle(
            &self,
            _request: &HandlerRequest<'_>,
            _context: &ContextBlock,
        ) -> Result<HandlerOutcome> {
            Ok(HandlerOutcome::text(self.0.as_str()))
        }
    }

    fn all_stubs() -> Vec<HandlerRef> {
        IntentKind::ALL
            .iter()
            .map(|k| Arc::new(Stub(*k)) as HandlerRef)
            .collect()
    }

    #[test]
    fn test_complete_mapping_routes_every_intent() {
        let router = Router::new(all_stubs()).unwrap();
        for kind in IntentKind::ALL {
            assert_eq!(router.route(kind).unwrap().kind(), kind);
        }
    }

    #[test]
    fn test_missing_handler_is_rejected() {
        let mut handlers = all_stubs();
        handlers.retain(|h| h.kind() != IntentKind::Tax);

        let err = Router::new(handlers).err().unwrap();
        assert!(matches!(err, AssistantError::UnroutableIntent(ref msg) if msg.contains("tax")));
    }

    #[test]
    fn test_duplicate_handler_is_rejected() {
        let mut handlers = all_stubs();
        handlers.push(Arc::new(Stub(IntentKind::News)));
        assert!(matches!(
            Router::new(handlers),
            Err(AssistantError::UnroutableIntent(_))
        ));
    }
}
