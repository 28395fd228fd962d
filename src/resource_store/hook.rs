/// Derived-state hook dispatch
///
/// After every committed mutation the store notifies the rest of the system
/// that a project's resource set changed. Notification is fire-and-forget:
/// the hook runs on a detached task, and its failures are logged and dropped.
use crate::{error::VaultResult, metrics};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Receiver of "resources changed" notifications
///
/// Implementations must recompute from current state on every call: the
/// store neither deduplicates nor orders invocations.
#[async_trait]
pub trait ResourceChangeHook: Send + Sync {
    async fn on_resources_changed(&self, project_id: &str) -> VaultResult<()>;
}

/// Hook that does nothing
pub struct NoopHook;

#[async_trait]
impl ResourceChangeHook for NoopHook {
    async fn on_resources_changed(&self, _project_id: &str) -> VaultResult<()> {
        Ok(())
    }
}

/// What happened to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Saved,
    Updated,
    Deleted,
    Cleared,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Saved => "saved",
            ChangeKind::Updated => "updated",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Cleared => "cleared",
        }
    }
}

/// Event published on the in-process bus after each commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEvent {
    pub project_id: String,
    /// `None` for bulk clears
    pub resource_id: Option<String>,
    pub kind: ChangeKind,
}

/// Fans a committed change out to the hook and to bus subscribers
#[derive(Clone)]
pub struct ChangeNotifier {
    hook: Arc<dyn ResourceChangeHook>,
    events: broadcast::Sender<ResourceEvent>,
}

impl ChangeNotifier {
    pub fn new(hook: Arc<dyn ResourceChangeHook>, buffer_size: usize) -> Self {
        let (events, _) = broadcast::channel(buffer_size.max(1));
        Self { hook, events }
    }

    pub fn set_hook(&mut self, hook: Arc<dyn ResourceChangeHook>) {
        self.hook = hook;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ResourceEvent> {
        self.events.subscribe()
    }

    /// Publish the event and start the hook without waiting for it
    ///
    /// Must be called only after the triggering transaction has committed.
    pub fn notify(&self, event: ResourceEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event.clone());

        let hook = Arc::clone(&self.hook);
        tokio::spawn(async move {
            match hook.on_resources_changed(&event.project_id).await {
                Ok(()) => {
                    tracing::debug!(
                        "Resource hook completed for project {} ({})",
                        event.project_id,
                        event.kind.as_str()
                    );
                }
                Err(e) => {
                    metrics::HOOK_FAILURES_TOTAL.inc();
                    tracing::error!(
                        "Resource hook failed for project {}: {}",
                        event.project_id,
                        e
                    );
                }
            }
        });
    }
}
