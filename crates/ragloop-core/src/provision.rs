//! On-demand model provisioning.
//!
//! Both the embedding provider and the chat session need a model to be present
//! on their backend before first use. [`ensure_model`] checks the backend's
//! local registry and pulls the model when it is missing, republishing pull
//! progress as [`ProvisionUpdate`]s so callers can report it without polling.

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ProvisionError;
use crate::traits::ModelRegistry;
use crate::types::ModelInfo;

/// Log every n-th pull progress event.
const LOG_EVERY: usize = 100;

/// How to decide that a model is already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelPresence {
    /// A local model whose name contains the requested name (case-insensitive)
    Named,
    /// Any local model at all
    AnyModel,
}

impl ModelPresence {
    fn is_satisfied(self, models: &[ModelInfo], model: &str) -> bool {
        match self {
            Self::Named => {
                let wanted = model.to_lowercase();
                models
                    .iter()
                    .any(|m| m.name.to_lowercase().contains(&wanted))
            }
            Self::AnyModel => !models.is_empty(),
        }
    }
}

/// Progress of a model pull, as published to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisionUpdate {
    pub model: String,
    /// Monotonic non-decreasing percentage
    pub percent: f64,
    pub status: String,
}

/// Outcome of [`ensure_model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    AlreadyPresent,
    Pulled,
}

/// Make sure `model` is available on `registry`, pulling it if needed.
pub async fn ensure_model<R>(
    registry: &R,
    model: &str,
    presence: ModelPresence,
    updates: Option<&broadcast::Sender<ProvisionUpdate>>,
    cancel: &CancellationToken,
) -> Result<Provisioned, ProvisionError>
where
    R: ModelRegistry + ?Sized,
{
    let models = registry.list_local_models(cancel).await?;
    if presence.is_satisfied(&models, model) {
        debug!("Model {} already available ({} local models)", model, models.len());
        return Ok(Provisioned::AlreadyPresent);
    }

    info!("Pulling model {}", model);
    let mut progress = registry.pull_model(model, cancel);
    let mut percent = 0.0_f64;
    let mut events = 0usize;
    let mut succeeded = false;

    while let Some(event) = progress.next().await {
        if cancel.is_cancelled() {
            return Err(ProvisionError::Cancelled);
        }
        let event = event?;
        percent = percent.max(event.percent());
        succeeded |= event.is_success();

        if events % LOG_EVERY == 0 {
            info!("{:.0}% {}", percent, event.status);
        }
        events += 1;

        if let Some(tx) = updates {
            // No subscribers is fine
            let _ = tx.send(ProvisionUpdate {
                model: model.to_string(),
                percent,
                status: event.status,
            });
        }
    }

    if !succeeded {
        warn!("Pull stream for {} ended without a success status", model);
    }
    info!("Model {} pulled ({} progress events)", model, events);
    Ok(Provisioned::Pulled)
}
