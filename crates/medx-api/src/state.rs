//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor. Every component is behind an `Arc`; cloning
//! the state is cheap.
//!
//! [`AppState::build`] wires the collaborators from configuration:
//!
//! | Collaborator        | Configured                      | Otherwise                   |
//! |---------------------|---------------------------------|-----------------------------|
//! | Tier 2 classifier   | `HttpLanguageModel`             | none (escalation degrades)  |
//! | Signing service     | `DerivedKeySigner` from seed    | ephemeral seed, with a warning |
//! | Notification channel| `HttpNotificationChannel`       | `LoggingNotifier`           |
//! | Organ network       | `WaitlistRegistry` from config  |                             |
//! | PHI blob store      | `InMemoryBlobStore`             |                             |
//!
//! Hospital alerts, organ offers, data releases and EHR updates share the
//! one notification channel.

use std::sync::Arc;

use medx_core::{Clock, SystemClock};
use medx_crypto::DerivedKeySigner;
use medx_emergency::EmergencyResolver;
use medx_executor::{
    ExecutionEngine, HttpNotificationChannel, LoggingNotifier, NotificationChannel,
    PseudonymizingAnonymizer, WaitlistRegistry,
};
use medx_extract::{DirectiveExtractor, HttpLanguageModel};
use medx_store::{DirectiveStore, InMemoryBlobStore, PhiBlobStore};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::{AppConfig, ConfigError, NotifierMode};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<DirectiveStore>,
    pub blobs: Arc<dyn PhiBlobStore>,
    pub extractor: Arc<DirectiveExtractor>,
    pub resolver: Arc<EmergencyResolver>,
    pub engine: Arc<ExecutionEngine>,
    pub signer: Arc<DerivedKeySigner>,
    /// Prometheus render handle. `None` when no recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire every component from `config` against the system clock.
    pub fn build(config: AppConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// As [`build`](Self::build), with an explicit clock.
    pub fn with_clock(config: AppConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        let store = Arc::new(DirectiveStore::new(config.retention_table()?, clock));
        let blobs: Arc<dyn PhiBlobStore> = Arc::new(InMemoryBlobStore::new());

        let mut extractor = DirectiveExtractor::new(config.extractor.clone()).map_err(|e| {
            ConfigError::Component {
                component: "extractor",
                reason: e.to_string(),
            }
        })?;
        if let Some(endpoint) = &config.nlp_endpoint {
            let model = HttpLanguageModel::new(endpoint.clone(), config.extractor.escalation_timeout())
                .map_err(|e| ConfigError::Component {
                    component: "nlp",
                    reason: e.to_string(),
                })?;
            tracing::info!(endpoint = %endpoint, "tier 2 language model configured");
            extractor = extractor.with_tier2(Arc::new(model));
        }

        let signer = match &config.signing_seed {
            Some(seed) => DerivedKeySigner::from_hex_seed(seed).map_err(|e| {
                ConfigError::Component {
                    component: "signing",
                    reason: e.to_string(),
                }
            })?,
            None => {
                tracing::warn!("MEDX_SIGNING_SEED not set; using an ephemeral signing seed");
                DerivedKeySigner::ephemeral()
            }
        };
        let signer = Arc::new(signer);

        let notifier: Arc<dyn NotificationChannel> = match config.notifier {
            NotifierMode::Http => Arc::new(
                HttpNotificationChannel::new(config.execution.notification_timeout()).map_err(
                    |e| ConfigError::Component {
                        component: "notifier",
                        reason: e.to_string(),
                    },
                )?,
            ),
            NotifierMode::Logging => Arc::new(LoggingNotifier::new()),
        };
        let resolver = EmergencyResolver::new(
            Arc::clone(&store),
            Arc::clone(&signer) as Arc<dyn medx_crypto::SigningService>,
            config.emergency.clone(),
        )
        .with_alerts(Arc::clone(&notifier));
        let engine = ExecutionEngine::new(
            Arc::clone(&store),
            Arc::new(WaitlistRegistry::new(config.execution.waitlist.clone())),
            notifier,
            Arc::new(PseudonymizingAnonymizer::new(
                config.execution.anonymization_salt.clone(),
            )),
            config.execution.clone(),
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            blobs,
            extractor: Arc::new(extractor),
            resolver: Arc::new(resolver),
            engine: Arc::new(engine),
            signer,
            metrics: None,
        })
    }

    /// Attach the Prometheus handle served at `/metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("patients", &self.store.patient_count())
            .field("executions", &self.engine.execution_count())
            .finish_non_exhaustive()
    }
}
