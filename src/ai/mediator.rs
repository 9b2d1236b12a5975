//! Assistant mediator - bridges rule results to the external assistant
//!
//! The backend call runs on a worker thread and is abandoned after the
//! configured timeout, so a stuck backend can never hold up a request.

use chrono::Utc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

use crate::ai::cache::{AdvisoryCache, CacheKey};
use crate::ai::client::{AssistantBackend, AssistantConfig, AssistantPrompt};
use crate::ai::guard::ResponseGuard;
use crate::ai::prompt::build_prompt;
use crate::ai::types::{AssistantAdvisory, MetricSnapshot};
use crate::error::{AssistantError, TransportError};
use crate::model::{Observation, Patient, Severity};

/// Where an advisory came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvisorySource {
    Assistant,
    Cache,
}

pub struct AssistantMediator {
    backend: Arc<dyn AssistantBackend>,
    config: AssistantConfig,
    guard: ResponseGuard,
    cache: AdvisoryCache,
}

impl AssistantMediator {
    pub fn new(backend: Arc<dyn AssistantBackend>, config: AssistantConfig) -> Self {
        let guard = ResponseGuard::new(config.max_response_length);
        let cache = AdvisoryCache::new(config.cache_ttl());
        Self {
            backend,
            config,
            guard,
            cache,
        }
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    pub fn cache(&self) -> &AdvisoryCache {
        &self.cache
    }

    /// Produce a validated advisory for a WATCH/URGENT classification
    pub fn advise(
        &self,
        patient: &Patient,
        observations: &[Observation],
        classification: Severity,
        triggered_rules: &[String],
    ) -> Result<AssistantAdvisory, AssistantError> {
        self.advise_with_source(patient, observations, classification, triggered_rules)
            .map(|(advisory, _)| advisory)
    }

    /// Like `advise`, also reporting whether the cache answered
    pub fn advise_with_source(
        &self,
        patient: &Patient,
        observations: &[Observation],
        classification: Severity,
        triggered_rules: &[String],
    ) -> Result<(AssistantAdvisory, AdvisorySource), AssistantError> {
        let snapshot = MetricSnapshot::from_observations(observations);
        let key = CacheKey {
            patient_id: patient.id.clone(),
            classification,
            snapshot: snapshot.rounded(),
        };

        let (advisory, cached) = self.cache.get_or_fetch(key, self.config.timeout(), || {
            let prompt = build_prompt(&snapshot, classification, triggered_rules);
            let raw = self.call_backend(prompt)?;
            let guidance = self.guard.check(&raw)?;
            let caveats = self.guard.caveats(classification, &guidance);
            Ok(AssistantAdvisory {
                classification,
                guidance,
                caveats,
                generated_at: Utc::now(),
            })
        })?;

        let source = if cached {
            AdvisorySource::Cache
        } else {
            AdvisorySource::Assistant
        };
        Ok((advisory, source))
    }

    /// Invoke the backend with a hard deadline
    fn call_backend(&self, prompt: AssistantPrompt) -> Result<String, TransportError> {
        let timeout = self.config.timeout();
        let backend = Arc::clone(&self.backend);
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name("assistant-call".to_string())
            .spawn(move || {
                // receiver may be gone after a timeout
                let _ = tx.send(backend.generate(&prompt, timeout));
            })
            .map_err(|e| TransportError::Http(format!("cannot spawn assistant call: {}", e)))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => {
                if let Err(e) = &result {
                    warn!(error = %e, "Assistant call failed");
                }
                result
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Assistant call timed out");
                Err(TransportError::Timeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Assistant worker exited without a result");
                Err(TransportError::Http("assistant call aborted".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::guard::{NOT_A_DIAGNOSIS, URGENT_CAVEAT};
    use crate::model::{Metric, ObservationValue, Thresholds};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replies with a fixed script and records prompts
    struct ScriptedBackend {
        reply: Result<String, TransportError>,
        delay: Duration,
        calls: AtomicUsize,
        prompts: Mutex<Vec<AssistantPrompt>>,
    }

    impl ScriptedBackend {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing(err: TransportError) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(err),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn slow(text: &str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                delay,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    impl AssistantBackend for ScriptedBackend {
        fn generate(&self, prompt: &AssistantPrompt, _timeout: Duration) -> Result<String, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.clone());
            thread::sleep(self.delay);
            self.reply.clone()
        }
    }

    fn config() -> AssistantConfig {
        AssistantConfig {
            timeout_ms: 200,
            max_response_length: 300,
            ..AssistantConfig::default()
        }
    }

    fn patient() -> Patient {
        Patient::new("p1", "Ada Lovelace", Thresholds::default())
    }

    fn observations(hr: f64) -> Vec<Observation> {
        vec![Observation {
            id: "o1".to_string(),
            patient_id: "p1".to_string(),
            metric: Metric::HeartRate,
            value: ObservationValue::Numeric(hr),
            timestamp: Utc::now(),
            note: None,
        }]
    }

    fn rules() -> Vec<String> {
        vec!["heart_rate_emergency".to_string()]
    }

    #[test]
    fn test_advise_success() {
        let backend = ScriptedBackend::replying("Have them sit down and call their doctor.");
        let mediator = AssistantMediator::new(backend.clone(), config());

        let advisory = mediator
            .advise(&patient(), &observations(130.0), Severity::Urgent, &rules())
            .unwrap();

        assert_eq!(advisory.classification, Severity::Urgent);
        assert_eq!(advisory.guidance, "Have them sit down and call their doctor.");
        assert_eq!(advisory.caveats, vec![NOT_A_DIAGNOSIS, URGENT_CAVEAT]);

        let prompts = backend.prompts.lock().unwrap();
        assert!(prompts[0].user.contains("heart_rate_emergency"));
        assert!(!prompts[0].user.contains("Ada"));
    }

    #[test]
    fn test_timeout_is_unavailable() {
        let backend = ScriptedBackend::slow("too late", Duration::from_secs(2));
        let mediator = AssistantMediator::new(backend, config());

        let start = std::time::Instant::now();
        let err = mediator
            .advise(&patient(), &observations(130.0), Severity::Urgent, &rules())
            .unwrap_err();
        assert!(matches!(err, AssistantError::Unavailable(_)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_transport_error_is_unavailable() {
        let backend = ScriptedBackend::failing(TransportError::Provider {
            status: 529,
            message: "Overloaded".to_string(),
        });
        let mediator = AssistantMediator::new(backend, config());
        let err = mediator
            .advise(&patient(), &observations(130.0), Severity::Urgent, &rules())
            .unwrap_err();
        assert_eq!(
            err,
            AssistantError::Unavailable("assistant provider error (529): Overloaded".to_string())
        );
    }

    #[test]
    fn test_invalid_response_rejected() {
        let mediator = AssistantMediator::new(ScriptedBackend::replying("   "), config());
        assert!(matches!(
            mediator.advise(&patient(), &observations(130.0), Severity::Urgent, &rules()),
            Err(AssistantError::ResponseInvalid(_))
        ));

        let mediator = AssistantMediator::new(
            ScriptedBackend::replying("The patient is having a heart attack."),
            config(),
        );
        assert!(matches!(
            mediator.advise(&patient(), &observations(130.0), Severity::Urgent, &rules()),
            Err(AssistantError::ResponseInvalid(_))
        ));
    }

    #[test]
    fn test_cache_reuses_advisory_for_same_rounded_state() {
        let backend = ScriptedBackend::replying("Keep them resting.");
        let mediator = AssistantMediator::new(backend.clone(), config());

        let (_, first) = mediator
            .advise_with_source(&patient(), &observations(130.2), Severity::Urgent, &rules())
            .unwrap();
        let (_, second) = mediator
            .advise_with_source(&patient(), &observations(129.9), Severity::Urgent, &rules())
            .unwrap();

        assert_eq!(first, AdvisorySource::Assistant);
        assert_eq!(second, AdvisorySource::Cache);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        mediator
            .advise(&patient(), &observations(140.0), Severity::Urgent, &rules())
            .unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_rejected_responses_are_not_cached() {
        let backend = ScriptedBackend::replying("");
        let mediator = AssistantMediator::new(backend.clone(), config());
        for _ in 0..2 {
            assert!(mediator
                .advise(&patient(), &observations(130.0), Severity::Urgent, &rules())
                .is_err());
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert!(mediator.cache().is_empty());
    }
}
