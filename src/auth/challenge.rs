//! # Image challenge solving.
//!
//! [`ChallengeSolver`] captures the challenge image from a [`ChallengeSource`],
//! asks a [`ChallengeClassifier`] for its text and keeps only answers made of
//! exactly `expected_len` digits.
//!
//! ```text
//! attempt 1..=max_attempts
//!   no classifier ─► Err(ClassifierUnavailable)          (nothing captured)
//!   capture()     ─► Err ─► Err(Acquisition)
//!   classify ─► digits only ─► len == expected ─► Ok(text)
//!                                  └─ otherwise ─► ChallengeRejected
//!                                                  refresh() (fault ignored)
//!                                                  sleep(refresh_pause) unless last
//! exhausted ─► Err(Exhausted)
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time;

use crate::{
    core::{ChallengeSettings, Config},
    error::{ChallengeError, PageError},
    events::{Bus, Event, EventKind},
};

/// Turns a challenge image into text. May return anything, including noise.
pub trait ChallengeClassifier: Send + Sync + 'static {
    /// Classifies raw image bytes.
    fn classify(&self, image: &[u8]) -> String;
}

impl<F> ChallengeClassifier for F
where
    F: Fn(&[u8]) -> String + Send + Sync + 'static,
{
    fn classify(&self, image: &[u8]) -> String {
        self(image)
    }
}

/// Where challenge images come from.
#[async_trait]
pub trait ChallengeSource: Send + Sync {
    /// Returns the current challenge image.
    async fn capture(&self) -> Result<Vec<u8>, PageError>;

    /// Asks for a new challenge.
    async fn refresh(&self) -> Result<(), PageError>;
}

/// Validated classification of one challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeResult {
    /// Classifier output reduced to ASCII digits.
    pub text: String,
    /// `true` iff `text` has exactly the expected length.
    pub valid: bool,
}

/// Capture, classify, validate, refresh on mismatch.
#[derive(Clone)]
pub struct ChallengeSolver {
    classifier: Option<Arc<dyn ChallengeClassifier>>,
    settings: ChallengeSettings,
    bus: Bus,
}

impl ChallengeSolver {
    /// Creates a solver; `classifier = None` makes every `solve` fail fast.
    pub fn new(classifier: Option<Arc<dyn ChallengeClassifier>>, settings: ChallengeSettings) -> Self {
        Self {
            classifier,
            settings: ChallengeSettings {
                max_attempts: settings.max_attempts.max(1),
                ..settings
            },
            bus: Bus::new(16),
        }
    }

    /// Publishes challenge events on `bus`.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = bus;
        self
    }

    /// Creates a solver bounded by `cfg.challenge`, publishing on `bus`.
    pub fn from_config(
        cfg: &Config,
        classifier: Option<Arc<dyn ChallengeClassifier>>,
        bus: Bus,
    ) -> Self {
        Self::new(classifier, cfg.challenge).with_bus(bus)
    }

    /// Applies the validation rule to raw classifier output.
    pub fn check(&self, raw: &str) -> ChallengeResult {
        let text: String = raw.chars().filter(char::is_ascii_digit).collect();
        let valid = text.len() == self.settings.expected_len;
        ChallengeResult { text, valid }
    }

    /// Solves the challenge currently shown by `source`.
    pub async fn solve(&self, source: &dyn ChallengeSource) -> Result<String, ChallengeError> {
        let Some(classifier) = self.classifier.as_deref() else {
            self.bus.publish(
                Event::new(EventKind::ChallengeUnavailable)
                    .with_reason(ChallengeError::ClassifierUnavailable.to_string()),
            );
            return Err(ChallengeError::ClassifierUnavailable);
        };

        for attempt in 1..=self.settings.max_attempts {
            let image = source.capture().await.map_err(ChallengeError::Acquisition)?;
            let raw = classifier.classify(&image);
            let result = self.check(&raw);

            if result.valid {
                self.bus
                    .publish(Event::new(EventKind::ChallengeAccepted).with_attempt(attempt));
                return Ok(result.text);
            }

            self.bus.publish(
                Event::new(EventKind::ChallengeRejected)
                    .with_attempt(attempt)
                    .with_reason(format!("raw {raw:?}, digits {:?}", result.text)),
            );
            if let Err(e) = source.refresh().await {
                tracing::debug!(error = %e, "challenge refresh failed");
            }
            if attempt < self.settings.max_attempts {
                time::sleep(self.settings.refresh_pause).await;
            }
        }

        Err(ChallengeError::Exhausted {
            attempts: self.settings.max_attempts,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Source whose refreshes and captures are counted.
    #[derive(Default)]
    pub(crate) struct FakeSource {
        pub captures: AtomicU32,
        pub refreshes: AtomicU32,
        pub broken: bool,
    }

    #[async_trait]
    impl ChallengeSource for FakeSource {
        async fn capture(&self) -> Result<Vec<u8>, PageError> {
            let n = self.captures.fetch_add(1, Ordering::SeqCst);
            if self.broken {
                return Err(PageError::Element {
                    selector: "div.captcha-image img".into(),
                    reason: "not found".into(),
                });
            }
            Ok(vec![n as u8])
        }

        async fn refresh(&self) -> Result<(), PageError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Err(PageError::Other("click intercepted".into()))
        }
    }

    /// Classifier replaying scripted answers, then repeating the last one.
    pub(crate) struct Script(pub Mutex<Vec<&'static str>>);

    impl ChallengeClassifier for Script {
        fn classify(&self, _image: &[u8]) -> String {
            let mut answers = self.0.lock().expect("lock");
            if answers.len() > 1 {
                answers.remove(0).to_string()
            } else {
                answers.first().copied().unwrap_or_default().to_string()
            }
        }
    }

    fn solver(answers: Vec<&'static str>) -> ChallengeSolver {
        ChallengeSolver::new(
            Some(Arc::new(Script(Mutex::new(answers))) as Arc<dyn ChallengeClassifier>),
            ChallengeSettings::default(),
        )
    }

    #[test]
    fn check_keeps_digits_and_requires_exact_length() {
        let s = solver(vec![]);
        assert_eq!(
            s.check("1a2b 3c4"),
            ChallengeResult {
                text: "1234".into(),
                valid: true
            }
        );
        assert!(!s.check("123").valid);
        assert!(!s.check("12345").valid);
        assert!(!s.check("١٢٣٤").valid);
    }

    #[tokio::test(start_paused = true)]
    async fn valid_first_read_needs_no_refresh() {
        let source = FakeSource::default();
        let s = solver(vec!["0815"]);

        assert_eq!(s.solve(&source).await, Ok("0815".to_string()));
        assert_eq!(source.captures.load(Ordering::SeqCst), 1);
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_once_per_rejection() {
        let source = FakeSource::default();
        let s = solver(vec!["12", "12a34"]);

        let started = time::Instant::now();
        assert_eq!(s.solve(&source).await, Ok("1234".to_string()));
        assert_eq!(source.captures.load(Ordering::SeqCst), 2);
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let source = FakeSource::default();
        let s = solver(vec!["x"]);

        let started = time::Instant::now();
        assert_eq!(
            s.solve(&source).await,
            Err(ChallengeError::Exhausted { attempts: 3 })
        );
        assert_eq!(source.captures.load(Ordering::SeqCst), 3);
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 3);
        // no pause after the last rejection
        assert_eq!(started.elapsed(), Duration::from_millis(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn configured_attempt_count_bounds_the_solver() {
        let cfg = Config::from_lookup(|k| {
            (k == "SHIFTVISOR_CHALLENGE_ATTEMPTS").then(|| "5".to_string())
        });
        let source = FakeSource::default();
        let s = ChallengeSolver::from_config(
            &cfg,
            Some(Arc::new(Script(Mutex::new(vec!["x"]))) as Arc<dyn ChallengeClassifier>),
            Bus::new(16),
        );

        assert_eq!(
            s.solve(&source).await,
            Err(ChallengeError::Exhausted { attempts: 5 })
        );
        assert_eq!(source.captures.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn missing_classifier_touches_nothing() {
        let source = FakeSource::default();
        let s = ChallengeSolver::new(None, ChallengeSettings::default());

        assert_eq!(s.solve(&source).await, Err(ChallengeError::ClassifierUnavailable));
        assert_eq!(source.captures.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn capture_fault_is_not_retried() {
        let source = FakeSource {
            broken: true,
            ..FakeSource::default()
        };
        let s = solver(vec!["1234"]);

        assert!(matches!(
            s.solve(&source).await,
            Err(ChallengeError::Acquisition(PageError::Element { .. }))
        ));
        assert_eq!(source.captures.load(Ordering::SeqCst), 1);
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn closures_are_classifiers() {
        let c: Arc<dyn ChallengeClassifier> = Arc::new(|_: &[u8]| "0420".to_string());
        assert_eq!(c.classify(&[]), "0420");
    }
}
