pub mod gemini;
pub mod google;

pub use gemini::GeminiTranslator;
pub use google::GoogleTranslator;

use crate::config::Config;
use crate::error::{DubError, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sentences per provider request.
pub const BATCH_SIZE: usize = 128;

#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `texts` from `source` to `target` (ISO 639-1 codes).
    ///
    /// Implementations return exactly one translation per input, in order,
    /// or an error.
    async fn translate_batch(&self, texts: &[String], source: &str, target: &str)
        -> Result<Vec<String>>;
    fn name(&self) -> &'static str;
}

/// Splits sentences into bounded batches and translates them with a
/// primary provider, retrying a failed batch once on the fallback.
pub struct TranslationBatcher {
    primary: Arc<dyn Translator>,
    fallback: Option<Arc<dyn Translator>>,
    batch_size: usize,
    concurrency: usize,
}

impl TranslationBatcher {
    pub fn new(primary: Box<dyn Translator>) -> Self {
        Self {
            primary: Arc::from(primary),
            fallback: None,
            batch_size: BATCH_SIZE,
            concurrency: 1,
        }
    }

    pub fn with_fallback(mut self, fallback: Box<dyn Translator>) -> Self {
        self.fallback = Some(Arc::from(fallback));
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Number of batches in flight at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Pick providers from the configured credentials.
    ///
    /// Gemini is primary when its key is present, with Google Translate as
    /// fallback; Google Translate alone is used otherwise.
    pub fn from_config(config: &Config) -> Result<Self> {
        let gemini = config.gemini_api_key.clone();
        let google = config.google_api_key.clone();

        let batcher = match (gemini, google) {
            (Some(gemini_key), Some(google_key)) => {
                Self::new(Box::new(GeminiTranslator::new(gemini_key)))
                    .with_fallback(Box::new(GoogleTranslator::new(google_key)))
            }
            (Some(gemini_key), None) => Self::new(Box::new(GeminiTranslator::new(gemini_key))),
            (None, Some(google_key)) => Self::new(Box::new(GoogleTranslator::new(google_key))),
            (None, None) => {
                return Err(DubError::Translation(
                    "No translation provider configured. Set GEMINI_API_KEY or GOOGLE_API_KEY"
                        .to_string(),
                ))
            }
        };

        Ok(batcher.with_concurrency(config.concurrency))
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        let mut names = vec![self.primary.name()];
        if let Some(ref fallback) = self.fallback {
            names.push(fallback.name());
        }
        names
    }

    /// Translate all sentences, preserving count and order.
    ///
    /// Fails as a unit: if any batch cannot be translated by either
    /// provider, no translations are returned.
    pub async fn translate(&self, sentences: &[String], source: &str, target: &str) -> Result<Vec<String>> {
        if sentences.is_empty() {
            return Ok(Vec::new());
        }

        let batches: Vec<&[String]> = sentences.chunks(self.batch_size).collect();
        info!(
            "Translating {} sentences in {} batch(es) ({} -> {})",
            sentences.len(),
            batches.len(),
            source,
            target
        );

        let translated: Vec<Vec<String>> = stream::iter(batches.into_iter().enumerate())
            .map(|(index, batch)| self.translate_with_fallback(index, batch, source, target))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let translations: Vec<String> = translated.into_iter().flatten().collect();
        if translations.len() != sentences.len() {
            return Err(DubError::Translation(format!(
                "Expected {} translations, got {}",
                sentences.len(),
                translations.len()
            )));
        }

        Ok(translations)
    }

    async fn translate_with_fallback(
        &self,
        index: usize,
        batch: &[String],
        source: &str,
        target: &str,
    ) -> Result<Vec<String>> {
        debug!("Batch {}: {} sentences via {}", index, batch.len(), self.primary.name());

        let primary_error = match run_batch(self.primary.as_ref(), index, batch, source, target).await {
            Ok(translations) => return Ok(translations),
            Err(e) => e,
        };

        let Some(ref fallback) = self.fallback else {
            return Err(primary_error);
        };

        warn!(
            "Batch {}: {} failed ({}), falling back to {}",
            index,
            self.primary.name(),
            primary_error,
            fallback.name()
        );

        run_batch(fallback.as_ref(), index, batch, source, target)
            .await
            .map_err(|e| {
                DubError::Translation(format!(
                    "both providers failed for batch {index}: {primary_error}; {e}"
                ))
            })
    }
}

/// Call one provider and enforce the one-translation-per-sentence contract.
async fn run_batch(
    translator: &dyn Translator,
    index: usize,
    batch: &[String],
    source: &str,
    target: &str,
) -> Result<Vec<String>> {
    let translations = translator
        .translate_batch(batch, source, target)
        .await
        .map_err(|e| match e {
            DubError::Translation(_) => e,
            other => DubError::Translation(format!("{}: {}", translator.name(), other)),
        })?;

    if translations.len() != batch.len() {
        return Err(DubError::Translation(format!(
            "{} returned {} translations for batch {} of {} sentences",
            translator.name(),
            translations.len(),
            index,
            batch.len()
        )));
    }

    Ok(translations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Upper-cases its input; optionally drops one result or fails outright.
    struct MockTranslator {
        name: &'static str,
        drop_one: bool,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    impl MockTranslator {
        fn working(name: &'static str) -> Self {
            Self {
                name,
                drop_one: false,
                fail: false,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Translator for MockTranslator {
        async fn translate_batch(&self, texts: &[String], _source: &str, target: &str) -> Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DubError::Translation("quota exceeded".to_string()));
            }
            let mut out: Vec<String> = texts.iter().map(|t| format!("{target}:{t}")).collect();
            if self.drop_one {
                out.pop();
            }
            Ok(out)
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    fn sentences(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("sentence {i}")).collect()
    }

    #[tokio::test]
    async fn test_empty_input() {
        let batcher = TranslationBatcher::new(Box::new(MockTranslator::working("a")));
        let out = batcher.translate(&[], "en", "es").await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_multi_batch_preserves_order() {
        let primary = MockTranslator::working("a");
        let calls = primary.calls.clone();
        let batcher = TranslationBatcher::new(Box::new(primary)).with_concurrency(3);

        let input = sentences(300);
        let out = batcher.translate(&input, "en", "es").await.unwrap();

        assert_eq!(out.len(), 300);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        for (i, t) in out.iter().enumerate() {
            assert_eq!(t, &format!("es:sentence {i}"));
        }
    }

    #[tokio::test]
    async fn test_count_mismatch_uses_fallback() {
        let primary = MockTranslator {
            drop_one: true,
            ..MockTranslator::working("a")
        };
        let fallback = MockTranslator::working("b");
        let fallback_calls = fallback.calls.clone();

        let batcher = TranslationBatcher::new(Box::new(primary)).with_fallback(Box::new(fallback));
        let out = batcher.translate(&sentences(5), "en", "de").await.unwrap();

        assert_eq!(out.len(), 5);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mismatch_without_fallback_fails() {
        let primary = MockTranslator {
            drop_one: true,
            ..MockTranslator::working("a")
        };
        let batcher = TranslationBatcher::new(Box::new(primary));

        let result = batcher.translate(&sentences(128), "en", "es").await;
        assert!(matches!(result, Err(DubError::Translation(_))));
    }

    #[tokio::test]
    async fn test_both_providers_fail() {
        let primary = MockTranslator {
            fail: true,
            ..MockTranslator::working("a")
        };
        let fallback = MockTranslator {
            drop_one: true,
            ..MockTranslator::working("b")
        };
        let batcher = TranslationBatcher::new(Box::new(primary)).with_fallback(Box::new(fallback));

        match batcher.translate(&sentences(10), "en", "es").await {
            Err(DubError::Translation(msg)) => assert!(msg.contains("both providers failed")),
            other => panic!("Expected translation error, got {:?}", other),
        }
    }

    #[test]
    fn test_from_config_selects_providers() {
        let mut config = Config::default();
        assert!(TranslationBatcher::from_config(&config).is_err());

        config.google_api_key = Some("google".to_string());
        let batcher = TranslationBatcher::from_config(&config).unwrap();
        assert_eq!(batcher.provider_names(), vec!["Google Translate"]);

        config.gemini_api_key = Some("gemini".to_string());
        let batcher = TranslationBatcher::from_config(&config).unwrap();
        assert_eq!(batcher.provider_names(), vec!["Gemini", "Google Translate"]);
    }
}
