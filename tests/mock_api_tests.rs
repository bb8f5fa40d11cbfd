//! Mock API tests for the HTTP providers
//!
//! Each client is pointed at a local wiremock server, so these tests exercise
//! the real request building and response parsing without hitting real endpoints.

use autodub::audio::{encode_wav, export_wav, AudioBuffer, AudioChunk, TimeRegion};
use autodub::synthesize::{GoogleSynthesizer, Synthesizer, Voice};
use autodub::transcribe::{Transcriber, TranscriptionOrchestrator, WhisperClient};
use autodub::translate::{GeminiTranslator, GoogleTranslator, TranslationBatcher, Translator};
use autodub::DubError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Text-to-Speech Mock Tests
// ============================================================================

mod synthesis_tests {
    use super::*;

    fn voice() -> Voice {
        "es-US-Neural2-B".parse().unwrap()
    }

    fn wav_payload(ms: usize, rate: u32) -> String {
        let frames = ms * rate as usize / 1000;
        let clip = AudioBuffer::new(vec![0.25; frames], rate, 1);
        STANDARD.encode(encode_wav(&clip).unwrap())
    }

    #[tokio::test]
    async fn test_synthesize_decodes_linear16() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text:synthesize"))
            .and(query_param("key", "test-key"))
            .and(body_partial_json(json!({
                "input": { "text": "Hola a todos." },
                "voice": { "languageCode": "es-US", "name": "es-US-Neural2-B" },
                "audioConfig": { "audioEncoding": "LINEAR16" }
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "audioContent": wav_payload(250, 24000) })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let synthesizer = GoogleSynthesizer::new("test-key".to_string()).with_base_url(server.uri());
        let clip = synthesizer.synthesize("Hola a todos.", &voice()).await.unwrap();

        assert_eq!(clip.sample_rate(), 24000);
        assert_eq!(clip.channels(), 1);
        assert_eq!(clip.len_ms(), 250);
    }

    #[tokio::test]
    async fn test_synthesize_requests_track_sample_rate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text:synthesize"))
            .and(body_partial_json(json!({
                "audioConfig": { "audioEncoding": "LINEAR16", "sampleRateHertz": 44100 }
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "audioContent": wav_payload(100, 44100) })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let synthesizer = GoogleSynthesizer::new("test-key".to_string())
            .with_base_url(server.uri())
            .with_sample_rate(44100);
        let clip = synthesizer.synthesize("Hola.", &voice()).await.unwrap();

        assert_eq!(clip.sample_rate(), 44100);
        assert_eq!(clip.len_ms(), 100);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text:synthesize"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": 400, "message": "Voice 'xx-XX-Bad-A' does not exist." }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let synthesizer = GoogleSynthesizer::new("test-key".to_string()).with_base_url(server.uri());
        let voice: Voice = "xx-XX-Bad-A".parse().unwrap();

        match synthesizer.synthesize("Hola.", &voice).await {
            Err(DubError::Synthesis(msg)) => assert!(msg.contains("does not exist")),
            other => panic!("Expected synthesis error, got {:?}", other.map(|c| c.len_ms())),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text:synthesize"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .expect(3)
            .mount(&server)
            .await;

        let synthesizer = GoogleSynthesizer::new("test-key".to_string()).with_base_url(server.uri());
        let result = synthesizer.synthesize("Hola.", &voice()).await;
        assert!(matches!(result, Err(DubError::Synthesis(_))));
    }

    #[tokio::test]
    async fn test_garbage_audio_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text:synthesize"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "audioContent": STANDARD.encode(b"not a wav file") })),
            )
            .mount(&server)
            .await;

        let synthesizer = GoogleSynthesizer::new("test-key".to_string()).with_base_url(server.uri());
        let result = synthesizer.synthesize("Hola.", &voice()).await;
        assert!(matches!(result, Err(DubError::Synthesis(_))));
    }
}

// ============================================================================
// Translation Mock Tests
// ============================================================================

mod translation_tests {
    use super::*;

    fn gemini_reply(text: &str) -> serde_json::Value {
        json!({
            "candidates": [{ "content": { "parts": [{ "text": text }] } }]
        })
    }

    #[tokio::test]
    async fn test_google_translate_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/language/translate/v2"))
            .and(query_param("key", "test-key"))
            .and(body_partial_json(json!({
                "q": ["Good morning.", "Thank you."],
                "source": "en",
                "target": "es"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "translations": [
                    { "translatedText": "Buenos días." },
                    { "translatedText": "Gracias." }
                ] }
            })))
            .mount(&server)
            .await;

        let translator = GoogleTranslator::new("test-key".to_string()).with_base_url(server.uri());
        let out = translator
            .translate_batch(&texts(&["Good morning.", "Thank you."]), "en", "es")
            .await
            .unwrap();

        assert_eq!(out, vec!["Buenos días.", "Gracias."]);
    }

    #[tokio::test]
    async fn test_google_translate_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/language/translate/v2"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": { "code": 403, "message": "API key not valid." }
            })))
            .mount(&server)
            .await;

        let translator = GoogleTranslator::new("bad-key".to_string()).with_base_url(server.uri());
        match translator.translate_batch(&texts(&["Hi."]), "en", "es").await {
            Err(DubError::Translation(msg)) => assert!(msg.contains("API key not valid")),
            other => panic!("Expected translation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_gemini_translate_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/v1beta/models/.+:generateContent$"))
            .and(query_param("key", "test-key"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(gemini_reply("[1] Buenos días.\n[2] Gracias.")),
            )
            .mount(&server)
            .await;

        let translator = GeminiTranslator::new("test-key".to_string()).with_base_url(server.uri());
        let out = translator
            .translate_batch(&texts(&["Good morning.", "Thank you."]), "en", "es")
            .await
            .unwrap();

        assert_eq!(out, vec!["Buenos días.", "Gracias."]);
    }

    #[tokio::test]
    async fn test_gemini_merged_sentences_are_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/v1beta/models/.+:generateContent$"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(gemini_reply("[1] Buenos días, gracias.")),
            )
            .mount(&server)
            .await;

        let translator = GeminiTranslator::new("test-key".to_string()).with_base_url(server.uri());
        let result = translator
            .translate_batch(&texts(&["Good morning.", "Thank you."]), "en", "es")
            .await;

        assert!(matches!(result, Err(DubError::Translation(_))));
    }

    #[tokio::test]
    async fn test_batcher_falls_back_to_google() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/v1beta/models/.+:generateContent$"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/language/translate/v2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "translations": [{ "translatedText": "Hola." }] }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let batcher = TranslationBatcher::new(Box::new(
            GeminiTranslator::new("gemini-key".to_string()).with_base_url(server.uri()),
        ))
        .with_fallback(Box::new(
            GoogleTranslator::new("google-key".to_string()).with_base_url(server.uri()),
        ));

        let out = batcher.translate(&texts(&["Hello."]), "en", "es").await.unwrap();
        assert_eq!(out, vec!["Hola."]);
    }
}

// ============================================================================
// Whisper Mock Tests
// ============================================================================

mod whisper_tests {
    use super::*;

    fn write_chunk(dir: &Path, name: &str, index: usize, start_secs: u64) -> AudioChunk {
        let path = dir.join(name);
        export_wav(&AudioBuffer::new(vec![0.0; 1600], 16000, 1), &path).unwrap();
        AudioChunk {
            region: TimeRegion {
                start: Duration::from_secs(start_secs),
                end: Duration::from_secs(start_secs + 5),
            },
            path,
            index,
        }
    }

    fn verbose_json() -> serde_json::Value {
        json!({
            "language": "english",
            "segments": [{ "start": 0.0, "end": 1.0, "text": " Hello world." }],
            "words": [
                { "word": "Hello", "start": 0.0, "end": 0.4 },
                { "word": "world", "start": 0.5, "end": 1.0 }
            ]
        })
    }

    #[tokio::test]
    async fn test_whisper_word_timestamps() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(verbose_json()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let chunk = write_chunk(dir.path(), "chunk_0.wav", 0, 5);
        let client = WhisperClient::new("test-key".to_string()).with_base_url(server.uri());

        let transcript = client.transcribe(&chunk).await.unwrap();
        assert_eq!(transcript.language.as_deref(), Some("english"));
        assert_eq!(transcript.segments.len(), 1);

        let segment = &transcript.segments[0];
        assert_eq!(segment.text, "Hello world.");
        assert_eq!(segment.start, 5.0);
        assert_eq!(segment.words.len(), 2);
        assert_eq!(segment.words[1].text, "world.");
        assert_eq!(segment.words[1].end, 6.0);
    }

    #[tokio::test]
    async fn test_whisper_client_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "message": "Incorrect API key provided", "type": "invalid_request_error" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let chunk = write_chunk(dir.path(), "chunk_0.wav", 0, 0);
        let client = WhisperClient::new("bad-key".to_string()).with_base_url(server.uri());

        match client.transcribe(&chunk).await {
            Err(DubError::Transcription(msg)) => assert!(msg.contains("Incorrect API key")),
            other => panic!("Expected transcription error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_whisper_handles_missing_file() {
        let client = WhisperClient::new("test-key".to_string());
        let chunk = AudioChunk {
            region: TimeRegion {
                start: Duration::ZERO,
                end: Duration::from_secs(5),
            },
            path: "/tmp/nonexistent_autodub_chunk.wav".into(),
            index: 0,
        };

        assert!(client.transcribe(&chunk).await.is_err());
    }

    #[tokio::test]
    async fn test_orchestrator_stitches_chunks_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(verbose_json()))
            .expect(2)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let chunks = vec![
            write_chunk(dir.path(), "chunk_0.wav", 0, 0),
            write_chunk(dir.path(), "chunk_1.wav", 1, 600),
        ];
        let client = WhisperClient::new("test-key".to_string()).with_base_url(server.uri());
        let orchestrator = TranscriptionOrchestrator::new(Box::new(client), 2).with_progress(false);

        let (transcript, stats) = orchestrator.process_chunks(chunks).await.unwrap();
        assert_eq!(stats.total_chunks, 2);
        assert_eq!(transcript.segments.len(), 2);
        assert_eq!(transcript.segments[0].start, 0.0);
        assert_eq!(transcript.segments[1].start, 600.0);
    }
}
