//! Fakes and fixtures shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use manual_assist::config::Config;
use manual_assist::embedding::Embedder;
use manual_assist::error::PipelineError;
use manual_assist::generation::Generator;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Word stems recognised by [`VocabEmbedder`]; one dimension each plus a
/// constant bias dimension so no text maps to the zero vector.
const VOCAB: &[&str] = &[
    "replac", "part", "x", "fuel", "injector", "brake", "torque", "procedure",
];

/// Deterministic bag-of-stems embedder that counts its calls.
#[derive(Default)]
pub struct VocabEmbedder {
    calls: AtomicUsize,
}

impl VocabEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for VocabEmbedder {
    fn model_name(&self) -> &str {
        "vocab-test"
    }

    fn dims(&self) -> usize {
        VOCAB.len() + 1
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut v = vec![0.0f32; VOCAB.len() + 1];
        v[VOCAB.len()] = 1.0;
        for word in text.split_whitespace() {
            let word = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if word.is_empty() {
                continue;
            }
            for (i, stem) in VOCAB.iter().enumerate() {
                let hit = if stem.len() == 1 {
                    word == *stem
                } else {
                    word.starts_with(stem)
                };
                if hit {
                    v[i] += 1.0;
                }
            }
        }
        Ok(v)
    }
}

/// Records every prompt and answers with a fixed string, or fails.
#[derive(Default)]
pub struct RecordingGenerator {
    prompts: Mutex<Vec<String>>,
    pub fail: bool,
}

impl RecordingGenerator {
    pub const ANSWER: &'static str = "Remove the retaining bolts, then lift part X clear.";

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    fn model_name(&self) -> &str {
        "recording-test"
    }

    async fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            return Err(PipelineError::GenerationUnavailable(
                "upstream returned 503 Service Unavailable".to_string(),
            ));
        }
        Ok(Self::ANSWER.to_string())
    }
}

/// The sample document text: one long paragraph between two short ones.
pub const SAMPLE_TEXT: &str = "Procedure A.\n\nThis is a sufficiently long paragraph about replacing part X, well over fifty characters in length.\n\nTiny.";

pub const DISTRACTOR_TEXT: &str =
    "Clean the fuel injector nozzle every ninety days using the approved solvent kit and a soft brush.";

/// Configuration rooted in `root` with fast retries.
pub fn test_config(root: &Path) -> Config {
    let content = format!(
        r#"[db]
path = "{root}/data/massist.sqlite"

[ingest]
embed_retries = 1
backoff_ms = 1

[storage]
root = "{root}/buckets"
"#,
        root = root.display()
    );
    toml::from_str(&content).unwrap()
}

/// Minimal single-page PDF drawing `text` in one text run.
///
/// Body first, then an xref table with the real byte offsets so pdf-extract
/// can parse it.
pub fn minimal_pdf(text: &str) -> Vec<u8> {
    let stream = format!("BT /F1 12 Tf 72 700 Td ({}) Tj ET", text);

    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            stream.len(),
            stream
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n");
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}
