use anyhow::{Result, anyhow};
use futures_util::StreamExt;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::config::Settings;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f64,
    top_p: f64,
    num_predict: u32,
}

#[derive(Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

/// One line of the generate stream. Lines carry an optional incremental
/// text fragment; other fields (`done`, timings) are not consumed.
#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: Option<String>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModel>,
}

/// An event emitted by an in-flight generate stream. Events are bound
/// to the chat that initiated the request and to a generation number so
/// the UI can drop output from a stream it has since abandoned.
#[derive(Debug)]
pub struct StreamEvent {
    pub chat_id: String,
    pub message_id: String,
    pub generation: u64,
    pub kind: StreamEventKind,
}

#[derive(Debug)]
pub enum StreamEventKind {
    /// An incremental text fragment to append to the running reply.
    Fragment(String),
    /// End of stream; the accumulated reply should be committed.
    Done,
    /// The request or the read loop failed. Carries user-facing text.
    Failed(String),
}

/// Buffers raw stream bytes and yields the text fragments contained in
/// complete newline-delimited JSON lines. Lines that fail to parse are
/// skipped without aborting the stream, but counted.
pub struct LineBuffer {
    buf: String,
    pub skipped: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            buf: String::new(),
            skipped: 0,
        }
    }

    /// Feeds one chunk of bytes, returning the fragments of every line
    /// completed by it.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.push_str(&String::from_utf8_lossy(bytes));

        let mut fragments = Vec::new();
        while let Some(pos) = self.buf.find('\n') {
            let line: String = self.buf.drain(..=pos).collect();
            if let Some(fragment) = self.take_fragment(line.trim()) {
                fragments.push(fragment);
            }
        }
        fragments
    }

    /// Flushes a trailing line that arrived without a newline before
    /// the stream ended.
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.buf);
        self.take_fragment(line.trim())
    }

    fn take_fragment(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return None;
        }
        match serde_json::from_str::<GenerateChunk>(line) {
            Ok(chunk) => chunk.response,
            Err(e) => {
                debug!("skipping malformed stream line: {}", e);
                self.skipped += 1;
                None
            }
        }
    }
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.to_string(),
        }
    }

    /// Issues one streaming generate request and forwards its fragments
    /// as [`StreamEvent`]s. The caller gets exactly one terminal event
    /// (`Done` or `Failed`) through [`spawn_generate`].
    async fn generate_stream(
        &self,
        settings: &Settings,
        prompt: &str,
        chat_id: &str,
        message_id: &str,
        generation: u64,
        tx: &UnboundedSender<StreamEvent>,
    ) -> Result<()> {
        let url = format!("{}/api/generate", self.base_url);

        let request = GenerateRequest {
            model: settings.model.clone(),
            prompt: prompt.to_string(),
            stream: true,
            options: GenerateOptions {
                temperature: settings.temperature,
                top_p: 0.9,
                num_predict: settings.max_tokens,
            },
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Ollama request failed with status: {}",
                response.status()
            ));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = LineBuffer::new();

        let send = |fragment: String| {
            let _ = tx.send(StreamEvent {
                chat_id: chat_id.to_string(),
                message_id: message_id.to_string(),
                generation,
                kind: StreamEventKind::Fragment(fragment),
            });
        };

        while let Some(chunk) = stream.next().await {
            for fragment in buffer.push(&chunk?) {
                send(fragment);
            }
        }
        if let Some(fragment) = buffer.finish() {
            send(fragment);
        }

        if buffer.skipped > 0 {
            debug!("stream finished with {} skipped lines", buffer.skipped);
        }

        Ok(())
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to list models: {}", response.status()));
        }

        let models_response: OllamaModelsResponse = response.json().await?;
        Ok(models_response
            .models
            .into_iter()
            .map(|model| model.name)
            .collect())
    }
}

/// Spawns the streaming request as an abortable task. Any error on the
/// way (connect failure, bad status, read error) becomes a single
/// `Failed` event carrying the text shown to the user.
pub fn spawn_generate(
    client: OllamaClient,
    settings: Settings,
    prompt: String,
    chat_id: String,
    message_id: String,
    generation: u64,
    tx: UnboundedSender<StreamEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = client
            .generate_stream(&settings, &prompt, &chat_id, &message_id, generation, &tx)
            .await;

        let kind = match result {
            Ok(()) => StreamEventKind::Done,
            Err(e) => StreamEventKind::Failed(format!(
                "Error: {}\n\nMake sure Ollama is running and the model is available.",
                e
            )),
        };
        let _ = tx.send(StreamEvent {
            chat_id,
            message_id,
            generation,
            kind,
        });
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_lines_are_skipped_without_aborting() {
        let mut buffer = LineBuffer::new();
        let mut reply = String::new();

        for line in [
            "{\"response\":\"Hel\"}\n",
            "{\"response\":\"lo\"}\n",
            "not json\n",
            "{\"response\":\"!\"}\n",
        ] {
            for fragment in buffer.push(line.as_bytes()) {
                reply.push_str(&fragment);
            }
        }

        assert_eq!(reply, "Hello!");
        assert_eq!(buffer.skipped, 1);
    }

    #[test]
    fn fragments_split_across_chunks_are_reassembled() {
        let mut buffer = LineBuffer::new();
        let mut fragments = Vec::new();

        fragments.extend(buffer.push(b"{\"respon"));
        assert!(fragments.is_empty());
        fragments.extend(buffer.push(b"se\":\"Hi\"}\n{\"response\":\" there\"}\n"));

        assert_eq!(fragments, vec!["Hi".to_string(), " there".to_string()]);
        assert_eq!(buffer.skipped, 0);
    }

    #[test]
    fn lines_without_a_response_field_are_not_errors() {
        let mut buffer = LineBuffer::new();
        let fragments = buffer.push(b"{\"done\":true}\n");
        assert!(fragments.is_empty());
        assert_eq!(buffer.skipped, 0);
    }

    #[test]
    fn trailing_line_without_newline_is_flushed() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"{\"response\":\"end\"}").is_empty());
        assert_eq!(buffer.finish().as_deref(), Some("end"));
    }

    #[test]
    fn empty_lines_are_ignored() {
        let mut buffer = LineBuffer::new();
        let fragments = buffer.push(b"\n\n{\"response\":\"x\"}\n\n");
        assert_eq!(fragments, vec!["x".to_string()]);
        assert_eq!(buffer.skipped, 0);
    }
}
