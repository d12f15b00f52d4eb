//! External log sinks: the call-transcript chat post and the recording
//! re-upload. Modeled on the teacher's `ChannelAdapter` contract — new sinks
//! only need to implement this trait.

use async_trait::async_trait;

use crate::error::Result;

/// A destination for a finished call's rendered transcript.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Stable sink identifier, for logging.
    fn id(&self) -> &'static str;

    /// Post a rendered transcript for `call_id`. Best-effort: callers log and
    /// swallow the error rather than let it affect the call task.
    async fn post_transcript(&self, call_id: &str, transcript: &str) -> Result<()>;

    /// Post a recording's raw bytes, already downloaded, for `call_id`.
    async fn post_recording(&self, call_id: &str, bytes: &[u8], content_type: &str)
        -> Result<()>;
}

/// Posts transcripts and recordings to a Telegram chat via the bot HTTP API.
pub struct TelegramLogSink {
    client: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramLogSink {
    pub fn new(client: reqwest::Client, bot_token: String, chat_id: String) -> Self {
        Self {
            client,
            bot_token,
            chat_id,
        }
    }
}

#[async_trait]
impl LogSink for TelegramLogSink {
    fn id(&self) -> &'static str {
        "telegram"
    }

    async fn post_transcript(&self, call_id: &str, transcript: &str) -> Result<()> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        self.client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": format!("Call {call_id}\n\n{transcript}"),
            }))
            .send()
            .await
            .map_err(|e| crate::error::GatewayError::Transcript(e.to_string()))?;
        Ok(())
    }

    async fn post_recording(
        &self,
        call_id: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<()> {
        let url = format!("https://api.telegram.org/bot{}/sendDocument", self.bot_token);
        let part = reqwest::multipart::Part::bytes(bytes.to_vec())
            .file_name(format!("{call_id}.rec"))
            .mime_str(content_type)
            .map_err(|e| crate::error::GatewayError::Transcript(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", self.chat_id.clone())
            .part("document", part);
        self.client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| crate::error::GatewayError::Transcript(e.to_string()))?;
        Ok(())
    }
}

/// Dispatch a transcript to every sink, logging and swallowing each failure
/// independently so one bad sink never blocks the others.
pub async fn dispatch_transcript(sinks: &[Box<dyn LogSink>], call_id: &str, transcript: &str) {
    for sink in sinks {
        if let Err(err) = sink.post_transcript(call_id, transcript).await {
            tracing::warn!(sink = sink.id(), %call_id, error = %err, "transcript post failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSink(Arc<AtomicUsize>);

    #[async_trait]
    impl LogSink for CountingSink {
        fn id(&self) -> &'static str {
            "counting"
        }

        async fn post_transcript(&self, _call_id: &str, _transcript: &str) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn post_recording(&self, _: &str, _: &[u8], _: &str) -> Result<()> {
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl LogSink for FailingSink {
        fn id(&self) -> &'static str {
            "failing"
        }

        async fn post_transcript(&self, _call_id: &str, _transcript: &str) -> Result<()> {
            Err(crate::error::GatewayError::Transcript("boom".into()))
        }

        async fn post_recording(&self, _: &str, _: &[u8], _: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn a_failing_sink_does_not_block_the_others() {
        let count = Arc::new(AtomicUsize::new(0));
        let sinks: Vec<Box<dyn LogSink>> = vec![
            Box::new(FailingSink),
            Box::new(CountingSink(count.clone())),
        ];
        dispatch_transcript(&sinks, "CA1", "hello").await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
