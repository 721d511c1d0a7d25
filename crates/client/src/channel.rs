//! Streaming chat channel collaborator and its HTTP implementation.
//!
//! The channel is bound to one session at a time. `send_message` delivers
//! the assistant turn as ordered text fragments and returns once the turn is
//! complete; there is no separate end-of-turn marker.
//!
//! `history` and `stream_turn` address a session explicitly and ignore the
//! binding, so work started for one session stays on it after a rebind.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use cognicore_protocol::{new_id, MessagesPayload, SendChatRequest};
use futures::StreamExt;
use tracing::debug;

use crate::error::ClientError;

/// Fragment callback handed to a streaming turn.
pub type FragmentSink<'s> = &'s mut (dyn for<'a> FnMut(&'a str) + Send);

fn unbound() -> ClientError {
    ClientError::Channel("no session bound".to_string())
}

#[async_trait]
pub trait StreamingChannel: Send + Sync {
    /// Bind the channel to an existing session
    fn switch_session(&self, session_id: &str);
    /// Bind the channel to a freshly allocated session id
    fn new_session(&self);
    fn session_id(&self) -> Option<String>;
    fn update_model(&self, model: &str);

    /// Canonical history and stored model of `session_id`
    async fn history(&self, session_id: &str) -> Result<MessagesPayload, ClientError>;

    /// Stream one assistant turn of `session_id`, calling `on_fragment` per
    /// text fragment
    async fn stream_turn(
        &self,
        session_id: &str,
        content: &str,
        model: &str,
        on_fragment: FragmentSink<'_>,
    ) -> Result<(), ClientError>;

    /// History of the bound session
    async fn get_messages(&self) -> Result<MessagesPayload, ClientError> {
        let session_id = self.session_id().ok_or_else(unbound)?;
        self.history(&session_id).await
    }

    /// Stream one assistant turn of the bound session
    async fn send_message(
        &self,
        content: &str,
        model: &str,
        on_fragment: FragmentSink<'_>,
    ) -> Result<(), ClientError> {
        let session_id = self.session_id().ok_or_else(unbound)?;
        self.stream_turn(&session_id, content, model, on_fragment)
            .await
    }
}

/// Talks to `/api/chat/:sessionId/*` on the registry server.
pub struct HttpStreamingChannel {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    session_id: RwLock<Option<String>>,
    model: RwLock<Option<String>>,
}

impl HttpStreamingChannel {
    /// `timeout` bounds connecting and history fetches. A streaming reply
    /// may run for as long as the agent keeps producing output.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            session_id: RwLock::new(None),
            model: RwLock::new(None),
        })
    }

    fn chat_url(&self, session_id: &str, rest: &str) -> String {
        format!("{}/api/chat/{}/{}", self.base_url, session_id, rest)
    }

    /// Last model pushed through `update_model`. Turns sent with an empty
    /// model use it.
    pub fn model(&self) -> Option<String> {
        self.model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl StreamingChannel for HttpStreamingChannel {
    fn switch_session(&self, session_id: &str) {
        *self.session_id.write().unwrap_or_else(PoisonError::into_inner) =
            Some(session_id.to_string());
    }

    fn new_session(&self) {
        *self.session_id.write().unwrap_or_else(PoisonError::into_inner) = Some(new_id());
    }

    fn session_id(&self) -> Option<String> {
        self.session_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update_model(&self, model: &str) {
        *self.model.write().unwrap_or_else(PoisonError::into_inner) = Some(model.to_string());
    }

    async fn history(&self, session_id: &str) -> Result<MessagesPayload, ClientError> {
        let resp = self
            .client
            .get(self.chat_url(session_id, "messages"))
            .timeout(self.timeout)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ClientError::Channel(format!(
                "history fetch failed with HTTP {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }

    async fn stream_turn(
        &self,
        session_id: &str,
        content: &str,
        model: &str,
        on_fragment: FragmentSink<'_>,
    ) -> Result<(), ClientError> {
        let model = match model {
            "" => self.model().unwrap_or_default(),
            model => model.to_string(),
        };
        let body = SendChatRequest {
            message: content.to_string(),
            model,
            stream: true,
        };
        let resp = self
            .client
            .post(self.chat_url(session_id, "chat"))
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ClientError::Channel(format!(
                "chat request failed with HTTP {}",
                resp.status()
            )));
        }

        let mut decoder = Utf8ChunkDecoder::default();
        let mut stream = resp.bytes_stream();
        let mut fragments = 0usize;
        while let Some(chunk) = stream.next().await {
            let text = decoder.push(&chunk?);
            if !text.is_empty() {
                fragments += 1;
                on_fragment(&text);
            }
        }
        let tail = decoder.finish();
        if !tail.is_empty() {
            fragments += 1;
            on_fragment(&tail);
        }

        debug!(
            component = "channel",
            event = "channel.stream_complete",
            session_id = %session_id,
            fragments,
            "Assistant turn complete"
        );
        Ok(())
    }
}

/// Reassembles UTF-8 text from byte chunks that may split a code point.
#[derive(Debug, Default)]
struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    fn push(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        // Incomplete trailing sequence: wait for the next chunk.
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }

    fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}
