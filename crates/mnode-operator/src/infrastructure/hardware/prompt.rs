//! Channel-backed [`DevicePrompt`].
//!
//! Device drivers ask for PINs from inside the blocking device task.  The
//! `ChannelPrompt` forwards each question to the front end as a
//! [`PromptRequest`] and blocks that task, never a runtime worker, until the
//! front end answers through [`PromptRequest::answer`].

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::application::hardware::{DevicePrompt, PromptKind};

/// One question waiting for the operator.
#[derive(Debug)]
pub struct PromptRequest {
    pub kind: PromptKind,
    pub message: String,
    reply: oneshot::Sender<Option<String>>,
}

impl PromptRequest {
    /// Sends the operator's answer; `None` dismisses the prompt.
    pub fn answer(self, value: Option<String>) {
        // The device task may have given up already.
        let _ = self.reply.send(value);
    }
}

#[derive(Debug, Clone)]
pub struct ChannelPrompt {
    tx: mpsc::Sender<PromptRequest>,
}

impl ChannelPrompt {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PromptRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl DevicePrompt for ChannelPrompt {
    /// Must be called from a blocking context such as `spawn_blocking`.
    fn ask(&self, kind: PromptKind, message: &str) -> Option<String> {
        let (reply, answer) = oneshot::channel();
        let request = PromptRequest {
            kind,
            message: message.to_string(),
            reply,
        };
        if self.tx.blocking_send(request).is_err() {
            debug!(?kind, "no front end listening for device prompts");
            return None;
        }
        answer.blocking_recv().ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_answer_reaches_the_blocked_device_task() {
        // Arrange
        let (prompt, mut requests) = ChannelPrompt::new(1);
        let device = tokio::task::spawn_blocking(move || prompt.ask(PromptKind::Pin, "PIN?"));

        // Act
        let request = requests.recv().await.unwrap();
        assert_eq!(request.kind, PromptKind::Pin);
        assert_eq!(request.message, "PIN?");
        request.answer(Some("1234".to_string()));

        // Assert
        assert_eq!(device.await.unwrap().as_deref(), Some("1234"));
    }

    #[tokio::test]
    async fn test_dropped_request_reads_as_dismissed() {
        let (prompt, mut requests) = ChannelPrompt::new(1);
        let device = tokio::task::spawn_blocking(move || prompt.ask(PromptKind::Passphrase, "?"));

        drop(requests.recv().await.unwrap());

        assert_eq!(device.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_no_listener_reads_as_dismissed() {
        let (prompt, requests) = ChannelPrompt::new(1);
        drop(requests);

        let answer = tokio::task::spawn_blocking(move || prompt.ask(PromptKind::Pin, "?"))
            .await
            .unwrap();

        assert_eq!(answer, None);
    }
}
