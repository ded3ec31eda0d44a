//! Scripted stand-in for the model client.

use crate::llm::{CompletionModel, CompletionRequest, LlmResponse};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

/// Replies with queued results in order and records every request.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn replying(replies: impl IntoIterator<Item = &'static str>) -> Self {
        let model = Self::default();
        for reply in replies {
            model.push_reply(Ok(reply.to_string()));
        }
        model
    }

    pub fn push_reply(&self, reply: Result<String, String>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl CompletionModel for ScriptedModel {
    fn complete<'a>(
        &'a self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<LlmResponse>> + Send + 'a>> {
        Box::pin(async move {
            let model = request.model.clone();
            self.requests.lock().unwrap().push(request);
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err("no scripted reply left".to_string()));
            match reply {
                Ok(content) => Ok(LlmResponse {
                    content,
                    usage: None,
                    model,
                }),
                Err(message) => Err(anyhow::anyhow!(message)),
            }
        })
    }
}
