use super::message::{AssistantMessage, Content, Message, Tool};

/// Everything a vendor needs to produce the next assistant turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<Tool>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context with a system prompt.
    pub fn system(prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: Some(prompt.into()),
            ..Self::default()
        }
    }

    /// Create a context holding one user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(text)],
            ..Self::default()
        }
    }

    /// Append a user text message.
    pub fn with_user(mut self, text: impl Into<String>) -> Self {
        self.messages.push(Message::user(text));
        self
    }

    /// Append a user message made of content blocks.
    pub fn with_user_blocks(mut self, content: Vec<Content>) -> Self {
        self.messages.push(Message::user_blocks(content));
        self
    }

    /// Append a finished assistant turn.
    pub fn with_response(mut self, response: &AssistantMessage) -> Self {
        self.messages.push(Message::Assistant(response.clone()));
        self
    }

    /// Append a text tool result.
    pub fn with_tool_result(
        mut self,
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        self.messages
            .push(Message::tool_result(tool_call_id, tool_name, output, false));
        self
    }

    /// Append any message.
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Replace the tool set.
    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    /// Copy of this context with `messages` swapped in.
    pub(crate) fn with_messages(&self, messages: Vec<Message>) -> Self {
        Self {
            system_prompt: self.system_prompt.clone(),
            messages,
            tools: self.tools.clone(),
        }
    }
}

impl From<&str> for Context {
    fn from(s: &str) -> Self {
        Context::user(s)
    }
}

impl From<String> for Context {
    fn from(s: String) -> Self {
        Context::user(s)
    }
}

impl From<Vec<Message>> for Context {
    fn from(messages: Vec<Message>) -> Self {
        Context {
            messages,
            ..Context::default()
        }
    }
}
