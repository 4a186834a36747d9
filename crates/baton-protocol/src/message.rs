/// One protocol message, as carried in a single frame.
///
/// `args` is opaque at this layer; handlers split it on `,` per message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub instance_id: String,
    pub message_type: String,
    pub message_id: String,
    pub args: String,
}

impl Message {
    pub fn new(
        instance_id: impl Into<String>,
        message_type: impl Into<String>,
        message_id: impl Into<String>,
        args: impl Into<String>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            message_type: message_type.into(),
            message_id: message_id.into(),
            args: args.into(),
        }
    }

    /// Build a recognition-result message (`grammarMatch` / `dictationResult`).
    ///
    /// Correlation with a request is the controller's job, so these carry
    /// fixed instance and message ids.
    pub fn recognition(message_type: &str, text: &str) -> Self {
        Self::new("1", message_type, "1", text)
    }

    /// Build a reply to this message with the args replaced.
    pub fn reply(&self, args: &str) -> Self {
        Self {
            instance_id: self.instance_id.clone(),
            message_type: self.message_type.clone(),
            message_id: self.message_id.clone(),
            args: args.to_string(),
        }
    }

    /// Split `args` on `,`. Always yields at least one element (possibly
    /// empty), mirroring the wire convention for sub-fields.
    pub fn arg_fields(&self) -> Vec<&str> {
        self.args.split(',').collect()
    }
}
