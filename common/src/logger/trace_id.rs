use uuid::Uuid;

/// Correlation ID that follows a request / batch / transaction
#[derive(Clone, Debug)]
pub struct TraceId {
    id: Uuid,
    hyphenated: String,
}

impl TraceId {
    pub fn as_str(&self) -> &str {
        &self.hyphenated
    }
}

impl Default for TraceId {
    fn default() -> Self {
        let id = Uuid::new_v4();
        let hyphenated = id.as_hyphenated().to_string();
        Self { id, hyphenated }
    }
}
