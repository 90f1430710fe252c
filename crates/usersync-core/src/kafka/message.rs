//! Owned broker message.

/// A Kafka message with all metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KafkaMessage {
    /// Message key (optional)
    pub key: Option<Vec<u8>>,

    /// Message value (optional)
    pub value: Option<Vec<u8>>,

    /// Topic name
    pub topic: String,

    /// Partition number
    pub partition: i32,

    /// Offset within the partition
    pub offset: i64,

    /// Message timestamp (milliseconds since epoch)
    pub timestamp: i64,

    /// Message headers
    pub headers: Vec<(String, Vec<u8>)>,
}

impl KafkaMessage {
    /// Build a message carrying `value` at `offset`.
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, value: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            value: Some(value.into()),
            ..Default::default()
        }
    }

    /// Attach a key.
    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Get the message key as a string.
    pub fn key_str(&self) -> Option<&str> {
        self.key.as_ref().and_then(|k| std::str::from_utf8(k).ok())
    }

    /// Get the message value as a string.
    pub fn value_str(&self) -> Option<&str> {
        self.value
            .as_ref()
            .and_then(|v| std::str::from_utf8(v).ok())
    }

    /// Offset to resume from once this message is done.
    pub fn next_offset(&self) -> i64 {
        self.offset + 1
    }
}
