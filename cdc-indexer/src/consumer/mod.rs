//! Consumer module for the CDC indexer.
//!
//! Provides the message source abstraction the reader pulls from, its Kafka
//! implementation, and the dead-letter producer for parked messages.

mod dead_letter;
mod kafka_consumer;
mod messages;
mod source;

pub use dead_letter::DeadLetterProducer;
pub use kafka_consumer::{classify_kafka_error, KafkaConsumer};
pub use messages::SourceMessage;
pub use source::MessageSource;
