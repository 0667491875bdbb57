//! # Messaging
//!
//! Intake envelopes in, confirmation and failure notifications out. The queue
//! transport on either side is supplied by the caller; this module owns the
//! envelope formats and the ack/publish contracts.

pub mod errors;
pub mod intake;
pub mod notifications;

pub use errors::MessagingError;
pub use intake::{
    decode_intake, IntakeAck, IntakeConsumer, IntakeDispatcher, IntakeEnvelope, IntakeHeaders,
    IntakePayloadV1, UnsupportedVersionHandler,
};
pub use notifications::{
    ChannelNotificationPublisher, FailedStatus, FailureMetadata, InMemoryNotificationPublisher,
    NotificationEnvelope, NotificationHeaders, NotificationPayload, NotificationPublisher,
    NotificationService, SubmissionStatus, SubmittedStatus,
};
