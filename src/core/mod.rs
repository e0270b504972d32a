mod config;
pub(crate) mod delivery;
mod event_queue;
mod retry;

pub use config::{
    default_client_context, local_endpoint, TrackerOptions, TrackerOptionsBuilder,
    DEFAULT_BASE_DELAY, DEFAULT_ENDPOINT, DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_BATCH_SIZE,
    DEFAULT_MAX_DELAY, DEFAULT_MAX_QUEUE_SIZE, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT,
};
pub use delivery::{FlushReport, FlushTrigger, COMMAND_CHANNEL_CAPACITY};
pub use event_queue::{is_valid_event_name, DeliveryBatch, Event, EventQueue, MAX_EVENT_NAME_LEN};
pub use retry::{RetryController, RetryDecision, RetryPolicy};
