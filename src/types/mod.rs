pub mod envelope;
pub mod ids;
pub mod priority;
pub mod request;

pub use envelope::{EnvelopeMeta, JobEnvelope, Payload, ENVELOPE_VERSION};
pub use ids::{EntryId, JobHandle};
pub use priority::Priority;
pub use request::ScheduleRequest;
