//! fieldops-interchange: shared wire records, boundary normalization and
//! the resource route table.
//!
//! The field-service API is inconsistent about field naming: some
//! endpoints return `customer_id`, others `customerId`, a few return both.
//! Every record crossing into the client passes through
//! [`normalize_record`] exactly once, so code above this crate only ever
//! sees snake_case field names. Outbound payloads go the other way through
//! [`Record::to_wire`].
//!
//! The [`resource`] module describes each managed resource (customers,
//! tasks, CCTV records, ...) as data: which paths serve which scope, which
//! operations exist, which filters the server understands.

pub mod deserialize;
pub mod record;
pub mod resource;
pub mod types;

pub use deserialize::{
    normalize_collection, normalize_record, to_camel_case, to_snake_case, InterchangeError,
};
pub use record::Record;
pub use resource::{Operation, ResourceKind, ResourceSpec, Scope, UpdateMethod};
pub use types::*;
