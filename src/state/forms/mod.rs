//! Form state tracking: values, per-field state, validation and field arrays

mod defaults;
mod error;
mod field;
mod field_array;
mod form_state;
mod path;
mod resolver;
mod validation;
mod value;
mod watch;

pub use defaults::{DefaultValuesSource, LoadTicket, StaticDefaults};
pub use error::{FieldError, TrackerError};
pub use field::{FieldBinding, FieldSnapshot, FieldState};
pub use field_array::{FieldArray, FieldArrayItem};
pub use form_state::{
    FieldCheck, FormState, FormTracker, SetValueOptions, SubmitOutcome, SubmitResolution,
    SubmitTicket,
};
pub use path::{FieldPath, Segment};
pub use resolver::{Check, Resolver, SchemaResolver, StringSchema, ValidationResult};
pub use validation::{
    AsyncFnValidator, AsyncValidator, DisabledWhenFn, FieldRules, PendingValidation, Rule,
    SyncOutcome, SyncValidatorFn, ValidationResolution, Validity,
};
pub use value::{FormValue, ValueAs};
pub use watch::{ChangeKind, Subscription, WatchCallback, WatchEvent, WatchHub};
