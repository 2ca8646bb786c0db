pub mod context;
pub mod paths;
pub mod reactive;
pub mod validation;
pub mod violations;


pub use calmform_derive::FormFields;
pub use context::{
    ErrorCallbackFn, ErrorHandlerFn, ErrorReport, FinishedCallbackFn, FormContext, FormOptions,
    OptionsPatch, ResetOptions, SpawnFn, SubmitFailure, SubmitHandlerFn, SuccessCallbackFn,
};
pub use paths::{FieldPath, PathDiff};
pub use reactive::{Cell, Subscription, View};
pub use validation::{
    BoxFuture, FlatErrors, FormFields, FormValidator, ParseOutcome, RuleFn, RuleValidator, rules,
};
