use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use log::{debug, trace, warn};
use serde_json::{Map, Value};

use crate::paths;
use crate::reactive::{Cell, View, read_lock, write_lock};
use crate::validation::{BoxFuture, FlatErrors, FormValidator, ParseOutcome};
use crate::violations;

pub type SpawnFn = Arc<dyn Fn(BoxFuture<'static, ()>) + Send + Sync>;
pub type SubmitHandlerFn<T, R, E> =
    Arc<dyn Fn(T) -> BoxFuture<'static, Result<R, E>> + Send + Sync>;
pub type ErrorHandlerFn<E> = Arc<dyn Fn(&E) -> ErrorReport + Send + Sync>;
pub type SuccessCallbackFn<R> = Arc<dyn Fn(&R) + Send + Sync>;
pub type ErrorCallbackFn<E> = Arc<dyn Fn(&SubmitFailure<E>) + Send + Sync>;
pub type FinishedCallbackFn = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone, Debug)]
pub struct ErrorReport {
    pub message: String,
    pub violations: Option<Value>,
}

#[derive(Debug)]
pub enum SubmitFailure<E> {
    Invalid,
    Rejected(E),
}

impl<E: Display> Display for SubmitFailure<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitFailure::Invalid => f.write_str("form validation failed"),
            SubmitFailure::Rejected(rejection) => write!(f, "{rejection}"),
        }
    }
}

impl<E: std::fmt::Debug + Display> std::error::Error for SubmitFailure<E> {}

pub struct FormOptions<T, R, E>
where
    T: Send + 'static,
{
    values: Option<Value>,
    default_values: Option<Value>,
    validator: Arc<dyn FormValidator<T>>,
    submit_handler: SubmitHandlerFn<T, R, E>,
    error_handler: Option<ErrorHandlerFn<E>>,
    reset_after_submit: bool,
    validate_on_input: bool,
    spawner: Option<SpawnFn>,
    on_success: Option<SuccessCallbackFn<R>>,
    on_error: Option<ErrorCallbackFn<E>>,
    on_finished: Option<FinishedCallbackFn>,
}

impl<T, R, E> FormOptions<T, R, E>
where
    T: Send + 'static,
{
    pub fn new<V, F, Fut>(validator: V, submit_handler: F) -> Self
    where
        V: FormValidator<T> + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let submit_handler: SubmitHandlerFn<T, R, E> =
            Arc::new(move |values| Box::pin(submit_handler(values)));
        Self {
            values: None,
            default_values: None,
            validator: Arc::new(validator),
            submit_handler,
            error_handler: None,
            reset_after_submit: false,
            validate_on_input: false,
            spawner: None,
            on_success: None,
            on_error: None,
            on_finished: None,
        }
    }

    pub fn values(mut self, values: Value) -> Self {
        self.values = Some(values);
        self
    }

    pub fn default_values(mut self, default_values: Value) -> Self {
        self.default_values = Some(default_values);
        self
    }

    pub fn error_handler(
        mut self,
        handler: impl Fn(&E) -> ErrorReport + Send + Sync + 'static,
    ) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    pub fn reset_after_submit(mut self, enabled: bool) -> Self {
        self.reset_after_submit = enabled;
        self
    }

    // Background revalidation is fire-and-forget, so enabling it requires a
    // spawn capability from the host executor.
    pub fn validate_on_input(
        mut self,
        spawner: impl Fn(BoxFuture<'static, ()>) + Send + Sync + 'static,
    ) -> Self {
        self.validate_on_input = true;
        self.spawner = Some(Arc::new(spawner));
        self
    }

    pub fn on_success(mut self, callback: impl Fn(&R) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn on_error(
        mut self,
        callback: impl Fn(&SubmitFailure<E>) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn on_finished(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_finished = Some(Arc::new(callback));
        self
    }
}

pub struct OptionsPatch<T, R, E>
where
    T: Send + 'static,
{
    pub default_values: Option<Value>,
    pub validator: Option<Arc<dyn FormValidator<T>>>,
    pub submit_handler: Option<SubmitHandlerFn<T, R, E>>,
    pub error_handler: Option<ErrorHandlerFn<E>>,
    pub reset_after_submit: Option<bool>,
    pub validate_on_input: Option<bool>,
    pub on_success: Option<SuccessCallbackFn<R>>,
    pub on_error: Option<ErrorCallbackFn<E>>,
    pub on_finished: Option<FinishedCallbackFn>,
}

impl<T, R, E> Default for OptionsPatch<T, R, E>
where
    T: Send + 'static,
{
    fn default() -> Self {
        Self {
            default_values: None,
            validator: None,
            submit_handler: None,
            error_handler: None,
            reset_after_submit: None,
            validate_on_input: None,
            on_success: None,
            on_error: None,
            on_finished: None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResetOptions {
    pub values: Option<Value>,
    pub default_values: Option<Value>,
}

struct Tracking {
    violations: FlatErrors,
    active_paths: BTreeSet<String>,
    submit_failed: bool,
    submitting: bool,
    previous_model: Value,
}

struct Inner<T, R, E>
where
    T: Send + 'static,
{
    options: RwLock<FormOptions<T, R, E>>,
    model: Cell<Value>,
    error: Cell<String>,
    errors: Cell<Value>,
    raw_errors: Cell<FlatErrors>,
    is_submitting: Cell<bool>,
    tracking: RwLock<Tracking>,
    generation: AtomicU64,
}

pub struct FormContext<T, R, E>
where
    T: Send + 'static,
{
    inner: Arc<Inner<T, R, E>>,
}

impl<T, R, E> Clone for FormContext<T, R, E>
where
    T: Send + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, R, E> FormContext<T, R, E>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Display + Send + 'static,
{
    pub fn new(options: FormOptions<T, R, E>) -> Self {
        let initial = options
            .values
            .clone()
            .or_else(|| options.default_values.clone())
            .unwrap_or_else(empty_model);
        let validate_on_input = options.validate_on_input;
        let inner = Arc::new(Inner {
            model: Cell::new(initial.clone()),
            error: Cell::new(String::new()),
            errors: Cell::new(empty_model()),
            raw_errors: Cell::new(FlatErrors::new()),
            is_submitting: Cell::new(false),
            tracking: RwLock::new(Tracking {
                violations: FlatErrors::new(),
                active_paths: BTreeSet::new(),
                submit_failed: false,
                submitting: false,
                previous_model: initial,
            }),
            generation: AtomicU64::new(0),
            options: RwLock::new(options),
        });
        let context = Self { inner };
        if validate_on_input {
            context.wire_input_revalidation();
        }
        context
    }

    pub fn model(&self) -> Cell<Value> {
        self.inner.model.clone()
    }

    pub fn error(&self) -> View<String> {
        self.inner.error.view()
    }

    pub fn errors(&self) -> View<Value> {
        self.inner.errors.view()
    }

    pub fn raw_errors(&self) -> View<FlatErrors> {
        self.inner.raw_errors.view()
    }

    pub fn is_submitting(&self) -> View<bool> {
        self.inner.is_submitting.view()
    }

    pub fn field(&self, path: impl AsRef<str>) -> Option<Value> {
        self.inner
            .model
            .with(|model| paths::get_path(model, path.as_ref()).cloned())
    }

    pub fn set_field(&self, path: impl AsRef<str>, value: Value) {
        self.inner
            .model
            .update(|model| paths::set_path(model, path.as_ref(), value));
    }

    pub async fn validate(&self) -> Option<T> {
        self.validate_at(self.generation()).await
    }

    pub async fn submit(&self) -> bool {
        if !self.try_begin_submit() {
            warn!("submit ignored: another submit is in flight");
            return false;
        }
        let generation = self.generation();
        self.inner.is_submitting.set(true);
        self.inner.error.set(String::new());

        let Some(values) = self.validate_at(generation).await else {
            debug!("submit rejected by validator");
            self.end_submit();
            self.fire_error(&SubmitFailure::Invalid);
            self.fire_finished();
            return false;
        };

        let (submit_handler, error_handler, reset_after_submit) = {
            let options = read_lock(&self.inner.options);
            (
                options.submit_handler.clone(),
                options.error_handler.clone(),
                options.reset_after_submit,
            )
        };

        let result = (submit_handler)(values).await;
        let stale = self.generation() != generation;
        if stale {
            debug!("submit settled after reset; skipping state writes");
        }
        let succeeded = result.is_ok();
        match result {
            Ok(response) => {
                if !stale {
                    {
                        let mut tracking = write_lock(&self.inner.tracking);
                        tracking.submit_failed = false;
                        tracking.violations.clear();
                    }
                    self.set_errors_at(generation, FlatErrors::new());
                    if reset_after_submit {
                        self.reset();
                    }
                }
                self.fire_success(&response);
            }
            Err(rejection) => {
                if !stale {
                    {
                        let mut tracking = write_lock(&self.inner.tracking);
                        tracking.submit_failed = true;
                    }
                    if let Some(error_handler) = &error_handler {
                        let report = error_handler(&rejection);
                        let translated = report
                            .violations
                            .as_ref()
                            .map(violations::translate)
                            .unwrap_or_default();
                        {
                            let mut tracking = write_lock(&self.inner.tracking);
                            tracking.violations = translated;
                        }
                        self.inner.error.set(report.message);
                        self.set_errors_at(generation, FlatErrors::new());
                    } else {
                        self.inner.error.set(rejection.to_string());
                    }
                }
                self.fire_error(&SubmitFailure::Rejected(rejection));
            }
        }
        self.fire_finished();
        self.end_submit();
        succeeded
    }

    pub fn reset(&self) {
        self.reset_with(ResetOptions::default());
    }

    pub fn reset_with(&self, overrides: ResetOptions) {
        let next_model = {
            let mut options = write_lock(&self.inner.options);
            if let Some(default_values) = overrides.default_values {
                options.default_values = Some(default_values);
            }
            overrides
                .values
                .or_else(|| options.default_values.clone())
                .unwrap_or_else(empty_model)
        };
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("form reset (generation {generation})");
        {
            let mut tracking = write_lock(&self.inner.tracking);
            tracking.violations.clear();
            tracking.active_paths.clear();
            tracking.submit_failed = false;
            tracking.submitting = false;
            tracking.previous_model = next_model.clone();
        }
        self.inner.error.set(String::new());
        self.inner.errors.set(empty_model());
        self.inner.raw_errors.set(FlatErrors::new());
        self.inner.is_submitting.set(false);
        self.inner.model.set(next_model);
    }

    // Explicit partial reconfiguration: each binding present in the patch
    // replaces the current one, everything else is kept.
    pub fn update_options(&self, patch: OptionsPatch<T, R, E>) {
        let mut options = write_lock(&self.inner.options);
        if let Some(default_values) = patch.default_values {
            options.default_values = Some(default_values);
        }
        if let Some(validator) = patch.validator {
            options.validator = validator;
        }
        if let Some(submit_handler) = patch.submit_handler {
            options.submit_handler = submit_handler;
        }
        if let Some(error_handler) = patch.error_handler {
            options.error_handler = Some(error_handler);
        }
        if let Some(reset_after_submit) = patch.reset_after_submit {
            options.reset_after_submit = reset_after_submit;
        }
        if let Some(validate_on_input) = patch.validate_on_input {
            options.validate_on_input = validate_on_input;
        }
        if let Some(on_success) = patch.on_success {
            options.on_success = Some(on_success);
        }
        if let Some(on_error) = patch.on_error {
            options.on_error = Some(on_error);
        }
        if let Some(on_finished) = patch.on_finished {
            options.on_finished = Some(on_finished);
        }
    }

    fn wire_input_revalidation(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.model.subscribe(move |next| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let context = FormContext { inner };
            context.on_model_mutation(next);
        });
    }

    fn on_model_mutation(&self, next: &Value) {
        let generation = self.generation();
        {
            let mut tracking = write_lock(&self.inner.tracking);
            let diff = paths::diff(&tracking.previous_model, next);
            trace!(
                "model mutation: {} changed, {} removed",
                diff.changed.len(),
                diff.removed.len()
            );
            // Editing or removing a path invalidates its server violation.
            for path in diff.removed.iter().chain(diff.changed.iter()) {
                tracking.violations.remove(path);
            }
            for path in &diff.removed {
                tracking.active_paths.remove(path);
            }
            for path in diff.changed {
                tracking.active_paths.insert(path);
            }
            tracking.previous_model = next.clone();
        }
        let spawner = read_lock(&self.inner.options).spawner.clone();
        if let Some(spawner) = spawner {
            let context = self.clone();
            spawner(Box::pin(async move {
                let _ = context.validate_at(generation).await;
            }));
        }
    }

    async fn validate_at(&self, generation: u64) -> Option<T> {
        let validator = read_lock(&self.inner.options).validator.clone();
        let model = self.inner.model.get();
        let outcome = validator.parse(&model).await;
        let (field_errors, parsed) = match outcome {
            ParseOutcome::Valid(values) => (FlatErrors::new(), Some(values)),
            ParseOutcome::Invalid(errors) => (errors, None),
        };
        if self.generation() != generation {
            debug!("discarding stale validation result (generation {generation})");
            return parsed;
        }
        if parsed.is_none() {
            let mut tracking = write_lock(&self.inner.tracking);
            // A standalone validate never sets the sticky failure flag; only
            // a validation that fails inside a submit attempt does.
            if tracking.submitting {
                tracking.submit_failed = true;
            }
        }
        self.set_errors_at(generation, field_errors);
        parsed
    }

    fn set_errors_at(&self, generation: u64, field_errors: FlatErrors) {
        if self.generation() != generation {
            debug!("discarding stale error write (generation {generation})");
            return;
        }
        let validate_on_input = read_lock(&self.inner.options).validate_on_input;
        let (raw, visible) = {
            let tracking = read_lock(&self.inner.tracking);
            let mut raw = field_errors;
            raw.retain(|_, messages| !messages.is_empty());
            // Violations are additive: they append to live validator errors,
            // never replace them.
            for (path, messages) in &tracking.violations {
                raw.entry(path.clone())
                    .or_default()
                    .extend(messages.iter().cloned());
            }
            let visible = if !validate_on_input || tracking.submit_failed {
                raw.clone()
            } else {
                raw.iter()
                    .filter(|(path, _)| tracking.active_paths.contains(*path))
                    .map(|(path, messages)| (path.clone(), messages.clone()))
                    .collect()
            };
            (raw, visible)
        };
        self.inner.errors.set(errors_to_value(&visible));
        self.inner.raw_errors.set(raw);
    }

    fn try_begin_submit(&self) -> bool {
        let mut tracking = write_lock(&self.inner.tracking);
        if tracking.submitting {
            return false;
        }
        tracking.submitting = true;
        true
    }

    fn end_submit(&self) {
        {
            let mut tracking = write_lock(&self.inner.tracking);
            tracking.submitting = false;
        }
        self.inner.is_submitting.set(false);
    }

    fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    fn fire_success(&self, response: &R) {
        let callback = read_lock(&self.inner.options).on_success.clone();
        if let Some(callback) = callback {
            callback(response);
        }
    }

    fn fire_error(&self, failure: &SubmitFailure<E>) {
        let callback = read_lock(&self.inner.options).on_error.clone();
        if let Some(callback) = callback {
            callback(failure);
        }
    }

    fn fire_finished(&self) {
        let callback = read_lock(&self.inner.options).on_finished.clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

fn empty_model() -> Value {
    Value::Object(Map::new())
}

fn errors_to_value(errors: &FlatErrors) -> Value {
    let flat = errors
        .iter()
        .map(|(path, messages)| {
            let list = messages.iter().cloned().map(Value::String).collect();
            (path.clone(), Value::Array(list))
        })
        .collect();
    paths::unflatten(&flat)
}
