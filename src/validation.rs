use std::collections::BTreeMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::paths;

pub type FlatErrors = BTreeMap<String, Vec<String>>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParseOutcome<T> {
    Valid(T),
    Invalid(FlatErrors),
}

impl<T> ParseOutcome<T> {
    pub fn is_error(&self) -> bool {
        matches!(self, ParseOutcome::Invalid(_))
    }
}

pub trait FormFields: Clone + Send + Sync + 'static {
    type Fields;

    fn fields() -> Self::Fields;
}

pub trait FormValidator<T: Send>: Send + Sync {
    fn parse<'a>(&'a self, values: &'a Value) -> BoxFuture<'a, ParseOutcome<T>>;

    fn is_valid<'a>(&'a self, values: &'a Value) -> BoxFuture<'a, bool> {
        Box::pin(async move { !self.parse(values).await.is_error() })
    }
}

impl<T, F> FormValidator<T> for F
where
    T: Send,
    F: for<'a> Fn(&'a Value) -> BoxFuture<'a, ParseOutcome<T>> + Send + Sync,
{
    fn parse<'a>(&'a self, values: &'a Value) -> BoxFuture<'a, ParseOutcome<T>> {
        (self)(values)
    }
}

pub type RuleFn = Arc<dyn Fn(Option<&Value>, &Value) -> Result<(), String> + Send + Sync>;

struct Rule {
    path: String,
    check: RuleFn,
}

pub struct RuleValidator<T> {
    rules: Vec<Rule>,
    abort_early: bool,
    _output: PhantomData<fn() -> T>,
}

impl<T> RuleValidator<T> {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            abort_early: false,
            _output: PhantomData,
        }
    }

    pub fn rule(mut self, path: impl Into<String>, check: RuleFn) -> Self {
        self.rules.push(Rule {
            path: path.into(),
            check,
        });
        self
    }

    pub fn abort_early(mut self, enabled: bool) -> Self {
        self.abort_early = enabled;
        self
    }
}

impl<T> Default for RuleValidator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FormValidator<T> for RuleValidator<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn parse<'a>(&'a self, values: &'a Value) -> BoxFuture<'a, ParseOutcome<T>> {
        Box::pin(async move {
            let mut errors = FlatErrors::new();
            for rule in &self.rules {
                let value = paths::get_path(values, &rule.path);
                if let Err(message) = (rule.check)(value, values) {
                    errors.entry(rule.path.clone()).or_default().push(message);
                    if self.abort_early {
                        break;
                    }
                }
            }
            if !errors.is_empty() {
                return ParseOutcome::Invalid(errors);
            }
            match serde_json::from_value::<T>(values.clone()) {
                Ok(parsed) => ParseOutcome::Valid(parsed),
                Err(error) => {
                    // Rules passed but the tree does not deserialize: a
                    // ruleset misconfiguration, surfaced under the root path.
                    let mut errors = FlatErrors::new();
                    errors.entry(String::new()).or_default().push(error.to_string());
                    ParseOutcome::Invalid(errors)
                }
            }
        })
    }
}

pub mod rules {
    use super::*;

    pub fn custom(
        check: impl Fn(Option<&Value>, &Value) -> Result<(), String> + Send + Sync + 'static,
    ) -> RuleFn {
        Arc::new(check)
    }

    pub fn required(message: impl Into<String>) -> RuleFn {
        let message = message.into();
        Arc::new(move |value, _values| match value {
            None | Some(Value::Null) => Err(message.clone()),
            Some(Value::String(text)) if text.is_empty() => Err(message.clone()),
            _ => Ok(()),
        })
    }

    // Absent or non-measurable values pass; pair with `required` to reject
    // missing fields.
    pub fn min_len(minimum: usize, message: impl Into<String>) -> RuleFn {
        let message = message.into();
        Arc::new(move |value, _values| {
            let length = match value {
                Some(Value::String(text)) => text.chars().count(),
                Some(Value::Array(items)) => items.len(),
                _ => return Ok(()),
            };
            if length < minimum {
                Err(message.clone())
            } else {
                Ok(())
            }
        })
    }

    pub fn pattern(regex: Regex, message: impl Into<String>) -> RuleFn {
        let message = message.into();
        Arc::new(move |value, _values| match value.and_then(Value::as_str) {
            Some(text) if !regex.is_match(text) => Err(message.clone()),
            _ => Ok(()),
        })
    }
}
