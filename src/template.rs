//! # Template Evaluator
//!
//! Evaluates the JSONata expressions carried by workflow
//! `credentialTemplates` and `stepTemplate`s. Every evaluation runs against a
//! fixed environment document:
//!
//! ```json
//! {
//!   "globals": {
//!     "workflow": {"id": "...", "controller": "..."},
//!     "exchange": {"id": "...", "state": "...", "expires": "..."}
//!   },
//!   "variables": { ... }
//! }
//! ```
//!
//! so templates address `variables.credentialId`, `globals.workflow.id`, and
//! so on. Evaluation is pure and deterministic for a given `(template, env)`
//! pair, effect-free, depth-limited and time-boxed.
//!
//! Evaluated objects destined for storage must not use map keys containing
//! `.`, `$` or `%`; [`evaluate`] rejects them before anything is persisted.

use bumpalo::Bump;
use jsonata_rs::JsonAta;
use serde_json::{Value, json};

use crate::error::{Error, Result};

// recursion and wall-clock bounds for a single evaluation
const MAX_DEPTH: usize = 64;
const TIME_LIMIT_MS: usize = 2000;

const FORBIDDEN_KEY_CHARS: [char; 3] = ['.', '$', '%'];

/// The variable environment for a single evaluation.
#[derive(Clone, Debug)]
pub struct Environment {
    /// Read-only facts about the enclosing workflow and exchange.
    pub globals: Value,

    /// The exchange's variables, merged with per-invocation overrides.
    pub variables: Value,
}

impl Environment {
    /// An environment exposing the given workflow/exchange facts and
    /// variables.
    #[must_use]
    pub fn new(globals: Value, variables: Value) -> Self {
        Self { globals, variables }
    }

    /// Overlay per-invocation variables over the environment's, replacing
    /// same-named top-level entries.
    #[must_use]
    pub fn with_overrides(mut self, overrides: &Value) -> Self {
        if let (Value::Object(base), Value::Object(extra)) =
            (&mut self.variables, overrides)
        {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }
        self
    }
}

/// Evaluate a JSONata template against an environment.
///
/// # Errors
///
/// Returns [`Error::Validation`] when the expression does not parse or the
/// result uses storage-forbidden keys, and [`Error::Data`] when evaluation
/// fails or produces nothing.
pub fn evaluate(template: &str, env: &Environment) -> Result<Value> {
    let arena = Bump::new();
    let jsonata = JsonAta::new(template, &arena).map_err(|e| Error::Validation {
        message: format!("invalid template: {e}"),
        details: None,
    })?;

    let input = json!({
        "globals": env.globals,
        "variables": env.variables,
    })
    .to_string();

    let result = jsonata
        .evaluate_timeboxed(Some(&input), Some(MAX_DEPTH), Some(TIME_LIMIT_MS))
        .map_err(|e| Error::data(format!("template evaluation failed: {e}")))?;
    if result.is_undefined() {
        return Err(Error::data("template evaluated to nothing"));
    }

    let output = result.serialize(false);
    let value: Value = serde_json::from_str(&output)
        .map_err(|e| Error::data(format!("template produced non-JSON output: {e}")))?;

    assert_storable(&value)?;
    Ok(value)
}

/// Reject values whose map keys would be mangled by the storage layer.
///
/// # Errors
///
/// Returns [`Error::Validation`] naming the offending key.
pub fn assert_storable(value: &Value) -> Result<()> {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                if key.contains(FORBIDDEN_KEY_CHARS) {
                    return Err(Error::Validation {
                        message: format!(
                            "evaluated object key \"{key}\" must not contain \".\", \"$\", or \"%\""
                        ),
                        details: Some(json!({"key": key})),
                    });
                }
                assert_storable(nested)?;
            }
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(assert_storable),
        _ => Ok(()),
    }
}
