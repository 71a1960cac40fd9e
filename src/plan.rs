//! # Load Plans
//!
//! Driver configuration: which object to load and which functions to call,
//! read from JSON.
//!
//! ```json
//! {
//!   "object": "simple.o",
//!   "calls": [
//!     { "symbol": "add5", "signature": "i32(i32)", "args": [5], "repeat": 2, "expect": 15 },
//!     { "symbol": "add10", "signature": "i32(i32)", "args": [5] }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::invoke::Signature;
use crate::loader::LoadedObject;
use crate::{Error, Result};

fn default_repeat() -> u32 {
    1
}

/// One function call in a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedCall {
    pub symbol: String,
    /// Textual signature, e.g. `i32(i32)`
    pub signature: String,
    #[serde(default)]
    pub args: Vec<i64>,
    /// Apply the function this many times, feeding each result back in as
    /// the first argument
    #[serde(default = "default_repeat")]
    pub repeat: u32,
    /// Expected final result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<i64>,
}

/// Object path plus the calls to make against it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadPlan {
    pub object: PathBuf,
    #[serde(default)]
    pub calls: Vec<PlannedCall>,
}

/// Result of one planned call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallOutcome {
    pub symbol: String,
    pub signature: String,
    /// Raw result widened to i64
    pub value: i64,
    /// Result rendered in the declared return type
    pub display: String,
    /// `None` when the plan gave no expectation
    pub matched: Option<bool>,
}

impl LoadPlan {
    /// Parse a plan from JSON text and validate its signatures
    pub fn from_json(json: &str) -> Result<Self> {
        let plan: LoadPlan = serde_json::from_str(json)
            .map_err(|e| Error::plan(format!("invalid plan JSON: {}", e)))?;
        plan.validate()?;
        Ok(plan)
    }

    /// Read a plan file. A relative `object` path is resolved against the
    /// plan file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut plan = Self::from_json(&text)?;
        if plan.object.is_relative() {
            if let Some(dir) = path.parent() {
                plan.object = dir.join(&plan.object);
            }
        }
        Ok(plan)
    }

    /// Check every call's signature and argument count
    pub fn validate(&self) -> Result<()> {
        for call in &self.calls {
            let sig: Signature = call.signature.parse()?;
            if call.args.len() != sig.arity() {
                return Err(Error::plan(format!(
                    "{}: signature {} takes {} arguments, plan gives {}",
                    call.symbol,
                    sig,
                    sig.arity(),
                    call.args.len()
                )));
            }
            if call.repeat == 0 {
                return Err(Error::plan(format!("{}: repeat must be at least 1", call.symbol)));
            }
            if call.repeat > 1 && sig.arity() == 0 {
                return Err(Error::plan(format!(
                    "{}: repeat needs at least one argument to feed back",
                    call.symbol
                )));
            }
        }
        Ok(())
    }
}

/// Perform one planned call against a loaded object.
///
/// # Safety
///
/// Every signature in the plan must match the compiled function it names.
pub unsafe fn run_call(object: &LoadedObject, call: &PlannedCall) -> Result<CallOutcome> {
    let sig: Signature = call.signature.parse()?;
    let address = object.require_function(&call.symbol)?;

    let mut args = call.args.clone();
    let mut value = 0;
    for round in 0..call.repeat {
        value = address.invoke(&sig, &args)?;
        tracing::debug!(symbol = %call.symbol, round, value, "call returned");
        if let Some(first) = args.first_mut() {
            *first = value;
        }
    }

    Ok(CallOutcome {
        symbol: call.symbol.clone(),
        signature: sig.to_string(),
        value,
        display: sig.ret.format(value),
        matched: call.expect.map(|e| sig.ret.format(e) == sig.ret.format(value)),
    })
}

/// Load the plan's object and perform every call in order.
///
/// Stops at the first error.
///
/// # Safety
///
/// Every signature in the plan must match the compiled function it names.
pub unsafe fn run_plan(plan: &LoadPlan) -> Result<Vec<CallOutcome>> {
    let object = LoadedObject::load(&plan.object)?;
    let mut outcomes = Vec::with_capacity(plan.calls.len());
    for call in &plan.calls {
        outcomes.push(run_call(&object, call)?);
    }
    Ok(outcomes)
}
