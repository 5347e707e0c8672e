//! Replay consumer.
//!
//! Re-invokes each decoded call through a pluggable [`ReplayBackend`]. The
//! backend is the seam to the real underlying API; everything this module
//! owns is the handle bookkeeping: capture-time handle ids mean nothing to
//! a live driver, so every input handle is remapped through a table built
//! up from the handles earlier replayed calls produced, and every output
//! handle teaches the table a new mapping.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};

use crate::consumer::CallConsumer;
use crate::format::{CommandId, HandleId};
use crate::reader::CallRecord;
use crate::value::{StructValue, Value};

/// One call as presented to the backend: capture-time handle ids in the
/// inputs have already been replaced with live handle values.
#[derive(Debug)]
pub struct ReplayCall<'a> {
    pub command: &'a str,
    pub command_id: CommandId,
    pub inputs: Vec<(String, Value)>,
}

/// What the backend produced: live post-call values for every
/// output-direction parameter in declaration order, plus the return value
/// if the command has one.
#[derive(Debug, Default)]
pub struct ReplayOutcome {
    pub outputs: Vec<Value>,
    pub ret: Option<Value>,
}

/// The seam to the real underlying API implementation.
pub trait ReplayBackend: Send {
    fn execute(&mut self, call: &ReplayCall<'_>) -> Result<ReplayOutcome>;
}

/// Consumer that re-invokes decoded calls against a live backend,
/// remapping handles between the capture and replay worlds.
pub struct ReplayConsumer {
    backend: Box<dyn ReplayBackend>,
    /// Capture-time handle id to live handle value.
    handles: HashMap<HandleId, u64>,
    calls_replayed: u64,
}

impl ReplayConsumer {
    pub fn new(backend: Box<dyn ReplayBackend>) -> Self {
        Self {
            backend,
            handles: HashMap::new(),
            calls_replayed: 0,
        }
    }

    pub fn calls_replayed(&self) -> u64 {
        self.calls_replayed
    }

    /// Rewrite every handle id in a captured value to its live handle.
    fn remap(&self, value: &Value) -> Result<Value> {
        Ok(match value {
            Value::Handle(0) => Value::Handle(0),
            Value::Handle(id) => {
                let live = self
                    .handles
                    .get(id)
                    .with_context(|| format!("handle {id:#x} used before it was created"))?;
                Value::Handle(*live)
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.remap(v))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Struct(sv) => Value::Struct(self.remap_struct(sv)?),
            Value::Union(uv) => {
                let mut out = uv.clone();
                out.value = Box::new(self.remap(&uv.value)?);
                Value::Union(out)
            }
            other => other.clone(),
        })
    }

    fn remap_struct(&self, sv: &StructValue) -> Result<StructValue> {
        let mut out = sv.clone();
        for node in &mut out.chain {
            node.value = self.remap_struct(&node.value)?;
        }
        for (_, value) in &mut out.fields {
            *value = self.remap(value)?;
        }
        Ok(out)
    }

    /// Walk a captured output value and the live value the backend produced
    /// for it in parallel, learning handle mappings from every position.
    fn learn(&mut self, trace: &Value, live: &Value) -> Result<()> {
        match (trace, live) {
            (Value::Handle(0), Value::Handle(_)) | (Value::Null, Value::Null) => {}
            (Value::Handle(id), Value::Handle(raw)) => {
                self.handles.insert(*id, *raw);
            }
            (Value::Array(a), Value::Array(b)) if a.len() == b.len() => {
                for (t, l) in a.iter().zip(b) {
                    self.learn(t, l)?;
                }
            }
            (Value::Struct(a), Value::Struct(b))
                if a.fields.len() == b.fields.len() && a.chain.len() == b.chain.len() =>
            {
                for (t, l) in a.chain.iter().zip(&b.chain) {
                    self.learn(
                        &Value::Struct(t.value.clone()),
                        &Value::Struct(l.value.clone()),
                    )?;
                }
                for ((_, t), (_, l)) in a.fields.iter().zip(&b.fields) {
                    self.learn(t, l)?;
                }
            }
            (Value::Union(a), Value::Union(b)) if a.selector == b.selector => {
                self.learn(&a.value, &b.value)?;
            }
            // Same container kind but different shape inside.
            (Value::Array(_), Value::Array(_))
            | (Value::Struct(_), Value::Struct(_))
            | (Value::Union(_), Value::Union(_)) => {
                bail!("backend output shape mismatch inside {}", trace.kind())
            }
            (trace, live) if trace.kind() == live.kind() => {}
            (trace, live) => bail!(
                "backend output shape mismatch: captured {}, live {}",
                trace.kind(),
                live.kind()
            ),
        }
        Ok(())
    }
}

impl CallConsumer for ReplayConsumer {
    fn name(&self) -> &str {
        "replay"
    }

    fn handle_call(&mut self, call: &CallRecord) -> Result<()> {
        let inputs = call
            .inputs
            .iter()
            .map(|(name, value)| Ok((name.clone(), self.remap(value)?)))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("cannot replay {}", call.command))?;

        let outcome = self
            .backend
            .execute(&ReplayCall {
                command: &call.command,
                command_id: call.command_id,
                inputs,
            })
            .with_context(|| format!("backend failed to replay {}", call.command))?;

        if outcome.outputs.len() != call.outputs.len() {
            bail!(
                "backend returned {} outputs for {}, trace has {}",
                outcome.outputs.len(),
                call.command,
                call.outputs.len()
            );
        }
        for ((_, trace), live) in call.outputs.iter().zip(&outcome.outputs) {
            self.learn(trace, live)?;
        }

        if let (Some(captured), Some(live)) = (&call.ret, &outcome.ret) {
            if captured != live {
                tracing::debug!(
                    command = %call.command,
                    "return value diverged from capture: {captured} vs {live}"
                );
            }
        }

        self.calls_replayed += 1;
        Ok(())
    }
}
