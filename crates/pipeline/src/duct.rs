//! Duct stage contract and the built-in projection stage.

use dfl_common::{DflError, DuctFault};

use crate::record::{Fields, Record};

/// One unit of per-record processing in a sink stream graph.
///
/// Ducts are push-oriented and strictly synchronous: the upstream stage calls
/// [`Duct::receive`] once per record. Implementations may fail with any error
/// type; faults crossing the host boundary are classified by the sink
/// adapter.
pub trait Duct: Send {
    /// Stage name used in diagnostics.
    fn name(&self) -> &str;

    /// One-time setup, called before the first record.
    fn prepare(&mut self) -> Result<(), DuctFault> {
        Ok(())
    }

    /// Process one record. Returns the record to forward downstream, or
    /// `None` when the record is absorbed.
    fn receive(&mut self, record: Record) -> Result<Option<Record>, DuctFault>;

    /// One-time teardown, called after the last record.
    fn cleanup(&mut self) -> Result<(), DuctFault> {
        Ok(())
    }
}

/// Field-selection stage narrowing records from an input shape to an output
/// shape.
///
/// Two-phase: construction stores the shape descriptors, [`Duct::prepare`]
/// resolves output names to input positions once. Per-record work is a plain
/// index walk.
pub struct ProjectionDuct {
    input: Fields,
    output: Fields,
    plan: Option<Vec<usize>>,
}

impl ProjectionDuct {
    /// Projection from `input` shape to `output` shape.
    pub fn new(input: Fields, output: Fields) -> Self {
        Self {
            input,
            output,
            plan: None,
        }
    }
}

impl Duct for ProjectionDuct {
    fn name(&self) -> &str {
        "Projection"
    }

    fn prepare(&mut self) -> Result<(), DuctFault> {
        let mut plan = Vec::with_capacity(self.output.len());
        for name in self.output.names() {
            let index = self.input.index_of(name).ok_or_else(|| {
                DflError::Planning(format!(
                    "projection output field '{name}' is not part of the input shape"
                ))
            })?;
            plan.push(index);
        }
        self.plan = Some(plan);
        Ok(())
    }

    fn receive(&mut self, record: Record) -> Result<Option<Record>, DuctFault> {
        let plan = self
            .plan
            .as_ref()
            .ok_or_else(|| DflError::State("projection stage has not been prepared".to_string()))?;
        let mut values = Vec::with_capacity(plan.len());
        for &index in plan {
            let value = record.get(index).ok_or_else(|| -> DuctFault {
                format!(
                    "record has {} fields, projection expects at least {}",
                    record.len(),
                    index + 1
                )
                .into()
            })?;
            values.push(value.clone());
        }
        Ok(Some(Record::from_values(values)))
    }
}
