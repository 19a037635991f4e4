use serde_json::{Map, Number, Value};

use crate::schema::{
    CATEGORICAL_FEATURES, CATEGORICAL_FILL, FEATURE_COUNT, NUMERIC_FEATURES, NUMERIC_FILL,
};

/// A model-input row: one cell per schema field, numeric group first.
///
/// Cells keep whatever JSON value the client sent. Type checking is the
/// model's job, so a string in a numeric slot survives normalization and
/// fails later as an inference error.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    cells: Vec<Value>,
}

impl FeatureRow {
    /// Builds a row without filling anything. Mostly useful for feeding a
    /// model rows of the wrong width.
    pub fn from_cells(cells: Vec<Value>) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[Value] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn numeric_cells(&self) -> &[Value] {
        &self.cells[..NUMERIC_FEATURES.len().min(self.cells.len())]
    }

    pub fn categorical_cells(&self) -> &[Value] {
        &self.cells[NUMERIC_FEATURES.len().min(self.cells.len())..]
    }
}

/// Completes a partial request into a full row.
///
/// Absent or null numeric fields become `0`, absent or null categorical
/// fields become `"Unknown"`. Unknown keys are ignored.
pub fn normalize(input: &Map<String, Value>) -> FeatureRow {
    let mut cells = Vec::with_capacity(FEATURE_COUNT);

    for name in NUMERIC_FEATURES {
        let cell = match present(input, name) {
            // Integers and floats compare unequal as JSON numbers; widen so
            // `0` and an absent field give the same row.
            Some(Value::Number(n)) => n
                .as_f64()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::Number(n.clone())),
            Some(other) => other.clone(),
            None => Value::from(NUMERIC_FILL),
        };
        cells.push(cell);
    }

    for name in CATEGORICAL_FEATURES {
        let cell = present(input, name)
            .cloned()
            .unwrap_or_else(|| Value::from(CATEGORICAL_FILL));
        cells.push(cell);
    }

    FeatureRow { cells }
}

/// Schema fields the request left absent or null.
pub fn missing_fields(input: &Map<String, Value>) -> Vec<&'static str> {
    crate::schema::feature_names()
        .filter(|name| present(input, name).is_none())
        .collect()
}

fn present<'a>(input: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    input.get(name).filter(|v| !v.is_null())
}
