//! Model adapter: turns an open feature mapping into a single extraction prediction.
//!
//! The artifact is a JSON manifest tagged by `kind`. `linear` carries its coefficients inline;
//! `onnx` points at a graph file and names the input columns in order (needs the `onnx` feature).

use crate::error::GatewayError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub type Features = Map<String, Value>;

/// Read-only after load; shared across request tasks.
pub trait Regressor: Send + Sync {
    fn predict(&self, features: &Features) -> Result<f64, GatewayError>;
    fn describe(&self) -> String;
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ModelManifest {
    Linear { intercept: f64, terms: Vec<LinearTerm> },
    Onnx { path: PathBuf, features: Vec<String> },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LinearTerm {
    Numeric { name: String, weight: f64 },
    Categorical { name: String, levels: HashMap<String, f64> },
}

pub fn load_model(path: &Path) -> Result<Arc<dyn Regressor>, GatewayError> {
    let raw = std::fs::read_to_string(path).map_err(|e| GatewayError::ModelLoad(format!("{}: {e}", path.display())))?;
    let manifest: ModelManifest = serde_json::from_str(&raw).map_err(|e| GatewayError::ModelLoad(format!("{}: {e}", path.display())))?;
    let model: Arc<dyn Regressor> = match manifest {
        ModelManifest::Linear { intercept, terms } => Arc::new(LinearModel::new(intercept, terms)),
        ModelManifest::Onnx { path: graph, features } => {
            let graph = match path.parent() { Some(dir) if graph.is_relative() => dir.join(graph), _ => graph };
            load_onnx(&graph, features)?
        }
    };
    info!(path = %path.display(), model = %model.describe(), "model_loaded");
    Ok(model)
}

#[cfg(feature = "onnx")]
fn load_onnx(graph: &Path, features: Vec<String>) -> Result<Arc<dyn Regressor>, GatewayError> {
    Ok(Arc::new(onnx::OnnxModel::load(graph, features)?))
}

#[cfg(not(feature = "onnx"))]
fn load_onnx(graph: &Path, _features: Vec<String>) -> Result<Arc<dyn Regressor>, GatewayError> {
    Err(GatewayError::ModelLoad(format!("{}: built without onnx support", graph.display())))
}

/// Numbers pass through; strings count when they parse to a finite float.
pub(crate) fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|x| x.is_finite()),
        _ => None,
    }
}

fn numeric_feature(features: &Features, name: &str) -> Result<f64, GatewayError> {
    let v = features.get(name).ok_or_else(|| GatewayError::ModelInput(format!("missing feature `{name}`")))?;
    as_number(v).ok_or_else(|| GatewayError::ModelInput(format!("feature `{name}` is not numeric")))
}

#[derive(Debug, Clone)]
pub struct LinearModel {
    intercept: f64,
    terms: Vec<LinearTerm>,
}

impl LinearModel {
    pub fn new(intercept: f64, terms: Vec<LinearTerm>) -> Self { Self { intercept, terms } }
}

impl Regressor for LinearModel {
    fn predict(&self, features: &Features) -> Result<f64, GatewayError> {
        let mut acc = self.intercept;
        for term in &self.terms {
            match term {
                LinearTerm::Numeric { name, weight } => acc += weight * numeric_feature(features, name)?,
                LinearTerm::Categorical { name, levels } => {
                    let level = match features.get(name) {
                        Some(Value::String(s)) => s.clone(),
                        Some(Value::Number(n)) => n.to_string(),
                        Some(_) => return Err(GatewayError::ModelInput(format!("feature `{name}` is not categorical"))),
                        None => return Err(GatewayError::ModelInput(format!("missing feature `{name}`"))),
                    };
                    let w = levels.get(&level).ok_or_else(|| GatewayError::ModelInput(format!("unknown level `{level}` for feature `{name}`")))?;
                    acc += w;
                }
            }
        }
        Ok(acc)
    }

    fn describe(&self) -> String { format!("linear({} terms)", self.terms.len()) }
}

#[cfg(feature = "onnx")]
mod onnx {
    use super::{numeric_feature, Features, Regressor};
    use crate::error::GatewayError;
    use std::path::Path;
    use tract_onnx::prelude::*;

    pub struct OnnxModel {
        plan: TypedRunnableModel<TypedModel>,
        features: Vec<String>,
    }

    impl OnnxModel {
        pub fn load(path: &Path, features: Vec<String>) -> Result<Self, GatewayError> {
            let dim = features.len();
            let plan = tract_onnx::onnx()
                .model_for_path(path)
                .and_then(|m| m.with_input_fact(0, f32::fact([1, dim]).into()))
                .and_then(|m| m.into_optimized())
                .and_then(|m| m.into_runnable())
                .map_err(|e| GatewayError::ModelLoad(format!("{}: {e}", path.display())))?;
            Ok(Self { plan, features })
        }
    }

    impl Regressor for OnnxModel {
        fn predict(&self, features: &Features) -> Result<f64, GatewayError> {
            let input = self.features.iter()
                .map(|name| numeric_feature(features, name).map(|x| x as f32))
                .collect::<Result<Vec<f32>, _>>()?;
            let tensor = Tensor::from_shape(&[1, input.len()], &input).map_err(|e| GatewayError::ModelInput(e.to_string()))?;
            let outputs = self.plan.run(tvec!(tensor.into())).map_err(|e| GatewayError::ModelInput(e.to_string()))?;
            let view = outputs[0].to_array_view::<f32>().map_err(|e| GatewayError::ModelInput(e.to_string()))?;
            view.iter().next().map(|x| *x as f64).ok_or_else(|| GatewayError::ModelInput("model produced no output".into()))
        }

        fn describe(&self) -> String { format!("onnx({} features)", self.features.len()) }
    }
}
