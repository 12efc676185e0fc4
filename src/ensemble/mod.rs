//! Multi-stage ensemble orchestration.
//!
//! An ensemble request runs a detection service once over an input image,
//! then fans each detected region out to a set of estimation services and
//! merges their results into one entry per detection. Stage submissions are
//! non-blocking (promises are collected first, resolved afterwards) so
//! independent stages overlap; detection regions are cropped lazily and at
//! most once, no matter how many stages consume them.

use crate::resource::{BoundingBox, Resource};
use crate::service::AlgorithmService;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default proportional growth applied to each detection box before cropping.
pub const DEFAULT_EXPANSION: f64 = 0.8;

/// Default detection-count ceiling above which estimation stages are skipped.
pub const DEFAULT_LIMIT_ESTIMATIONS: usize = 3;

#[derive(Error, Debug)]
pub enum EnsembleError {
    /// The input resource carries no pixel content.
    #[error("ensemble input '{0}' has no content")]
    InputNotLoaded(String),

    /// A stage returned an error-resource.
    #[error("stage '{stage}' failed: {message}")]
    StageFailed { stage: String, message: String },

    /// Detection metadata did not parse as a bounding box list.
    #[error("malformed detection metadata: {0}")]
    MalformedDetection(String),
}

/// One downstream estimation stage; a `None` service disables the stage
/// without disturbing the others.
pub struct EstimationStage {
    pub name: String,
    pub service: Option<Arc<AlgorithmService>>,
}

impl EstimationStage {
    pub fn new(name: impl Into<String>, service: Arc<AlgorithmService>) -> Self {
        Self {
            name: name.into(),
            service: Some(service),
        }
    }

    pub fn disabled(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service: None,
        }
    }
}

/// The services an ensemble request runs against.
pub struct EnsembleStages {
    pub detection: Arc<AlgorithmService>,
    pub estimations: Vec<EstimationStage>,
}

/// The merged result for one detected region.
#[derive(Clone, Debug, serde::Serialize)]
pub struct EnsembleEntry {
    /// Detection index; stable across every stage.
    pub item_id: usize,
    /// The expanded, image-clamped detection region.
    pub bounding_box: BoundingBox,
    /// Union of the metadata object fields of every estimation result.
    pub attributes: Map<String, Value>,
}

/// Runs detection plus estimation stages over one image.
pub struct EnsembleOrchestrator {
    stages: EnsembleStages,
    expansion: f64,
    limit_estimations: usize,
}

impl EnsembleOrchestrator {
    pub fn new(stages: EnsembleStages) -> Self {
        Self {
            stages,
            expansion: DEFAULT_EXPANSION,
            limit_estimations: DEFAULT_LIMIT_ESTIMATIONS,
        }
    }

    /// Overrides the box expansion proportion.
    pub fn with_expansion(mut self, expansion: f64) -> Self {
        self.expansion = expansion;
        self
    }

    /// Overrides the estimation ceiling; 0 disables the valve.
    pub fn with_limit_estimations(mut self, limit: usize) -> Self {
        self.limit_estimations = limit;
        self
    }

    /// Processes one image through the full ensemble.
    ///
    /// Returns one entry per detected region, keyed and ordered by detection
    /// index. When the detection count exceeds `limit_estimations` (and the
    /// limit is non-zero) the entries carry bounding boxes only.
    pub async fn run(
        &self,
        image: Resource,
    ) -> Result<BTreeMap<usize, EnsembleEntry>, EnsembleError> {
        let Some((image_width, image_height)) = image.size() else {
            return Err(EnsembleError::InputNotLoaded(image.id().to_string()));
        };

        let detection = self
            .stages
            .detection
            .submit(image.clone(), None)
            .await
            .wait()
            .await;
        if detection.is_error() {
            return Err(EnsembleError::StageFailed {
                stage: "detection".to_string(),
                message: detection.id().to_string(),
            });
        }

        let boxes = parse_detections(&detection)?;
        debug!(image = image.id(), detections = boxes.len(), "Detection complete");

        let mut entries: BTreeMap<usize, EnsembleEntry> = boxes
            .into_iter()
            .map(|region| region.expand(self.expansion).fit_in_size(image_width, image_height))
            .enumerate()
            .map(|(index, bounding_box)| {
                (
                    index,
                    EnsembleEntry {
                        item_id: index,
                        bounding_box,
                        attributes: Map::new(),
                    },
                )
            })
            .collect();

        if self.limit_estimations != 0 && entries.len() > self.limit_estimations {
            warn!(
                image = image.id(),
                detections = entries.len(),
                limit = self.limit_estimations,
                "Detection count exceeds estimation limit; returning boxes only"
            );
            return Ok(entries);
        }

        // Crops are produced at most once per region and shared across stages.
        let mut crops: HashMap<usize, Resource> = HashMap::new();
        let mut pending = Vec::new();

        for stage in &self.stages.estimations {
            let Some(service) = &stage.service else {
                debug!(stage = %stage.name, "Estimation stage disabled; skipping");
                continue;
            };
            for (&index, entry) in &entries {
                let crop = match crops.get(&index) {
                    Some(crop) => crop.clone(),
                    None => {
                        let crop = image
                            .crop(&entry.bounding_box, format!("{}:{index}", image.id()))
                            .ok_or_else(|| EnsembleError::InputNotLoaded(image.id().to_string()))?;
                        crops.insert(index, crop.clone());
                        crop
                    }
                };
                let promise = service.submit(crop, None).await;
                pending.push((index, stage.name.clone(), promise));
            }
        }

        let submitted = pending.len();
        for (index, stage_name, promise) in pending {
            let result = promise.wait().await;
            if result.is_error() {
                return Err(EnsembleError::StageFailed {
                    stage: stage_name,
                    message: result.id().to_string(),
                });
            }
            if let (Some(Value::Object(fields)), Some(entry)) =
                (result.metadata(), entries.get_mut(&index))
            {
                for (key, value) in fields {
                    entry.attributes.insert(key.clone(), value.clone());
                }
            }
        }

        info!(
            image = image.id(),
            regions = entries.len(),
            estimations = submitted,
            "Ensemble request complete"
        );
        Ok(entries)
    }
}

/// Reads the detection result's metadata as a bounding box list.
fn parse_detections(detection: &Resource) -> Result<Vec<BoundingBox>, EnsembleError> {
    match detection.metadata() {
        None => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|err| EnsembleError::MalformedDetection(err.to_string())),
    }
}
