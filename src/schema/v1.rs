use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectCounts {
    pub total: u64,
    pub patients: u64,
    pub controls: u64,
    pub detected: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub detection_rate: Option<f64>,
    pub mean_dice_lesional: Option<f64>,
    pub mean_dice_non_lesional: Option<f64>,
    pub false_positive_clusters: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocSummary {
    pub auc: f64,
    pub auc_plus: f64,
    pub points: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigmoidSummary {
    pub ymin: f32,
    pub ymax: f32,
    pub k: f32,
    pub m: f32,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outputs {
    pub predictions: String,
    pub test_results: Option<String>,
    pub roc_curves: Option<String>,
    pub sigmoid_parameters: Option<String>,
    pub saliency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSummaryV1 {
    pub tool: String,
    pub tool_version: String,
    pub schema_version: String,
    pub command: String,
    pub suffix: String,
    pub fold: Option<u32>,
    pub threshold: Option<String>,
    pub min_area_threshold: u64,
    pub subjects: SubjectCounts,
    pub detection: Detection,
    pub roc: Option<RocSummary>,
    pub sigmoid_search: Option<SigmoidSummary>,
    pub saliency_clusters: Option<u64>,
    pub outputs: Outputs,
    pub warnings: Vec<String>,
}

impl EvalSummaryV1 {
    pub fn empty(tool_version: &str, command: &str) -> Self {
        Self {
            tool: "fcd-lesion-eval".to_string(),
            tool_version: tool_version.to_string(),
            schema_version: "v1".to_string(),
            command: command.to_string(),
            suffix: String::new(),
            fold: None,
            threshold: None,
            min_area_threshold: 0,
            subjects: SubjectCounts {
                total: 0,
                patients: 0,
                controls: 0,
                detected: 0,
            },
            detection: Detection {
                detection_rate: None,
                mean_dice_lesional: None,
                mean_dice_non_lesional: None,
                false_positive_clusters: 0,
            },
            roc: None,
            sigmoid_search: None,
            saliency_clusters: None,
            outputs: Outputs {
                predictions: String::new(),
                test_results: None,
                roc_curves: None,
                sigmoid_parameters: None,
                saliency: None,
            },
            warnings: Vec::new(),
        }
    }
}
