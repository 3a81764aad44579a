//! Dataset annotations and CSV summaries of analysis records

use crate::analysis::{BoundingBox, PlaneLabel, ProcessedImageRecord};
use crate::Result;
use serde::Serialize;
use uuid::Uuid;

pub const ROI_NOT_FOUND: &str = "ROI not found";

#[derive(Debug, Clone, Serialize)]
pub struct RoiAnnotation {
    pub prediction: f32,
    pub plane: PlaneLabel,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

/// Annotation stored next to an uploaded dataset image
#[derive(Debug, Clone, Serialize)]
pub struct Annotation {
    /// Stored image name, `img_<id>_<original name>`
    pub img: String,
    pub old_file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(flatten)]
    pub body: AnnotationBody,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AnnotationBody {
    Region {
        quality: f32,
        pathology: f32,
        roi: RoiAnnotation,
    },
    Missing {
        error: String,
    },
}

impl Annotation {
    pub fn from_record(record: &ProcessedImageRecord, id: Uuid, org_id: Option<&str>) -> Self {
        let name = record.img_name();
        let body = match record.analyzed() {
            Some(analyzed) => AnnotationBody::Region {
                quality: analyzed.quality.prediction_prob,
                pathology: analyzed.pathology.prediction_prob,
                roi: RoiAnnotation {
                    prediction: analyzed.plane.prediction_prob,
                    plane: analyzed.plane.plane_type,
                    bbox: analyzed.plane.bbox,
                },
            },
            None => AnnotationBody::Missing {
                error: ROI_NOT_FOUND.to_string(),
            },
        };

        Self {
            img: format!("img_{}_{}", id, name),
            old_file_name: name.to_string(),
            org_id: org_id.map(str::to_string),
            body,
        }
    }

    /// `annotation_<id>_<original name>.json`, matching the stored image
    pub fn file_name(&self) -> String {
        let id_and_name = self.img.strip_prefix("img_").unwrap_or(&self.img);
        format!("annotation_{}.json", id_and_name)
    }

    pub fn has_region(&self) -> bool {
        matches!(self.body, AnnotationBody::Region { .. })
    }
}

pub struct RecordExporter;

impl RecordExporter {
    /// One annotation per record, each with a fresh id
    pub fn annotations(records: &[ProcessedImageRecord], org_id: Option<&str>) -> Vec<Annotation> {
        records
            .iter()
            .map(|record| Annotation::from_record(record, Uuid::new_v4(), org_id))
            .collect()
    }

    pub fn to_annotations_json(records: &[ProcessedImageRecord], org_id: Option<&str>) -> Result<String> {
        Ok(serde_json::to_string_pretty(&Self::annotations(records, org_id))?)
    }

    /// Records as pretty JSON, images embedded as base64 PNG
    pub fn to_json(records: &[ProcessedImageRecord]) -> Result<String> {
        Ok(serde_json::to_string_pretty(records)?)
    }

    pub fn to_csv(records: &[ProcessedImageRecord]) -> String {
        let mut csv = String::from("img_name,plane,plane_prob,quality,pathology,x1,y1,x2,y2,error\n");

        for record in records {
            let name = Self::escape(record.img_name());
            match record.analyzed() {
                Some(analyzed) => {
                    let bbox = &analyzed.plane.bbox;
                    csv.push_str(&format!(
                        "{},{},{:.3},{:.2},{:.2},{:.1},{:.1},{:.1},{:.1},\n",
                        name,
                        analyzed.plane.plane_type,
                        analyzed.plane.prediction_prob,
                        analyzed.quality.prediction_prob,
                        analyzed.pathology.prediction_prob,
                        bbox.x1,
                        bbox.y1,
                        bbox.x2,
                        bbox.y2
                    ));
                }
                None => {
                    let error = Self::escape(record.error().unwrap_or_default());
                    csv.push_str(&format!("{},,,,,,,,,{}\n", name, error));
                }
            }
        }

        csv
    }

    fn escape(field: &str) -> String {
        if field.contains([',', '"', '\n']) {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }
}
