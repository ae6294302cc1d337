//! YOLOv5 output decoding.
//!
//! The exported YOLOv5 ONNX graph emits a `[1, N, 5 + classes]` tensor where
//! each row is `cx, cy, w, h, objectness, class scores...` in input-pixel
//! units. Decoding turns rows into normalized `Detection`s and runs per-class
//! non-maximum suppression.

use anyhow::{anyhow, Result};

use crate::detect::result::Detection;

/// Post-processing parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct YoloParams {
    pub input_width: u32,
    pub input_height: u32,
    /// Minimum objectness × class score kept before NMS.
    pub score_floor: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_width: 640,
            input_height: 640,
            score_floor: 0.25,
            iou_threshold: 0.45,
            max_detections: 300,
        }
    }
}

/// Decode a flat `[N * stride]` output buffer.
pub fn decode(output: &[f32], stride: usize, params: &YoloParams) -> Result<Vec<Detection>> {
    if stride < 6 {
        return Err(anyhow!("yolo output stride {} too small", stride));
    }
    if output.len() % stride != 0 {
        return Err(anyhow!(
            "yolo output length {} is not a multiple of stride {}",
            output.len(),
            stride
        ));
    }

    let in_w = params.input_width as f32;
    let in_h = params.input_height as f32;
    let mut candidates = Vec::new();

    for row in output.chunks_exact(stride) {
        let objectness = row[4];
        if objectness < params.score_floor {
            continue;
        }
        let Some((class_id, class_score)) = row[5..]
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
        else {
            continue;
        };
        let confidence = objectness * class_score;
        if confidence < params.score_floor {
            continue;
        }

        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        let x0 = ((cx - w / 2.0) / in_w).clamp(0.0, 1.0);
        let y0 = ((cy - h / 2.0) / in_h).clamp(0.0, 1.0);
        let x1 = ((cx + w / 2.0) / in_w).clamp(0.0, 1.0);
        let y1 = ((cy + h / 2.0) / in_h).clamp(0.0, 1.0);
        candidates.push(Detection {
            x: x0,
            y: y0,
            w: x1 - x0,
            h: y1 - y0,
            confidence,
            class_id,
        });
    }

    Ok(non_max_suppression(
        candidates,
        params.iou_threshold,
        params.max_detections,
    ))
}

/// Greedy per-class NMS, highest confidence first.
pub fn non_max_suppression(
    mut candidates: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::new();
    for cand in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == cand.class_id && iou(k, &cand) > iou_threshold);
        if !suppressed {
            kept.push(cand);
        }
    }
    kept
}

fn iou(a: &Detection, b: &Detection) -> f32 {
    let ix0 = a.x.max(b.x);
    let iy0 = a.y.max(b.y);
    let ix1 = (a.x + a.w).min(b.x + b.w);
    let iy1 = (a.y + a.h).min(b.y + b.h);
    let inter = (ix1 - ix0).max(0.0) * (iy1 - iy0).max(0.0);
    let union = a.w * a.h + b.w * b.h - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}
