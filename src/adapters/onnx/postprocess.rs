//! Pre y postprocesado YOLOv8 alrededor de la inferencia ONNX.

use image::{imageops::FilterType, Rgb, RgbImage};
use ndarray::{Array4, ArrayView2};
use regex::Regex;
use std::collections::BTreeMap;

use crate::domain::detection::BoundingBox;

/// Valor de relleno del letterbox de Ultralytics.
const LETTERBOX_FILL: u8 = 114;

/// Ningún detector real tiene tantas clases.
const MAX_CLASS_ID: usize = 10_000;

/// Transformación del espacio letterbox del modelo a píxeles de origen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub src_width: u32,
    pub src_height: u32,
}

impl Letterbox {
    fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        let sx = ((x - self.pad_x) / self.scale).clamp(0.0, self.src_width as f32);
        let sy = ((y - self.pad_y) / self.scale).clamp(0.0, self.src_height as f32);
        (sx, sy)
    }
}

/// Redimensiona manteniendo el aspecto en un lienzo `size`x`size`, centrado.
pub fn letterbox(rgb: &RgbImage, size: u32) -> (RgbImage, Letterbox) {
    let (w, h) = rgb.dimensions();
    let scale = (size as f32 / w as f32).min(size as f32 / h as f32);
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, size);

    let resized = image::imageops::resize(rgb, new_w, new_h, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([LETTERBOX_FILL; 3]));
    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;
    image::imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    (
        canvas,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
            src_width: w,
            src_height: h,
        },
    )
}

/// Tensor NCHW en coma flotante, [0, 1].
pub fn to_nchw(img: &RgbImage) -> Array4<f32> {
    let (w, h) = img.dimensions();
    let mut input = Array4::<f32>::zeros((1, 3, h as usize, w as usize));
    for (x, y, pixel) in img.enumerate_pixels() {
        input[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
        input[[0, 1, y as usize, x as usize]] = pixel[1] as f32 / 255.0;
        input[[0, 2, y as usize, x as usize]] = pixel[2] as f32 / 255.0;
    }
    input
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub bbox: BoundingBox,
    pub score: f32,
    pub class_id: usize,
}

/// Algunos exports emiten `[N, 4 + nc]`; las filas tienen que ser los
/// atributos.
pub fn orient_predictions(preds: ArrayView2<'_, f32>) -> ArrayView2<'_, f32> {
    if preds.shape()[0] > preds.shape()[1] {
        preds.reversed_axes()
    } else {
        preds
    }
}

/// Un modelo con entrada estática solo acepta su propio tamaño.
pub fn effective_input_size(fixed: Option<u32>, requested: u32) -> u32 {
    fixed.unwrap_or(requested)
}

/// Decodifica una matriz `[4 + nc, N]` (cx, cy, w, h y scores por columna) en
/// candidatos en coordenadas de origen con score >= `conf_threshold`.
pub fn decode_predictions(preds: ArrayView2<f32>, lb: &Letterbox, conf_threshold: f32) -> Vec<Candidate> {
    let rows = preds.shape()[0];
    if rows <= 4 {
        return Vec::new();
    }
    let num_candidates = preds.shape()[1];
    let mut out = Vec::new();

    for i in 0..num_candidates {
        let mut class_id = 0;
        let mut max_score = f32::MIN;
        for c in 4..rows {
            let s = preds[[c, i]];
            if s > max_score {
                max_score = s;
                class_id = c - 4;
            }
        }

        if !(max_score >= conf_threshold) {
            continue;
        }

        let cx = preds[[0, i]];
        let cy = preds[[1, i]];
        let w = preds[[2, i]];
        let h = preds[[3, i]];

        let (x_min, y_min) = lb.to_source(cx - w / 2.0, cy - h / 2.0);
        let (x_max, y_max) = lb.to_source(cx + w / 2.0, cy + h / 2.0);
        if x_max <= x_min || y_max <= y_min {
            continue;
        }

        out.push(Candidate {
            bbox: BoundingBox { x_min, y_min, x_max, y_max },
            score: max_score,
            class_id,
        });
    }
    out
}

/// NMS voraz por clase, de mayor a menor score, con tope `max_det`.
pub fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32, max_det: usize) -> Vec<Candidate> {
    candidates.sort_unstable_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Candidate> = Vec::new();
    for cand in candidates {
        if kept.len() >= max_det {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == cand.class_id && k.bbox.iou(&cand.bbox) > iou_threshold);
        if !suppressed {
            kept.push(cand);
        }
    }
    kept
}

/// Parsea los metadatos `names` del exportador de Ultralytics, un dict de
/// Python como `{0: 'with_helmet', 1: "without_helmet"}`. Los ids por encima de
/// `MAX_CLASS_ID` se ignoran.
pub fn parse_class_names(raw: &str) -> Option<Vec<String>> {
    let re = Regex::new(r#"(\d+)\s*:\s*(?:'([^']*)'|"([^"]*)")"#).ok()?;
    let mut by_id = BTreeMap::new();
    for cap in re.captures_iter(raw) {
        let Ok(id) = cap[1].parse::<usize>() else { continue };
        if id > MAX_CLASS_ID {
            continue;
        }
        let name = cap.get(2).or_else(|| cap.get(3))?.as_str().to_string();
        by_id.insert(id, name);
    }
    if by_id.is_empty() {
        return None;
    }
    let len = by_id.keys().next_back().map(|k| k + 1)?;
    Some(
        (0..len)
            .map(|i| by_id.get(&i).cloned().unwrap_or_else(|| format!("class_{i}")))
            .collect(),
    )
}
