use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::application::ports::FrameAnnotatorPort;
use crate::domain::detection::{DetectionRecord, HelmetCategory};

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/freefont/FreeSans.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

fn category_color(category: HelmetCategory) -> Rgb<u8> {
    match category {
        HelmetCategory::HelmetPresent => Rgb([0, 200, 0]),
        HelmetCategory::HelmetAbsent => Rgb([220, 20, 20]),
        HelmetCategory::Other => Rgb([30, 100, 230]),
    }
}

/// Carga la fuente de etiquetas: la ruta indicada o, si no, la primera fuente
/// común del sistema. `None` significa etiquetas sin texto.
pub fn load_font(explicit: Option<&Path>) -> Option<FontVec> {
    let candidates: Vec<PathBuf> = match explicit {
        Some(p) => vec![p.to_path_buf()],
        None => FONT_CANDIDATES.iter().map(PathBuf::from).collect(),
    };

    for path in candidates {
        let Ok(bytes) = std::fs::read(&path) else {
            if explicit.is_some() {
                warn!("No se pudo leer la fuente {}", path.display());
            }
            continue;
        };
        match FontVec::try_from_vec(bytes) {
            Ok(font) => {
                info!("🔤 Fuente de etiquetas: {}", path.display());
                return Some(font);
            }
            Err(_) => warn!("La fuente {} no es un TrueType/OpenType válido", path.display()),
        }
    }

    warn!("No hay fuente para etiquetas; las cajas se dibujan sin texto (usa --font para indicar una)");
    None
}

/// Dibuja cajas coloreadas por categoría con una pestaña `"<class> <conf>"`
/// sobre una copia del frame.
pub struct BoxAnnotator {
    font: Option<FontVec>,
}

impl BoxAnnotator {
    pub fn new(font: Option<FontVec>) -> Self {
        Self { font }
    }

    fn draw_record(&self, img: &mut RgbImage, record: &DetectionRecord, thickness: u32, scale: PxScale) {
        let (w, h) = img.dimensions();
        let color = category_color(record.category);
        let bb = &record.bounding_box;

        let x0 = (bb.x_min.max(0.0) as u32).min(w - 1);
        let y0 = (bb.y_min.max(0.0) as u32).min(h - 1);
        let x1 = (bb.x_max.max(0.0) as u32).min(w - 1).max(x0);
        let y1 = (bb.y_max.max(0.0) as u32).min(h - 1).max(y0);

        for t in 0..thickness {
            let (ax, ay) = (x0 + t, y0 + t);
            if ax > x1.saturating_sub(t) || ay > y1.saturating_sub(t) {
                break;
            }
            let rw = (x1 - t - ax + 1).max(1);
            let rh = (y1 - t - ay + 1).max(1);
            draw_hollow_rect_mut(img, Rect::at(ax as i32, ay as i32).of_size(rw, rh), color);
        }

        let label = format!("{} {:.2}", record.class_name, record.confidence);
        let (text_w, text_h) = match &self.font {
            Some(font) => text_size(scale, font, &label),
            None => ((label.len() as f32 * scale.x * 0.5) as u32, scale.y as u32),
        };
        let pad = 2;
        let tab_w = (text_w + 2 * pad).clamp(1, w);
        let tab_h = (text_h + 2 * pad).clamp(1, h);

        // Encima de la caja si cabe; si no, dentro del borde superior.
        let tab_y = if y0 >= tab_h { y0 - tab_h } else { y0 };
        let tab_x = x0.min(w - tab_w);
        draw_filled_rect_mut(img, Rect::at(tab_x as i32, tab_y as i32).of_size(tab_w, tab_h), color);

        if let Some(font) = &self.font {
            draw_text_mut(img, TEXT_COLOR, (tab_x + pad) as i32, (tab_y + pad) as i32, scale, font, &label);
        }
    }
}

impl FrameAnnotatorPort for BoxAnnotator {
    fn annotate(&self, frame: &RgbImage, detections: &[DetectionRecord]) -> RgbImage {
        let mut img = frame.clone();
        let (w, h) = img.dimensions();
        if w == 0 || h == 0 || detections.is_empty() {
            return img;
        }

        let short_side = w.min(h);
        let thickness = (short_side / 300).max(2);
        let scale = PxScale::from((short_side as f32 / 30.0).clamp(12.0, 32.0));

        for record in detections {
            self.draw_record(&mut img, record, thickness, scale);
        }
        img
    }
}
