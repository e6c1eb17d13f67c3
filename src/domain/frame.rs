//! Entradas de frame y utilidades para pasarlas a buffers RGB8.

use image::{DynamicImage, RgbImage};

use super::errors::{DomainError, DomainResult};

/// Un frame en una de las dos representaciones aceptadas.
#[derive(Debug, Clone)]
pub enum FrameInput {
    /// RGB8 empaquetado por filas, `width * height * 3` bytes.
    Rgb { data: Vec<u8>, width: u32, height: u32 },
    /// Imagen estructurada, cualquier tipo de color.
    Image(DynamicImage),
}

impl FrameInput {
    /// Normaliza a un buffer RGB8; un frame vacío o mal formado es un error de
    /// inferencia para que el llamador pueda saltarlo.
    pub fn into_rgb(self) -> DomainResult<RgbImage> {
        match self {
            FrameInput::Rgb { data, width, height } => {
                if width == 0 || height == 0 || data.is_empty() {
                    return Err(DomainError::Inference("empty frame".into()));
                }
                let expected = width as usize * height as usize * 3;
                if data.len() != expected {
                    return Err(DomainError::Inference(format!(
                        "malformed frame: {} bytes for {}x{} RGB (expected {})",
                        data.len(),
                        width,
                        height,
                        expected
                    )));
                }
                RgbImage::from_raw(width, height, data)
                    .ok_or_else(|| DomainError::Inference("malformed frame buffer".into()))
            }
            FrameInput::Image(img) => {
                if img.width() == 0 || img.height() == 0 {
                    return Err(DomainError::Inference("empty frame".into()));
                }
                Ok(img.to_rgb8())
            }
        }
    }
}

impl From<RgbImage> for FrameInput {
    fn from(img: RgbImage) -> Self {
        FrameInput::Image(DynamicImage::ImageRgb8(img))
    }
}

impl From<DynamicImage> for FrameInput {
    fn from(img: DynamicImage) -> Self {
        FrameInput::Image(img)
    }
}

/// Decodifica una imagen subida (jpg/png).
pub fn decode_image(bytes: &[u8]) -> DomainResult<DynamicImage> {
    if bytes.is_empty() {
        return Err(DomainError::InvalidInput("empty upload".into()));
    }
    image::load_from_memory(bytes)
        .map_err(|e| DomainError::InvalidInput(format!("unsupported image: {e}")))
}

/// JPEG para el navegador; el buffer es RGB.
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> DomainResult<Vec<u8>> {
    let mut jpeg = Vec::new();
    let mut enc = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, quality);
    enc.encode(img.as_raw(), img.width(), img.height(), image::ExtendedColorType::Rgb8)
        .map_err(|e| DomainError::OperationFailed(format!("jpeg encoding failed: {e}")))?;
    Ok(jpeg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_rgb_is_accepted() {
        let frame = FrameInput::Rgb { data: vec![7u8; 4 * 2 * 3], width: 4, height: 2 };
        let rgb = frame.into_rgb().unwrap();
        assert_eq!(rgb.dimensions(), (4, 2));
        assert_eq!(rgb.get_pixel(3, 1).0, [7, 7, 7]);
    }

    #[test]
    fn empty_frame_is_an_inference_error() {
        let frame = FrameInput::Rgb { data: vec![], width: 0, height: 0 };
        assert!(matches!(frame.into_rgb(), Err(DomainError::Inference(_))));

        let frame = FrameInput::Image(DynamicImage::new_rgb8(0, 0));
        assert!(matches!(frame.into_rgb(), Err(DomainError::Inference(_))));
    }

    #[test]
    fn length_mismatch_is_an_inference_error() {
        let frame = FrameInput::Rgb { data: vec![0u8; 10], width: 4, height: 2 };
        assert!(matches!(frame.into_rgb(), Err(DomainError::Inference(_))));
    }

    #[test]
    fn image_object_is_converted_to_rgb() {
        let gray = DynamicImage::new_luma8(5, 3);
        let rgb = FrameInput::from(gray).into_rgb().unwrap();
        assert_eq!(rgb.dimensions(), (5, 3));
    }

    #[test]
    fn jpeg_round_trip_keeps_dimensions() {
        let img = RgbImage::from_pixel(16, 8, image::Rgb([200, 10, 10]));
        let jpeg = encode_jpeg(&img, 80).unwrap();
        let decoded = decode_image(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn garbage_upload_is_invalid_input() {
        assert!(matches!(decode_image(b"not an image"), Err(DomainError::InvalidInput(_))));
        assert!(matches!(decode_image(&[]), Err(DomainError::InvalidInput(_))));
    }
}
